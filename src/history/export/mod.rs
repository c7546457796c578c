//! Dataset export: grouping flat join rows and writing JSON lines.

pub mod grouping;
pub mod jsonl;

pub use grouping::{ConversationGrouper, ConversationRecord, ExportRow, ExportTurn};
pub use jsonl::{ExportStats, read_lines, write_lines};

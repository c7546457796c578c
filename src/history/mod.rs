//! Conversation history subsystem.
//!
//! - `core`: configuration, errors, identifiers, and record types
//! - `storage`: the `SQLite` schema and the conversation store
//! - `export`: grouping joined rows into per-conversation JSON lines

pub mod core;
pub mod export;
pub mod storage;

pub use self::core::{
    ConversationSummary, ErrorKind, HistoryEntry, StoreConfig, StoreError, StoreResult, Turn,
    UserProfile, new_conversation_id,
};
pub use export::{ConversationRecord, ExportStats, ExportTurn, read_lines};
pub use storage::{ConversationStore, SqliteConversationStore, StoreFuture};

//! Core history types and configuration.

pub mod config;
pub mod errors;
pub mod ids;
pub mod records;

pub use config::StoreConfig;
pub use errors::{ErrorKind, StoreError, StoreResult};
pub use ids::new_conversation_id;
pub use records::{
    ConversationSummary, HistoryEntry, Turn, UserProfile, format_timestamp, parse_timestamp,
};

//! Persistent storage for conversations, turns, profiles, and metadata.

pub mod conversation_store;
pub mod schema;

pub use conversation_store::{ConversationStore, SqliteConversationStore, StoreFuture};
pub use schema::{CONVERSATIONS_TABLE, METADATA_TABLE, TURNS_TABLE, USERS_TABLE};

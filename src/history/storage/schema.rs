//! Table layout shared by the store and the exporter.
//!
//! The column names here are the durable on-disk format; other tools read
//! these databases directly.

use std::time::Duration;

/// Conversations table.
pub const CONVERSATIONS_TABLE: &str = "conversations";
/// Turns table.
pub const TURNS_TABLE: &str = "conversation_turns";
/// User profiles table.
pub const USERS_TABLE: &str = "users";
/// Metadata documents table.
pub const METADATA_TABLE: &str = "metadata";

/// Idempotent DDL for the four tables.
///
/// Foreign keys are declared but `PRAGMA foreign_keys` stays off: a
/// conversation may name a user that has no profile yet.
pub(crate) fn create_tables_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {CONVERSATIONS_TABLE} (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            timestamp TEXT
        );
        CREATE TABLE IF NOT EXISTS {TURNS_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT,
            role TEXT,
            content TEXT,
            timestamp TEXT,
            FOREIGN KEY (conversation_id) REFERENCES {CONVERSATIONS_TABLE} (id)
        );
        CREATE INDEX IF NOT EXISTS idx_{TURNS_TABLE}_conversation_ts
            ON {TURNS_TABLE} (conversation_id, timestamp);
        CREATE TABLE IF NOT EXISTS {USERS_TABLE} (
            id TEXT PRIMARY KEY,
            age_range TEXT,
            technical_proficiency TEXT,
            learning_preferences TEXT
        );
        CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT,
            metadata_json TEXT,
            FOREIGN KEY (conversation_id) REFERENCES {CONVERSATIONS_TABLE} (id)
        );
        CREATE INDEX IF NOT EXISTS idx_{METADATA_TABLE}_conversation
            ON {METADATA_TABLE} (conversation_id, id);"
    )
}

/// Apply connection pragmas: WAL so readers never block the writer, and a
/// bounded wait on locks.
pub(crate) fn configure_connection(
    conn: &rusqlite::Connection,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    Ok(())
}

/// Flat export join.
///
/// Left joins keep conversations with no profile, no metadata, or no turns.
/// Only the first saved metadata row per conversation joins, so turns are
/// never repeated per metadata row.
pub(crate) fn export_query_sql() -> String {
    format!(
        "SELECT c.id, c.timestamp,
                u.id, u.age_range, u.technical_proficiency, u.learning_preferences,
                m.metadata_json,
                t.id, t.role, t.content, t.timestamp
         FROM {CONVERSATIONS_TABLE} c
         LEFT JOIN {USERS_TABLE} u ON c.user_id = u.id
         LEFT JOIN {METADATA_TABLE} m ON m.id = (
             SELECT MIN(mm.id) FROM {METADATA_TABLE} mm
             WHERE mm.conversation_id = c.id
         )
         LEFT JOIN {TURNS_TABLE} t ON t.conversation_id = c.id
         ORDER BY c.id, t.timestamp, t.id"
    )
}

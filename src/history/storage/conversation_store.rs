//! `SQLite` store for conversations, turns, user profiles, and metadata.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::Utc;
use rusqlite::{OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::history::core::config::StoreConfig;
use crate::history::core::errors::{StoreError, StoreResult};
use crate::history::core::records::{
    ConversationSummary, HistoryEntry, Turn, UserProfile, format_timestamp, parse_timestamp,
};
use crate::history::export::grouping::{ConversationGrouper, ExportRow};
use crate::history::export::jsonl::{ExportStats, write_lines};
use crate::history::storage::schema::{
    self, CONVERSATIONS_TABLE, METADATA_TABLE, TURNS_TABLE, USERS_TABLE,
};

/// Boxed future type for conversation store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation store trait.
///
/// Reads never fail on absence: unknown ids yield empty results.
pub trait ConversationStore: Send + Sync {
    /// Ensure the schema exists. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn initialize(&self) -> StoreFuture<'_, StoreResult<()>>;

    /// Insert or fully replace a user profile.
    ///
    /// # Errors
    /// Returns a validation error if `user_id` is empty, or an error if
    /// storage access fails.
    fn upsert_user_profile(&self, profile: &UserProfile) -> StoreFuture<'_, StoreResult<()>>;

    /// Load a user profile.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_user_profile(&self, user_id: &str)
    -> StoreFuture<'_, StoreResult<Option<UserProfile>>>;

    /// Append a turn, creating the conversation on first use.
    ///
    /// # Errors
    /// Returns a validation error if `conversation_id` is empty, or an error
    /// if storage access fails.
    fn append_turn(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> StoreFuture<'_, StoreResult<()>>;

    /// Role/content pairs of a conversation, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_history(&self, conversation_id: &str)
    -> StoreFuture<'_, StoreResult<Vec<HistoryEntry>>>;

    /// Turns of a conversation with their timestamps, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails or a timestamp is malformed.
    fn get_turns(&self, conversation_id: &str) -> StoreFuture<'_, StoreResult<Vec<Turn>>>;

    /// Number of turns stored for a conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn count_turns(&self, conversation_id: &str) -> StoreFuture<'_, StoreResult<u64>>;

    /// All conversations ordered by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails or a timestamp is malformed.
    fn list_conversations(&self) -> StoreFuture<'_, StoreResult<Vec<ConversationSummary>>>;

    /// Insert a metadata document. Earlier documents are kept.
    ///
    /// # Errors
    /// Returns a validation error if `conversation_id` is empty, or an error
    /// if storage access fails.
    fn save_metadata(
        &self,
        conversation_id: &str,
        metadata: &serde_json::Value,
    ) -> StoreFuture<'_, StoreResult<()>>;

    /// Write every conversation as one JSON line to `destination`.
    ///
    /// # Errors
    /// Returns an I/O error if the destination cannot be written, or a
    /// storage error if the read does not complete.
    fn export_to_lines(&self, destination: &Path) -> StoreFuture<'_, StoreResult<ExportStats>>;
}

/// `SQLite` implementation of the conversation store.
pub struct SqliteConversationStore {
    conn: Connection,
    default_user_id: String,
    path: PathBuf,
}

impl SqliteConversationStore {
    /// Open the database at `config.sqlite_path`, creating its directory
    /// and schema if absent.
    ///
    /// # Errors
    /// Returns an error if the config is invalid, the directory cannot be
    /// created, or the database cannot be opened.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;

        if let Some(parent) = config
            .sqlite_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.sqlite_path).await?;
        let busy_timeout = config.busy_timeout();
        conn.call(move |conn| {
            schema::configure_connection(conn, busy_timeout)?;
            Ok(())
        })
        .await?;

        let store = Self {
            conn,
            default_user_id: config.default_user_id.clone(),
            path: config.sqlite_path.clone(),
        };
        store.initialize().await?;

        tracing::info!(path = %store.path.display(), "conversation store ready");
        Ok(store)
    }

    /// Database file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn require(field: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::missing(field));
    }
    Ok(())
}

/// Run the export join in one read transaction and stream it to `path`.
///
/// `path` is replaced only after the whole join has been written.
fn export_snapshot(conn: &mut rusqlite::Connection, path: &Path) -> StoreResult<ExportStats> {
    let tx = conn.transaction()?;
    let stats = {
        let mut stmt = tx.prepare(&schema::export_query_sql())?;
        let rows = stmt
            .query_map([], ExportRow::from_sql)?
            .map(|row| row.map_err(StoreError::from));
        write_lines(ConversationGrouper::new(rows), path)?
    };
    tx.commit()?;
    Ok(stats)
}

impl ConversationStore for SqliteConversationStore {
    fn initialize(&self) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.conn
                .call(|conn| {
                    conn.execute_batch(&schema::create_tables_sql())?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn upsert_user_profile(&self, profile: &UserProfile) -> StoreFuture<'_, StoreResult<()>> {
        let profile = profile.clone();
        Box::pin(async move {
            profile.validate()?;
            let user_id = profile.user_id.clone();

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {USERS_TABLE}
                             (id, age_range, technical_proficiency, learning_preferences)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        rusqlite::params![
                            profile.user_id,
                            profile.age_range,
                            profile.technical_proficiency,
                            profile.learning_preferences
                        ],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await?;

            tracing::debug!(%user_id, "user profile upserted");
            Ok(())
        })
    }

    fn get_user_profile(
        &self,
        user_id: &str,
    ) -> StoreFuture<'_, StoreResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let profile = self
                .conn
                .call(move |conn| {
                    let profile = conn
                        .query_row(
                            &format!(
                                "SELECT id, age_range, technical_proficiency, learning_preferences
                                 FROM {USERS_TABLE} WHERE id = ?1"
                            ),
                            rusqlite::params![user_id],
                            |row| {
                                Ok(UserProfile {
                                    user_id: row.get(0)?,
                                    age_range: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                                    technical_proficiency: row
                                        .get::<_, Option<String>>(2)?
                                        .unwrap_or_default(),
                                    learning_preferences: row
                                        .get::<_, Option<String>>(3)?
                                        .unwrap_or_default(),
                                })
                            },
                        )
                        .optional()?;
                    Ok(profile)
                })
                .await?;
            Ok(profile)
        })
    }

    fn append_turn(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> StoreFuture<'_, StoreResult<()>> {
        let conversation_id = conversation_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        Box::pin(async move {
            require("conversation_id", &conversation_id)?;

            let now = format_timestamp(Utc::now());
            let owner = self.default_user_id.clone();
            let id = conversation_id.clone();

            let (timestamp, clamped) = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                    let latest: Option<String> = tx.query_row(
                        &format!(
                            "SELECT MAX(timestamp) FROM {TURNS_TABLE} WHERE conversation_id = ?1"
                        ),
                        rusqlite::params![id],
                        |row| row.get(0),
                    )?;
                    let (timestamp, clamped) = match latest {
                        Some(latest) if latest > now => (latest, true),
                        _ => (now, false),
                    };

                    tx.execute(
                        &format!(
                            "INSERT OR IGNORE INTO {CONVERSATIONS_TABLE} (id, user_id, timestamp)
                             VALUES (?1, ?2, ?3)"
                        ),
                        rusqlite::params![id, owner, timestamp],
                    )?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {TURNS_TABLE} (conversation_id, role, content, timestamp)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        rusqlite::params![id, role, content, timestamp],
                    )?;
                    tx.commit()?;
                    Ok((timestamp, clamped))
                })
                .await?;

            if clamped {
                tracing::warn!(
                    %conversation_id,
                    %timestamp,
                    "clock is behind the latest turn; reusing its timestamp"
                );
            }
            tracing::debug!(%conversation_id, %timestamp, "turn appended");
            Ok(())
        })
    }

    fn get_history(
        &self,
        conversation_id: &str,
    ) -> StoreFuture<'_, StoreResult<Vec<HistoryEntry>>> {
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let entries = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT role, content FROM {TURNS_TABLE}
                         WHERE conversation_id = ?1
                         ORDER BY timestamp, id"
                    ))?;
                    let entries = stmt
                        .query_map(rusqlite::params![conversation_id], |row| {
                            Ok(HistoryEntry {
                                role: row.get(0)?,
                                content: row.get(1)?,
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(entries)
                })
                .await?;
            Ok(entries)
        })
    }

    fn get_turns(&self, conversation_id: &str) -> StoreFuture<'_, StoreResult<Vec<Turn>>> {
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let id = conversation_id.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT role, content, timestamp FROM {TURNS_TABLE}
                         WHERE conversation_id = ?1
                         ORDER BY timestamp, id"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![id], |row| {
                            let role: String = row.get(0)?;
                            let content: String = row.get(1)?;
                            let timestamp: String = row.get(2)?;
                            Ok((role, content, timestamp))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter()
                .map(|(role, content, timestamp)| -> StoreResult<Turn> {
                    Ok(Turn {
                        conversation_id: conversation_id.clone(),
                        role,
                        content,
                        timestamp: parse_timestamp(&timestamp)?,
                    })
                })
                .collect::<StoreResult<Vec<_>>>()
        })
    }

    fn count_turns(&self, conversation_id: &str) -> StoreFuture<'_, StoreResult<u64>> {
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let count = self
                .conn
                .call(move |conn| {
                    let count: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {TURNS_TABLE} WHERE conversation_id = ?1"),
                        rusqlite::params![conversation_id],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;
            u64::try_from(count)
                .map_err(|_| StoreError::InvalidRecord("invalid turn count".to_string()))
        })
    }

    fn list_conversations(&self) -> StoreFuture<'_, StoreResult<Vec<ConversationSummary>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(|conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, user_id, timestamp FROM {CONVERSATIONS_TABLE} ORDER BY id"
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            let id: String = row.get(0)?;
                            let user_id: Option<String> = row.get(1)?;
                            let timestamp: String = row.get(2)?;
                            Ok((id, user_id, timestamp))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter()
                .map(|(conversation_id, user_id, timestamp)| -> StoreResult<_> {
                    Ok(ConversationSummary {
                        conversation_id,
                        user_id,
                        created_at: parse_timestamp(&timestamp)?,
                    })
                })
                .collect::<StoreResult<Vec<_>>>()
        })
    }

    fn save_metadata(
        &self,
        conversation_id: &str,
        metadata: &serde_json::Value,
    ) -> StoreFuture<'_, StoreResult<()>> {
        let conversation_id = conversation_id.to_string();
        let metadata = metadata.clone();
        Box::pin(async move {
            require("conversation_id", &conversation_id)?;
            let metadata_json = serde_json::to_string(&metadata)?;
            let id = conversation_id.clone();

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {METADATA_TABLE} (conversation_id, metadata_json)
                             VALUES (?1, ?2)"
                        ),
                        rusqlite::params![id, metadata_json],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await?;

            tracing::debug!(%conversation_id, "metadata saved");
            Ok(())
        })
    }

    fn export_to_lines(&self, destination: &Path) -> StoreFuture<'_, StoreResult<ExportStats>> {
        let destination = destination.to_path_buf();
        Box::pin(async move {
            let path = destination.clone();
            let stats = self
                .conn
                .call(move |conn| Ok(export_snapshot(conn, &path)))
                .await??;

            tracing::info!(
                path = %destination.display(),
                conversations = stats.conversations,
                turns = stats.turns,
                "conversations exported"
            );
            Ok(stats)
        })
    }
}

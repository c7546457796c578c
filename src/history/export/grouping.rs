//! Group flat export rows into one record per conversation.
//!
//! The export join yields one row per (conversation, turn), sorted by
//! conversation id then turn time. Rows of one conversation are therefore
//! adjacent, and a record is complete as soon as the id changes.

use std::iter::Peekable;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::history::core::errors::StoreResult;

/// One row of the flat export join.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportRow {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Conversation creation time as stored.
    pub conversation_timestamp: Option<String>,
    /// Joined profile id; `None` when the owner has no profile.
    pub user_id: Option<String>,
    /// Joined profile age range.
    pub age_range: Option<String>,
    /// Joined profile proficiency.
    pub technical_proficiency: Option<String>,
    /// Joined profile learning preferences.
    pub learning_preferences: Option<String>,
    /// First saved metadata document, serialized.
    pub metadata_json: Option<String>,
    /// Turn carried by this row; `None` for a conversation without turns.
    pub turn: Option<ExportTurn>,
}

impl ExportRow {
    /// Decode a row produced by the export query.
    pub(crate) fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let turn_id: Option<i64> = row.get(7)?;
        let turn = match turn_id {
            Some(_) => Some(ExportTurn {
                role: row.get(8)?,
                content: row.get(9)?,
                timestamp: row.get(10)?,
            }),
            None => None,
        };

        Ok(Self {
            conversation_id: row.get(0)?,
            conversation_timestamp: row.get(1)?,
            user_id: row.get(2)?,
            age_range: row.get(3)?,
            technical_proficiency: row.get(4)?,
            learning_preferences: row.get(5)?,
            metadata_json: row.get(6)?,
            turn,
        })
    }
}

/// A turn as written to the export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTurn {
    /// Open role label.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Insertion time as stored.
    pub timestamp: Option<String>,
}

/// One exported conversation: a single JSON line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Caller metadata merged with conversation and profile fields.
    pub metadata: Map<String, Value>,
    /// Turns in join order.
    pub turns: Vec<ExportTurn>,
}

impl ConversationRecord {
    /// Start a record from the first row of a group.
    ///
    /// Metadata is read only here, so later rows of the same group never
    /// re-merge it.
    ///
    /// # Errors
    /// Returns an error if the stored metadata is not valid JSON.
    pub fn open(row: &ExportRow) -> StoreResult<Self> {
        let mut metadata = match row.metadata_json.as_deref() {
            Some(raw) if !raw.is_empty() => match serde_json::from_str::<Value>(raw)? {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            },
            _ => Map::new(),
        };

        metadata.insert("timestamp".to_string(), json!(row.conversation_timestamp));
        metadata.insert("conversation_id".to_string(), json!(row.conversation_id));
        metadata.insert("user_id".to_string(), json!(row.user_id));

        let mut context = match metadata.remove("context") {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        context.insert(
            "user_profile".to_string(),
            json!({
                "user_id": row.user_id,
                "age_range": row.age_range,
                "technical_proficiency": row.technical_proficiency,
                "learning_preferences": row.learning_preferences,
            }),
        );
        metadata.insert("context".to_string(), Value::Object(context));

        Ok(Self {
            conversation_id: row.conversation_id.clone(),
            metadata,
            turns: Vec::new(),
        })
    }

    fn push(&mut self, row: ExportRow) {
        if let Some(turn) = row.turn {
            self.turns.push(turn);
        }
    }
}

/// Iterator adapter yielding one [`ConversationRecord`] per run of rows
/// sharing a conversation id.
///
/// A failed row ends the current group without emitting it; the error is
/// yielded instead.
pub struct ConversationGrouper<I>
where
    I: Iterator<Item = StoreResult<ExportRow>>,
{
    rows: Peekable<I>,
}

impl<I> ConversationGrouper<I>
where
    I: Iterator<Item = StoreResult<ExportRow>>,
{
    /// Wrap a row stream sorted by conversation id.
    pub fn new(rows: I) -> Self {
        Self {
            rows: rows.peekable(),
        }
    }
}

impl<I> Iterator for ConversationGrouper<I>
where
    I: Iterator<Item = StoreResult<ExportRow>>,
{
    type Item = StoreResult<ConversationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.rows.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };

        let mut record = match ConversationRecord::open(&first) {
            Ok(record) => record,
            Err(err) => return Some(Err(err)),
        };
        record.push(first);

        let current = record.conversation_id.clone();
        while let Some(Ok(row)) = self.rows.next_if(|next| {
            next.as_ref()
                .is_ok_and(|candidate| candidate.conversation_id == current)
        }) {
            record.push(row);
        }

        if self.rows.peek().is_some_and(Result::is_err) {
            return self.rows.next().and_then(Result::err).map(Err);
        }

        Some(Ok(record))
    }
}

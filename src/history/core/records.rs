//! Record types exchanged with callers of the store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::history::core::errors::{StoreError, StoreResult};

/// Profile of the person behind a conversation.
///
/// Upserted by `user_id`: a later write fully replaces the earlier one.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserProfile {
    /// Stable user identifier.
    pub user_id: String,
    /// Free-form age bracket, e.g. `30+`.
    pub age_range: String,
    /// Free-form proficiency label, e.g. `intermediate`.
    pub technical_proficiency: String,
    /// Free-form learning preference, e.g. `visual_learner`.
    pub learning_preferences: String,
}

impl UserProfile {
    /// Build a profile from its four fields.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        age_range: impl Into<String>,
        technical_proficiency: impl Into<String>,
        learning_preferences: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            age_range: age_range.into(),
            technical_proficiency: technical_proficiency.into(),
            learning_preferences: learning_preferences.into(),
        }
    }

    /// Parse a collaborator `user_profile` document.
    ///
    /// # Errors
    /// Returns a validation error if a field is missing, unknown, or not a string.
    pub fn from_json(document: serde_json::Value) -> StoreResult<Self> {
        serde_json::from_value(document)
            .map_err(|err| StoreError::Validation(format!("user_profile: {err}")))
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.user_id.is_empty() {
            return Err(StoreError::missing("user_id"));
        }
        Ok(())
    }
}

/// A role/content pair, the shape replayed into a model prompt.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Open role label (`user`, `assistant`, or anything the caller uses).
    pub role: String,
    /// Message text.
    pub content: String,
}

/// A stored turn including its insertion time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Owning conversation.
    pub conversation_id: String,
    /// Open role label.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Insertion time.
    pub timestamp: DateTime<Utc>,
}

impl From<Turn> for HistoryEntry {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content,
        }
    }
}

/// A conversation row without its turns.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Owner recorded at creation; not guaranteed to have a profile.
    pub user_id: Option<String>,
    /// Time of the first turn.
    pub created_at: DateTime<Utc>,
}

/// Storage form of a timestamp: RFC 3339, UTC, fixed microsecond width.
///
/// The fixed width keeps text order equal to time order.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// # Errors
/// Returns an error if the text is not RFC 3339.
pub fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StoreError::InvalidRecord(format!("invalid timestamp {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_profile_from_json() {
        let profile = UserProfile::from_json(json!({
            "user_id": "mindful",
            "age_range": "30+",
            "technical_proficiency": "intermediate",
            "learning_preferences": "visual_learner"
        }))
        .unwrap();
        assert_eq!(profile.user_id, "mindful");
        assert_eq!(profile.learning_preferences, "visual_learner");
    }

    #[test]
    fn test_profile_missing_field_is_validation() {
        let err = UserProfile::from_json(json!({
            "age_range": "30+",
            "technical_proficiency": "intermediate",
            "learning_preferences": "visual_learner"
        }))
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_profile_unknown_field_is_validation() {
        let err = UserProfile::from_json(json!({
            "user_id": "u",
            "age_range": "30+",
            "technical_proficiency": "intermediate",
            "learning_preferences": "visual_learner",
            "favourite_colour": "green"
        }))
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_timestamp_text_order_matches_time_order() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert_eq!(a, "2024-05-01T09:00:00.000000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp(&b).unwrap(), late);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(StoreError::InvalidRecord(_))
        ));
    }
}

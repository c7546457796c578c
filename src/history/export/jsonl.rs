//! Line-delimited JSON output for exported conversations.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, IntoInnerError, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::history::core::errors::StoreResult;
use crate::history::export::grouping::ConversationRecord;

/// Counters reported by an export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Lines written, one per conversation.
    pub conversations: usize,
    /// Turns written across all lines.
    pub turns: usize,
}

/// Write each record as one JSON line, replacing `path`.
///
/// Lines go to a temporary file next to `path`, which is renamed over it
/// only once every record has been written and flushed. On error the
/// previous file at `path` is left as it was.
///
/// # Errors
/// Returns an I/O error if the file cannot be created, written, or moved
/// into place, or the first error yielded by `records`.
pub fn write_lines<I>(records: I, path: &Path) -> StoreResult<ExportStats>
where
    I: IntoIterator<Item = StoreResult<ConversationRecord>>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut writer = BufWriter::new(NamedTempFile::new_in(dir)?);
    let mut stats = ExportStats::default();

    for record in records {
        let record = record?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        writer.write_all(line.as_bytes())?;

        stats.conversations += 1;
        stats.turns += record.turns.len();
    }

    let staged = writer.into_inner().map_err(IntoInnerError::into_error)?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(stats)
}

/// Read an export back into records, skipping blank lines.
///
/// # Errors
/// Returns an error if the file cannot be read or a line is not a record.
pub fn read_lines(path: &Path) -> StoreResult<Vec<ConversationRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::history::core::errors::{ErrorKind, StoreError};
    use crate::history::export::grouping::ExportTurn;

    fn record(id: &str, turns: usize) -> ConversationRecord {
        let mut metadata = Map::new();
        metadata.insert("conversation_id".to_string(), json!(id));
        ConversationRecord {
            conversation_id: id.to_string(),
            metadata,
            turns: (0..turns)
                .map(|n| ExportTurn {
                    role: "user".to_string(),
                    content: format!("line\nwith newline {n}"),
                    timestamp: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let stats = write_lines(vec![Ok(record("a", 2)), Ok(record("b", 0))], &path).unwrap();
        assert_eq!(stats, ExportStats { conversations: 2, turns: 2 });

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));

        let back = read_lines(&path).unwrap();
        assert_eq!(back[0], record("a", 2));
        assert_eq!(back[1].conversation_id, "b");
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        write_lines(vec![Ok(record("a", 1)), Ok(record("b", 1))], &path).unwrap();
        write_lines(Vec::new(), &path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        write_lines(vec![Ok(record("a", 1))], &path).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let result = write_lines(
            vec![
                Ok(record("b", 1)),
                Err(StoreError::InvalidRecord("broken".to_string())),
                Ok(record("c", 1)),
            ],
            &path,
        );
        assert!(result.is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_first_write_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let result = write_lines(
            vec![Err(StoreError::InvalidRecord("broken".to_string()))],
            &path,
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("out.jsonl");

        let err = write_lines(Vec::new(), &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

//! Command-line front end over the conversation store.
//!
//! The database path comes from `--db`, then `CHATLOG_DB_PATH`, then the
//! default `data/chatlog.db`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::history::core::config::StoreConfig;
use crate::history::core::ids::new_conversation_id;
use crate::history::core::records::{UserProfile, format_timestamp};
use crate::history::storage::{ConversationStore, SqliteConversationStore};

/// `chatlog` arguments.
#[derive(Debug, Parser)]
#[command(
    name = "chatlog",
    version,
    about = "Store chat turns and export them as a JSONL dataset"
)]
pub struct Cli {
    /// Database path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// `chatlog` subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database and schema if missing.
    Init,
    /// Print a fresh conversation id.
    NewId,
    /// Upsert a user profile from a JSON document with the four profile fields.
    Profile {
        /// `{"user_id", "age_range", "technical_proficiency", "learning_preferences"}`.
        document: String,
    },
    /// Append one turn.
    Append {
        /// Conversation id; created on first use.
        conversation_id: String,
        /// Role label such as `user` or `assistant`.
        role: String,
        /// Message text.
        content: String,
    },
    /// Attach a metadata JSON document to a conversation.
    Metadata {
        /// Conversation id.
        conversation_id: String,
        /// Any JSON document.
        document: String,
    },
    /// Print the turns of a conversation as JSON.
    History {
        /// Conversation id.
        conversation_id: String,
        /// Include turn timestamps.
        #[arg(long)]
        timestamps: bool,
    },
    /// List stored conversations.
    Conversations,
    /// Write every conversation to a JSONL file, one line each.
    Export {
        /// Destination file; replaced if present.
        output: PathBuf,
    },
}

/// Parse arguments, run one command, and map failures to exit code 1.
#[must_use]
pub fn run() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let output = match rt.block_on(execute(cli)) {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    if !output.is_empty() {
        println!("{output}");
    }
    ExitCode::SUCCESS
}

/// Run a parsed command and return the text to print.
///
/// # Errors
/// Returns an error if the config is invalid, an argument is malformed, or
/// the store operation fails.
pub async fn execute(cli: Cli) -> anyhow::Result<String> {
    if matches!(cli.command, Command::NewId) {
        return Ok(new_conversation_id());
    }

    let mut config = StoreConfig::from_env()?;
    if let Some(db) = cli.db {
        config.sqlite_path = db;
    }
    let store = SqliteConversationStore::open(&config)
        .await
        .with_context(|| format!("opening {}", config.sqlite_path.display()))?;

    let output = match cli.command {
        Command::Init | Command::NewId => String::new(),
        Command::Profile { document } => {
            let document = serde_json::from_str(&document).context("profile is not JSON")?;
            let profile = UserProfile::from_json(document)?;
            store.upsert_user_profile(&profile).await?;
            String::new()
        }
        Command::Append {
            conversation_id,
            role,
            content,
        } => {
            store.append_turn(&conversation_id, &role, &content).await?;
            String::new()
        }
        Command::Metadata {
            conversation_id,
            document,
        } => {
            let document: serde_json::Value =
                serde_json::from_str(&document).context("metadata is not JSON")?;
            store.save_metadata(&conversation_id, &document).await?;
            String::new()
        }
        Command::History {
            conversation_id,
            timestamps,
        } => {
            if timestamps {
                serde_json::to_string_pretty(&store.get_turns(&conversation_id).await?)?
            } else {
                serde_json::to_string_pretty(&store.get_history(&conversation_id).await?)?
            }
        }
        Command::Conversations => store
            .list_conversations()
            .await?
            .into_iter()
            .map(|conversation| {
                format!(
                    "{}\t{}\t{}",
                    conversation.conversation_id,
                    conversation.user_id.unwrap_or_default(),
                    format_timestamp(conversation.created_at)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Command::Export { output } => {
            let stats = store
                .export_to_lines(&output)
                .await
                .with_context(|| format!("exporting to {}", output.display()))?;
            format!(
                "exported {} conversations ({} turns) to {}",
                stats.conversations,
                stats.turns,
                output.display()
            )
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::core::errors::{ErrorKind, StoreError};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chatlog").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_global_db_after_subcommand() {
        let cli = parse(&["history", "c1", "--timestamps", "--db", "/tmp/x.db"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(
            cli.command,
            Command::History { timestamps: true, .. }
        ));
    }

    #[test]
    fn test_parse_rejects_missing_arguments() {
        assert!(Cli::try_parse_from(["chatlog", "append", "c1"]).is_err());
    }

    #[tokio::test]
    async fn test_new_id_needs_no_database() {
        let cli = parse(&["--db", "/nonexistent/dir/chat.db", "new-id"]);
        let id = execute(cli).await.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_execute_profile_document() {
        let dir = tempfile::tempdir().unwrap();
        let db_arg = dir.path().join("chat.db").to_string_lossy().to_string();
        let document = r#"{"user_id": "u1", "age_range": "30+", "technical_proficiency": "x", "learning_preferences": "y"}"#;

        execute(parse(&["--db", &db_arg, "profile", document]))
            .await
            .unwrap();

        let store = SqliteConversationStore::open(&StoreConfig::with_path(&db_arg))
            .await
            .unwrap();
        let stored = store.get_user_profile("u1").await.unwrap().unwrap();
        assert_eq!(stored, UserProfile::new("u1", "30+", "x", "y"));
    }

    #[tokio::test]
    async fn test_execute_append_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let db_arg = db.to_string_lossy().to_string();
        let out = dir.path().join("dataset.jsonl");
        let out_arg = out.to_string_lossy().to_string();

        execute(parse(&["--db", &db_arg, "append", "c1", "user", "hello"]))
            .await
            .unwrap();
        execute(parse(&["--db", &db_arg, "metadata", "c1", r#"{"foo": 1}"#]))
            .await
            .unwrap();

        let history = execute(parse(&["--db", &db_arg, "history", "c1"]))
            .await
            .unwrap();
        assert!(history.contains("hello"));

        let summary = execute(parse(&["--db", &db_arg, "export", &out_arg]))
            .await
            .unwrap();
        assert!(summary.starts_with("exported 1 conversations (1 turns)"));
        assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_execute_profile_requires_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let db_arg = dir.path().join("chat.db").to_string_lossy().to_string();
        let document = r#"{"age_range": "30+", "technical_proficiency": "x", "learning_preferences": "y"}"#;

        let err = execute(parse(&["--db", &db_arg, "profile", document]))
            .await
            .unwrap_err();
        let store_err = err.downcast_ref::<StoreError>().unwrap();
        assert_eq!(store_err.kind(), ErrorKind::Validation);
    }
}

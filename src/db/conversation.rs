//! Conversation repository: per-user turns and rolling summary

use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use super::DbPool;
use super::retry::{self, RetryPolicy};
use crate::Result;

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    /// Wire name used by chat-completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == TurnRole::System
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }
}

/// Stored memory for one user
///
/// An empty record means "no state yet". It is also what a failed read
/// degrades to, so callers cannot tell the two apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Chronological turns, at most one leading system turn
    pub history: Vec<Turn>,
    /// Accumulated compaction summaries, separated by blank lines
    pub summary: String,
}

impl ConversationRecord {
    /// Number of user turns in the history
    #[must_use]
    pub fn user_turns(&self) -> usize {
        self.history.iter().filter(|t| t.is_user()).count()
    }

    /// Insert `prompt` as the leading system turn unless one is already there
    pub fn ensure_system_turn(&mut self, prompt: &str) {
        if !self.history.first().is_some_and(Turn::is_system) {
            self.history.insert(0, Turn::system(prompt));
        }
    }
}

/// Conversation repository
#[derive(Clone)]
pub struct ConversationRepo {
    pool: DbPool,
    policy: RetryPolicy,
}

impl ConversationRepo {
    /// Create a new conversation repository with the default retry policy
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self::with_policy(pool, RetryPolicy::default())
    }

    /// Create a repository with an explicit retry policy
    #[must_use]
    pub const fn with_policy(pool: DbPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Load a user's record, or an empty one if absent or unreadable
    pub async fn load(&self, user_id: &str) -> ConversationRecord {
        retry::retry_or(
            &self.pool,
            &self.policy,
            "load_conversation",
            ConversationRecord::default(),
            |tx| {
                let row: Option<(String, String)> = tx
                    .query_row(
                        "SELECT history, summary FROM conversations WHERE user_id = ?1",
                        [user_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let Some((history, summary)) = row else {
                    return Ok(ConversationRecord::default());
                };

                Ok(ConversationRecord {
                    history: serde_json::from_str(&history)?,
                    summary,
                })
            },
        )
        .await
    }

    /// Persist a user's record, creating it on first write
    ///
    /// Failures are logged and swallowed so message processing carries on.
    pub async fn save(&self, user_id: &str, record: &ConversationRecord) {
        let result = self.try_save(user_id, record).await;
        if let Err(e) = result {
            tracing::error!(user_id, error = %e, "failed to save conversation");
        }
    }

    /// Persist a user's record, surfacing the final error
    ///
    /// # Errors
    ///
    /// Returns error if the write fails after retries
    pub async fn try_save(&self, user_id: &str, record: &ConversationRecord) -> Result<()> {
        let history = serde_json::to_string(&record.history)?;

        retry::retry(&self.pool, &self.policy, "save_conversation", |tx| {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                r"INSERT INTO conversations (user_id, history, summary, created_at, updated_at)
                  VALUES (?1, ?2, ?3, ?4, ?4)
                  ON CONFLICT(user_id) DO UPDATE SET
                    history = excluded.history,
                    summary = excluded.summary,
                    updated_at = excluded.updated_at",
                rusqlite::params![user_id, history, record.summary, now],
            )?;
            Ok(())
        })
        .await
    }
}

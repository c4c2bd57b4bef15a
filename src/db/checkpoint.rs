//! Per-group delivery checkpoint repository

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use super::DbPool;
use super::retry::{self, RetryPolicy};
use crate::Result;

/// Order two platform message ids
///
/// Ids are opaque strings, but platforms hand out increasing decimal
/// numbers. Numeric comparison is used when both parse; otherwise shorter
/// ids sort first, then lexical order, which agrees with numeric order for
/// unpadded decimals of any width.
#[must_use]
pub fn compare_message_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

/// Stored progress for one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub group_id: String,
    pub last_message_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Checkpoint repository
#[derive(Clone)]
pub struct CheckpointRepo {
    pool: DbPool,
    policy: RetryPolicy,
}

impl CheckpointRepo {
    /// Create a new checkpoint repository with the default retry policy
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self::with_policy(pool, RetryPolicy::default())
    }

    /// Create a repository with an explicit retry policy
    #[must_use]
    pub const fn with_policy(pool: DbPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Last processed message id for a group
    ///
    /// `None` means no progress yet, or that the store could not be read.
    pub async fn get(&self, group_id: &str) -> Option<String> {
        retry::retry_or(&self.pool, &self.policy, "get_checkpoint", None, |tx| {
            let id: Option<Option<String>> = tx
                .query_row(
                    "SELECT last_message_id FROM group_checkpoints WHERE group_id = ?1",
                    [group_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id.flatten())
        })
        .await
    }

    /// Full checkpoint row for a group, if one exists and is readable
    pub async fn load(&self, group_id: &str) -> Option<Checkpoint> {
        retry::retry_or(&self.pool, &self.policy, "load_checkpoint", None, |tx| {
            let row = tx
                .query_row(
                    "SELECT last_message_id, updated_at FROM group_checkpoints WHERE group_id = ?1",
                    [group_id],
                    |row| {
                        Ok(Checkpoint {
                            group_id: group_id.to_string(),
                            last_message_id: row.get(0)?,
                            updated_at: parse_datetime(&row.get::<_, String>(1)?),
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    /// Move a group's checkpoint forward to `message_id`
    ///
    /// Ids ordered before the stored value are ignored, so the checkpoint
    /// never regresses. Failures are logged and swallowed. Returns whether
    /// the stored value changed.
    pub async fn advance(&self, group_id: &str, message_id: &str) -> bool {
        match self.try_advance(group_id, message_id).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(group_id, message_id, error = %e, "failed to advance checkpoint");
                false
            }
        }
    }

    /// Move a group's checkpoint forward, surfacing the final error
    ///
    /// # Errors
    ///
    /// Returns error if the write fails after retries
    pub async fn try_advance(&self, group_id: &str, message_id: &str) -> Result<bool> {
        retry::retry(&self.pool, &self.policy, "advance_checkpoint", |tx| {
            let current: Option<Option<String>> = tx
                .query_row(
                    "SELECT last_message_id FROM group_checkpoints WHERE group_id = ?1",
                    [group_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(current) = current.flatten() {
                if compare_message_ids(message_id, &current) != Ordering::Greater {
                    return Ok(false);
                }
            }

            let now = Utc::now().to_rfc3339();
            tx.execute(
                r"INSERT INTO group_checkpoints (group_id, last_message_id, updated_at)
                  VALUES (?1, ?2, ?3)
                  ON CONFLICT(group_id) DO UPDATE SET
                    last_message_id = excluded.last_message_id,
                    updated_at = excluded.updated_at",
                [group_id, message_id, now.as_str()],
            )?;
            Ok(true)
        })
        .await
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn compares_numerically_when_possible() {
        assert_eq!(compare_message_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_message_ids("103", "101"), Ordering::Greater);
        assert_eq!(compare_message_ids("42", "42"), Ordering::Equal);
    }

    #[test]
    fn falls_back_to_length_then_lexical() {
        assert_eq!(compare_message_ids("a9", "a10"), Ordering::Less);
        assert_eq!(compare_message_ids("abc", "abd"), Ordering::Less);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let repo = CheckpointRepo::new(db::init_memory().unwrap());
        assert_eq!(repo.get("group").await, None);
    }

    #[tokio::test]
    async fn advance_creates_lazily_and_moves_forward() {
        let repo = CheckpointRepo::new(db::init_memory().unwrap());

        assert!(repo.advance("g", "101").await);
        assert_eq!(repo.get("g").await.as_deref(), Some("101"));

        assert!(repo.advance("g", "103").await);
        assert_eq!(repo.get("g").await.as_deref(), Some("103"));
    }

    #[tokio::test]
    async fn advance_never_regresses() {
        let repo = CheckpointRepo::new(db::init_memory().unwrap());
        repo.advance("g", "200").await;

        assert!(!repo.advance("g", "150").await);
        assert!(!repo.advance("g", "200").await);
        assert_eq!(repo.get("g").await.as_deref(), Some("200"));
    }

    #[tokio::test]
    async fn load_reports_update_time() {
        let repo = CheckpointRepo::new(db::init_memory().unwrap());
        assert!(repo.load("g").await.is_none());

        let before = Utc::now() - chrono::Duration::seconds(1);
        repo.advance("g", "9").await;

        let checkpoint = repo.load("g").await.unwrap();
        assert_eq!(checkpoint.last_message_id.as_deref(), Some("9"));
        assert!(checkpoint.updated_at >= before);
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let repo = CheckpointRepo::new(db::init_memory().unwrap());
        repo.advance("a", "5").await;
        repo.advance("b", "1").await;

        assert_eq!(repo.get("a").await.as_deref(), Some("5"));
        assert_eq!(repo.get("b").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn unreadable_store_degrades_to_none() {
        let pool = db::init_memory().unwrap();
        let repo = CheckpointRepo::with_policy(pool.clone(), RetryPolicy::immediate(2));
        repo.advance("g", "7").await;

        pool.get()
            .unwrap()
            .execute_batch("DROP TABLE group_checkpoints")
            .unwrap();

        assert_eq!(repo.get("g").await, None);
        assert!(!repo.advance("g", "8").await);
    }
}

//! Retry wrapper for store operations
//!
//! Every read and write runs as one unit of work inside a transaction. A
//! transient fault rolls the transaction back, retires the connection so the
//! pool opens a fresh one, waits a fixed backoff and tries again. Callers
//! choose what exhaustion means: `retry` surfaces the last error, `retry_or`
//! substitutes an explicit default.

use std::time::Duration;

use rusqlite::Transaction;

use super::{DbPool, ManagedConnection};
use crate::{Error, Result};

/// Retry policy for store operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, for tests
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }
}

/// Run `op` in a transaction, retrying transient faults per `policy`
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-transient error immediately
pub async fn retry<T, F>(pool: &DbPool, policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match run_once(pool, &mut op) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(
                    op = label,
                    attempt,
                    error = %e,
                    "transient store fault, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run `op` with retries, substituting `default` when it ultimately fails
///
/// The failure is logged; callers see only the default. Reads use this to
/// degrade to "no state yet" instead of failing the message.
pub async fn retry_or<T, F>(
    pool: &DbPool,
    policy: &RetryPolicy,
    label: &str,
    default: T,
    op: F,
) -> T
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    match retry(pool, policy, label, op).await {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(op = label, error = %e, "store operation failed, using default");
            default
        }
    }
}

/// One attempt: checkout, begin, run, commit
///
/// Dropping an uncommitted transaction rolls the work back. After a
/// transient fault the connection is marked broken, so the pool closes it
/// rather than handing it to the next attempt.
fn run_once<T, F>(pool: &DbPool, op: &mut F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let mut conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;

    let result = in_transaction(&mut conn, op);
    if result.as_ref().is_err_and(Error::is_transient) {
        conn.mark_broken();
    }
    result
}

fn in_transaction<T, F>(conn: &mut ManagedConnection, op: &mut F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

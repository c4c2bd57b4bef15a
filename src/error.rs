//! Error types for the chat relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the chat relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Completion service error
    #[error("completion error: {0}")]
    Completion(String),

    /// Messaging platform error
    #[error("gateway error: {0}")]
    Gateway(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error (pool checkout, connection setup)
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this is a transport-level storage fault worth retrying
    ///
    /// Pool checkout failures and `SQLite` busy/locked/IO conditions are
    /// transient. Constraint violations, malformed rows and missing tables
    /// are not: retrying them would fail the same way.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Database(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::OutOfMemory
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> Error {
        Error::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn pool_errors_are_transient() {
        assert!(Error::Database("timed out waiting for connection".into()).is_transient());
    }

    #[test]
    fn busy_and_locked_are_transient() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_transient());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_transient());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_IOERR).is_transient());
    }

    #[test]
    fn logic_errors_are_not_transient() {
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_transient());
        assert!(!Error::Sqlite(rusqlite::Error::QueryReturnedNoRows).is_transient());
        assert!(!Error::Config("missing key".into()).is_transient());
    }
}

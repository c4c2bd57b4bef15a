//! Pool manager that can retire faulted connections
//!
//! `r2d2_sqlite` never reports a connection as broken, so a connection that
//! hit an IO or locking fault would go straight back into the pool. Marking
//! it here makes r2d2 close it on return and open a replacement.

use std::ops::{Deref, DerefMut};

use r2d2::ManageConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

/// `SQLite` connection plus a flag that retires it on return to the pool
#[derive(Debug)]
pub struct ManagedConnection {
    conn: Connection,
    broken: bool,
}

impl ManagedConnection {
    /// Close this connection instead of returning it to the pool
    pub const fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for ManagedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for ManagedConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Connection manager wrapping [`SqliteConnectionManager`]
pub struct RelayConnectionManager {
    inner: SqliteConnectionManager,
}

impl RelayConnectionManager {
    #[must_use]
    pub const fn new(inner: SqliteConnectionManager) -> Self {
        Self { inner }
    }
}

impl ManageConnection for RelayConnectionManager {
    type Connection = ManagedConnection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<ManagedConnection, rusqlite::Error> {
        self.inner.connect().map(|conn| ManagedConnection {
            conn,
            broken: false,
        })
    }

    fn is_valid(&self, conn: &mut ManagedConnection) -> Result<(), rusqlite::Error> {
        self.inner.is_valid(&mut conn.conn)
    }

    fn has_broken(&self, conn: &mut ManagedConnection) -> bool {
        conn.broken
    }
}

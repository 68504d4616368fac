//! SQLite store for users, complaints and their child records
//!
//! ## Tables
//!
//! - `users` - identities linked to the external issuer by `subject`
//! - `complaints` - complaint records, ward immutable after insert
//! - `comments` - complaint comments with their own visibility tag
//! - `status_history` - append-only audit trail of status changes
//! - `assignments` - officer assignments, at most one ACTIVE per complaint
//! - `notifications` - outbox consumed by the external delivery worker
//!
//! Child tables cascade on complaint delete; `PRAGMA foreign_keys` is enabled
//! on every connection.

pub mod assignments;
pub mod comments;
pub mod complaints;
pub mod history;
pub mod notifications;
pub mod schema;
pub mod users;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::WardError;

/// Default wait on a locked database file
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database shared by the services
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, WardError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create the database file with an explicit busy timeout
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, WardError> {
        info!("Opening SQLite database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WardError::Config(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL keeps snapshot reads consistent while another connection writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(busy_timeout)?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, WardError> {
        debug!("Opening in-memory SQLite database");
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, WardError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read with shared access to the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, WardError>
    where
        F: FnOnce(&Connection) -> Result<T, WardError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| WardError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write (or a transaction) with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, WardError>
    where
        F: FnOnce(&mut Connection) -> Result<T, WardError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| WardError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Row counts, for the CLI `init` report
    pub fn stats(&self) -> Result<DbStats, WardError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, WardError> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
                Ok(n as u64)
            };

            Ok(DbStats {
                users: count("users")?,
                complaints: count("complaints")?,
                comments: count("comments")?,
                assignments: count("assignments")?,
                pending_notifications: conn.query_row(
                    "SELECT COUNT(*) FROM notifications WHERE delivered_at IS NULL",
                    [],
                    |row| row.get::<_, i64>(0),
                )? as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub users: u64,
    pub complaints: u64,
    pub comments: u64,
    pub assignments: u64,
    pub pending_notifications: u64,
}

/// Current UTC time as an RFC 3339 string; sorts lexically
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Fresh opaque row id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

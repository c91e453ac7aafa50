//! Persistence layer for Formflow.
//!
//! Forms, their field schemas, and submissions stored as EAV rows in SQLite.
//! Every multi-row write goes through a single sqlx transaction; nothing
//! outside this crate issues SQL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use formflow_db::{FormflowDb, DbOptions};
//!
//! let db = FormflowDb::open("~/.formflow/formflow.sqlite3", DbOptions::default()).await?;
//! let form = db.save_form_schema(&edit).await?;
//! let fields = db.get_fields(&form.id).await?;
//! ```

mod error;
mod schema;
mod types;

// Method implementations organized by domain
mod forms;
mod submissions;

pub use error::{DbError, Result};
pub use submissions::SubmissionTx;
pub use types::*;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub max_connections: u32,
    /// How long a writer waits for the SQLite write lock before failing
    pub busy_timeout: Duration,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the Formflow database.
///
/// This is the ONLY way to access the database. Cloning is cheap (pool handle).
#[derive(Clone)]
pub struct FormflowDb {
    pool: SqlitePool,
}

impl FormflowDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>, options: DbOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open a private in-memory database (tests, dry runs).
    ///
    /// Uses a single long-lived connection, so a transaction in flight blocks
    /// every other query on this handle.
    pub async fn open_in_memory() -> Result<Self> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for tests and tooling).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl FormflowDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert stored milliseconds back to a timestamp.
    pub fn millis_to_datetime(millis: i64) -> Result<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| DbError::invalid_state(format!("Timestamp out of range: {}", millis)))
    }
}

//! SQLite persistence layer for Easel.
//!
//! Owns the job, upscale-job, and banned-word tables. Schema creation is
//! idempotent and migrations are additive, so opening an existing database
//! is always safe. All reads and writes hand out domain structs from
//! `easel_protocol`, never raw rows.

mod banned;
mod error;
mod jobs;
mod purge;
mod schema;
mod upscales;

pub use error::{DbError, Result};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Handle to the Easel database. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct EaselDb {
    pool: Pool<Sqlite>,
}

impl EaselDb {
    /// Open (creating if needed) the database at `path` and apply the
    /// schema. WAL and foreign-key enforcement are connection options so
    /// every pooled connection gets them.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        info!("Database opened at {path}");
        Ok(db)
    }

    /// In-memory database for tests. A single connection, so every query
    /// sees the same store.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

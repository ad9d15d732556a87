//! Schema creation and additive migrations.
//!
//! All CREATE TABLE statements live here - single source of truth. Tables
//! are created idempotently; later columns are added through `MIGRATIONS`,
//! guarded by live introspection of existing columns so re-running at every
//! boot is a no-op.

use crate::error::Result;
use crate::EaselDb;
use sqlx::Row;
use std::collections::HashSet;
use tracing::info;

/// Columns added after the original schema shipped. Each entry is applied
/// only when introspection shows the column is missing.
const MIGRATIONS: &[(&str, &str, &str)] = &[
    (
        "jobs",
        "adapters",
        "ALTER TABLE jobs ADD COLUMN adapters TEXT NOT NULL DEFAULT '[]'",
    ),
    (
        "jobs",
        "origin_scope_id",
        "ALTER TABLE jobs ADD COLUMN origin_scope_id TEXT NOT NULL DEFAULT ''",
    ),
    (
        "upscale_jobs",
        "origin_scope_id",
        "ALTER TABLE upscale_jobs ADD COLUMN origin_scope_id TEXT NOT NULL DEFAULT ''",
    ),
    (
        "banned_words",
        "partial",
        "ALTER TABLE banned_words ADD COLUMN partial INTEGER NOT NULL DEFAULT 0",
    ),
];

impl EaselDb {
    /// Ensure tables, indices, and additive columns exist. WAL and
    /// foreign-key pragmas are applied as connection options at open.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_tables().await?;
        self.apply_migrations().await?;

        info!("Database schema verified");
        Ok(())
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL,
                origin_scope_id TEXT NOT NULL DEFAULT '',
                origin_channel_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                model TEXT NOT NULL,
                sampler TEXT NOT NULL,
                scheduler TEXT NOT NULL,
                steps INTEGER NOT NULL,
                cfg REAL NOT NULL,
                seed INTEGER NOT NULL,
                size TEXT NOT NULL DEFAULT 'portrait',
                positive_prompt TEXT NOT NULL,
                negative_prompt TEXT NOT NULL DEFAULT '',
                adapters TEXT NOT NULL DEFAULT '[]',
                backend_prompt_id TEXT,
                output_images TEXT,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS upscale_jobs (
                id TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL,
                origin_scope_id TEXT NOT NULL DEFAULT '',
                origin_channel_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                source_job_id TEXT NOT NULL REFERENCES jobs(id),
                source_image_filename TEXT NOT NULL,
                upscale_model TEXT NOT NULL,
                positive_prompt TEXT NOT NULL DEFAULT '',
                negative_prompt TEXT NOT NULL DEFAULT '',
                backend_prompt_id TEXT,
                output_images TEXT,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS banned_words (
                word TEXT PRIMARY KEY COLLATE NOCASE,
                partial INTEGER NOT NULL DEFAULT 0,
                added_by TEXT NOT NULL,
                added_at INTEGER NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_requester ON jobs(requester_id)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upscales_status ON upscale_jobs(status)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upscales_source ON upscale_jobs(source_job_id)")
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn apply_migrations(&self) -> Result<()> {
        for (table, column, ddl) in MIGRATIONS {
            let existing = self.existing_columns(table).await?;
            if !existing.contains(*column) {
                info!("Applying migration: {table}.{column}");
                sqlx::query(ddl).execute(self.pool()).await?;
            }
        }
        Ok(())
    }

    async fn existing_columns(&self, table: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(self.pool())
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect())
    }
}

//! Retention purge: one transaction deleting aged terminal rows.

use crate::error::Result;
use crate::EaselDb;
use tracing::info;

impl EaselDb {
    /// Delete terminal (`completed`/`failed`) rows older than `cutoff_ms`,
    /// upscale jobs first so no deleted job leaves a dangling reference.
    /// Jobs still referenced by a surviving upscale row are kept until that
    /// row ages out. Returns `(jobs_deleted, upscales_deleted)`.
    pub async fn purge_old(&self, cutoff_ms: i64) -> Result<(u64, u64)> {
        let mut tx = self.pool().begin().await?;

        let upscales_deleted = sqlx::query(
            r#"
            DELETE FROM upscale_jobs
            WHERE status IN ('completed', 'failed')
              AND created_at < ?
            "#,
        )
        .bind(cutoff_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let jobs_deleted = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed')
              AND created_at < ?
              AND id NOT IN (SELECT source_job_id FROM upscale_jobs)
            "#,
        )
        .bind(cutoff_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!("Purged {jobs_deleted} job(s) and {upscales_deleted} upscale(s)");
        Ok((jobs_deleted, upscales_deleted))
    }
}

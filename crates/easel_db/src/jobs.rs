//! Generation job operations.

use crate::error::{DbError, Result};
use crate::EaselDb;
use easel_protocol::{now_ms, AdapterSlot, Job, JobParams, JobStatus, SizePreset};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

impl EaselDb {
    /// Insert a new job with `status=queued` and `created_at=now`.
    pub async fn insert_job(&self, id: Uuid, params: JobParams) -> Result<Job> {
        let adapters = serde_json::to_string(&params.adapters)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, requester_id, origin_scope_id, origin_channel_id, status,
                model, sampler, scheduler, steps, cfg, seed, size,
                positive_prompt, negative_prompt, adapters, created_at
            )
            VALUES (?, ?, ?, ?, 'queued', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&params.requester_id)
        .bind(&params.origin_scope_id)
        .bind(&params.origin_channel_id)
        .bind(&params.model)
        .bind(&params.sampler)
        .bind(&params.scheduler)
        .bind(params.steps as i64)
        .bind(params.cfg)
        .bind(params.seed)
        .bind(params.size.as_str())
        .bind(&params.positive_prompt)
        .bind(&params.negative_prompt)
        .bind(adapters)
        .bind(now_ms())
        .execute(self.pool())
        .await?;

        self.get_job(id).await
    }

    /// Fetch a job by id; `NotFound` if absent.
    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => row_to_job(&row),
            None => Err(DbError::not_found(format!("job {id}"))),
        }
    }

    /// Stamp a job running with its backend prompt id.
    pub async fn set_job_running(&self, id: Uuid, backend_prompt_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running',
                backend_prompt_id = ?,
                started_at = ?
            WHERE id = ?
            "#,
        )
        .bind(backend_prompt_id)
        .bind(now_ms())
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Mark a job completed with its output filenames.
    pub async fn set_job_completed(&self, id: Uuid, filenames: &[String]) -> Result<()> {
        let outputs = serde_json::to_string(filenames)?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                output_images = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(outputs)
        .bind(now_ms())
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        info!("Job {id} completed with {} image(s)", filenames.len());
        Ok(())
    }

    /// Mark a job failed. Also stamps `started_at` for jobs that never
    /// reached the renderer, keeping the timestamp invariant intact.
    pub async fn set_job_failed(&self, id: Uuid, message: &str) -> Result<()> {
        let now = now_ms();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_message = ?,
                started_at = COALESCE(started_at, ?),
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        info!("Job {id} failed: {message}");
        Ok(())
    }

    /// Queued jobs created strictly before the given job. Displayed to the
    /// user as their queue position.
    pub async fn count_queued_before(&self, id: Uuid) -> Result<i64> {
        let job = self.get_job(id).await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status = 'queued' AND created_at < ?",
        )
        .bind(job.created_at)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Queued jobs in submission order, for the boot recovery sweep.
    pub async fn queued_jobs_oldest_first(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE status = 'queued' ORDER BY created_at ASC")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_job).collect()
    }
}

pub(crate) fn row_to_job(row: &SqliteRow) -> Result<Job> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|_| DbError::corrupt_row(format!("bad job id: {id_str}")))?;
    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| DbError::corrupt_row(format!("unknown job status: {status_str}")))?;
    let size_str: String = row.get("size");
    let adapters_json: String = row.get("adapters");
    let adapters: Vec<AdapterSlot> = serde_json::from_str(&adapters_json)?;
    let outputs_json: Option<String> = row.get("output_images");
    let output_images = match outputs_json {
        Some(json) => Some(serde_json::from_str::<Vec<String>>(&json)?),
        None => None,
    };

    Ok(Job {
        id,
        requester_id: row.get("requester_id"),
        origin_scope_id: row.get("origin_scope_id"),
        origin_channel_id: row.get("origin_channel_id"),
        status,
        model: row.get("model"),
        sampler: row.get("sampler"),
        scheduler: row.get("scheduler"),
        steps: row.get::<i64, _>("steps") as u32,
        cfg: row.get("cfg"),
        seed: row.get("seed"),
        size: SizePreset::parse(&size_str),
        positive_prompt: row.get("positive_prompt"),
        negative_prompt: row.get("negative_prompt"),
        adapters,
        backend_prompt_id: row.get("backend_prompt_id"),
        output_images,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::job_params;
    use crate::EaselDb;
    use easel_protocol::JobStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let db = EaselDb::open_memory().await.unwrap();
        let id = Uuid::new_v4();
        let inserted = db.insert_job(id, job_params("u1")).await.unwrap();

        assert_eq!(inserted.id, id);
        assert_eq!(inserted.status, JobStatus::Queued);
        assert!(inserted.created_at > 0);
        assert!(inserted.started_at.is_none());
        assert!(inserted.completed_at.is_none());
        assert!(inserted.backend_prompt_id.is_none());
        assert_eq!(inserted.adapters.len(), 1);

        let fetched = db.get_job(id).await.unwrap();
        assert_eq!(inserted, fetched);
    }

    #[tokio::test]
    async fn get_missing_job_is_not_found() {
        let db = EaselDb::open_memory().await.unwrap();
        let err = db.get_job(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, crate::DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_transitions_stamp_timestamps() {
        let db = EaselDb::open_memory().await.unwrap();
        let id = Uuid::new_v4();
        db.insert_job(id, job_params("u1")).await.unwrap();

        db.set_job_running(id, "prompt-abc").await.unwrap();
        let running = db.get_job(id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.backend_prompt_id.as_deref(), Some("prompt-abc"));
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        db.set_job_completed(id, &["out_00001_.png".to_string()])
            .await
            .unwrap();
        let done = db.get_job(id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(
            done.output_images.as_deref(),
            Some(&["out_00001_.png".to_string()][..])
        );
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn fail_before_running_still_stamps_started_at() {
        let db = EaselDb::open_memory().await.unwrap();
        let id = Uuid::new_v4();
        db.insert_job(id, job_params("u1")).await.unwrap();

        db.set_job_failed(id, "template drift").await.unwrap();
        let failed = db.get_job(id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("template drift"));
        assert!(failed.started_at.is_some());
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn queue_position_counts_strictly_earlier_rows() {
        let db = EaselDb::open_memory().await.unwrap();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        db.insert_job(first, job_params("u1")).await.unwrap();
        // Force distinct created_at ordering.
        sqlx::query("UPDATE jobs SET created_at = created_at - 1000 WHERE id = ?")
            .bind(first.to_string())
            .execute(db.pool())
            .await
            .unwrap();
        db.insert_job(second, job_params("u2")).await.unwrap();

        assert_eq!(db.count_queued_before(first).await.unwrap(), 0);
        assert_eq!(db.count_queued_before(second).await.unwrap(), 1);

        db.set_job_running(first, "p1").await.unwrap();
        assert_eq!(db.count_queued_before(second).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recovery_sweep_sees_queued_in_order() {
        let db = EaselDb::open_memory().await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.insert_job(a, job_params("u1")).await.unwrap();
        sqlx::query("UPDATE jobs SET created_at = created_at - 1000 WHERE id = ?")
            .bind(a.to_string())
            .execute(db.pool())
            .await
            .unwrap();
        db.insert_job(b, job_params("u2")).await.unwrap();
        db.set_job_running(b, "p2").await.unwrap();
        let c = Uuid::new_v4();
        db.insert_job(c, job_params("u3")).await.unwrap();

        let queued = db.queued_jobs_oldest_first().await.unwrap();
        let ids: Vec<_> = queued.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a, c]);
    }
}

//! Upscale job operations. Same lifecycle as generation jobs, smaller shape.

use crate::error::{DbError, Result};
use crate::EaselDb;
use easel_protocol::{now_ms, JobStatus, UpscaleJob, UpscaleJobParams};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

impl EaselDb {
    pub async fn insert_upscale_job(
        &self,
        id: Uuid,
        params: UpscaleJobParams,
    ) -> Result<UpscaleJob> {
        sqlx::query(
            r#"
            INSERT INTO upscale_jobs (
                id, requester_id, origin_scope_id, origin_channel_id, status,
                source_job_id, source_image_filename, upscale_model,
                positive_prompt, negative_prompt, created_at
            )
            VALUES (?, ?, ?, ?, 'queued', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&params.requester_id)
        .bind(&params.origin_scope_id)
        .bind(&params.origin_channel_id)
        .bind(params.source_job_id.to_string())
        .bind(&params.source_image_filename)
        .bind(&params.upscale_model)
        .bind(&params.positive_prompt)
        .bind(&params.negative_prompt)
        .bind(now_ms())
        .execute(self.pool())
        .await?;

        self.get_upscale_job(id).await
    }

    pub async fn get_upscale_job(&self, id: Uuid) -> Result<UpscaleJob> {
        let row = sqlx::query("SELECT * FROM upscale_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => row_to_upscale(&row),
            None => Err(DbError::not_found(format!("upscale job {id}"))),
        }
    }

    pub async fn set_upscale_running(&self, id: Uuid, backend_prompt_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upscale_jobs
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

    pub async fn set_upscale_completed(&self, id: Uuid, filenames: &[String]) -> Result<()> {
        let outputs = serde_json::to_string(filenames)?;
        sqlx::query(
            r#"
            UPDATE upscale_jobs
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
        info!("Upscale {id} completed with {} image(s)", filenames.len());
        Ok(())
    }

    pub async fn set_upscale_failed(&self, id: Uuid, message: &str) -> Result<()> {
        let now = now_ms();
        sqlx::query(
            r#"
            UPDATE upscale_jobs
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
        info!("Upscale {id} failed: {message}");
        Ok(())
    }

    /// Queued upscale jobs in submission order, for the boot recovery sweep.
    pub async fn queued_upscales_oldest_first(&self) -> Result<Vec<UpscaleJob>> {
        let rows =
            sqlx::query("SELECT * FROM upscale_jobs WHERE status = 'queued' ORDER BY created_at ASC")
                .fetch_all(self.pool())
                .await?;
        rows.iter().map(row_to_upscale).collect()
    }
}

fn row_to_upscale(row: &SqliteRow) -> Result<UpscaleJob> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|_| DbError::corrupt_row(format!("bad upscale id: {id_str}")))?;
    let source_str: String = row.get("source_job_id");
    let source_job_id = Uuid::parse_str(&source_str)
        .map_err(|_| DbError::corrupt_row(format!("bad source job id: {source_str}")))?;
    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| DbError::corrupt_row(format!("unknown job status: {status_str}")))?;
    let outputs_json: Option<String> = row.get("output_images");
    let output_images = match outputs_json {
        Some(json) => Some(serde_json::from_str::<Vec<String>>(&json)?),
        None => None,
    };

    Ok(UpscaleJob {
        id,
        requester_id: row.get("requester_id"),
        origin_scope_id: row.get("origin_scope_id"),
        origin_channel_id: row.get("origin_channel_id"),
        status,
        source_job_id,
        source_image_filename: row.get("source_image_filename"),
        upscale_model: row.get("upscale_model"),
        positive_prompt: row.get("positive_prompt"),
        negative_prompt: row.get("negative_prompt"),
        backend_prompt_id: row.get("backend_prompt_id"),
        output_images,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

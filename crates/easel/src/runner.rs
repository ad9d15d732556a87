//! The single-slot runner: binds, submits, polls, records, notifies.
//!
//! One entry is processed at a time, in queue order. The store write for a
//! status always lands before the user-visible action that depends on it.
//! Renderer and chat failures mark the job and never wedge the runner.

use crate::backend::RenderBackend;
use crate::gateway::{
    result_buttons, upscale_delete_button, Attachment, ChatNotifier, EphemeralToken, ResultPost,
    ResultSummary, UpscaleResultPost,
};
use crate::metadata::MetadataCache;
use crate::queue::{JobKind, JobQueue, QueueEntry};
use easel_db::{DbError, EaselDb};
use easel_renderer::HistoryEntry;
use easel_workflow::TemplateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Renderer history poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Runner<B: RenderBackend> {
    db: EaselDb,
    backend: Arc<B>,
    templates: Arc<TemplateStore>,
    notifier: Arc<dyn ChatNotifier>,
    queue: Arc<JobQueue>,
    metadata: Arc<MetadataCache>,
    /// Per-job completion deadline.
    deadline: Duration,
    upscale_enabled: bool,
}

impl<B: RenderBackend> Runner<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: EaselDb,
        backend: Arc<B>,
        templates: Arc<TemplateStore>,
        notifier: Arc<dyn ChatNotifier>,
        queue: Arc<JobQueue>,
        metadata: Arc<MetadataCache>,
        deadline: Duration,
        upscale_enabled: bool,
    ) -> Self {
        Self {
            db,
            backend,
            templates,
            notifier,
            queue,
            metadata,
            deadline,
            upscale_enabled,
        }
    }

    /// Drain the queue forever. Receiving and processing sequentially is
    /// what enforces the concurrency of exactly one.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<QueueEntry>) {
        while let Some(entry) = rx.recv().await {
            let result = match entry.kind {
                JobKind::Generation => self.process_generation(entry.job_id).await,
                JobKind::Upscale => self.process_upscale(entry.job_id).await,
            };
            // Store failures are logged and the runner advances; the slot
            // must always clear.
            if let Err(err) = result {
                error!("Job {} aborted on store failure: {err}", entry.job_id);
            }
        }
    }

    async fn process_generation(&self, job_id: Uuid) -> easel_db::Result<()> {
        let mut job = match self.db.get_job(job_id).await {
            Ok(job) => job,
            Err(DbError::NotFound(_)) => {
                warn!("Dropping queue entry for unknown job {job_id}");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let token = self.queue.take_token(job_id);

        // Persisted adapters carry no trigger words; refill from the
        // metadata cache populated at selection time.
        for slot in &mut job.adapters {
            if let Some(words) = self.metadata.cached_words(&slot.name) {
                slot.trigger_words = words;
            }
        }

        let graph = match self.templates.bind_generation(&job) {
            Ok(graph) => graph,
            Err(err) => {
                let message = format!("Workflow bind failed: {err}");
                self.db.set_job_failed(job_id, &message).await?;
                self.notify_failure(&job.origin_channel_id, &job.requester_id, &message, &token)
                    .await;
                return Ok(());
            }
        };

        let backend_prompt_id = match self.backend.submit(&graph).await {
            Ok(id) => id,
            Err(err) => {
                let message = format!("Renderer rejected the job: {err}");
                self.db.set_job_failed(job_id, &message).await?;
                self.notify_failure(&job.origin_channel_id, &job.requester_id, &message, &token)
                    .await;
                return Ok(());
            }
        };

        self.db.set_job_running(job_id, &backend_prompt_id).await?;
        info!("Job {job_id} running as prompt {backend_prompt_id}");
        self.update_ephemeral(&token, "Your image is being generated...")
            .await;

        match self.poll_until_complete(&backend_prompt_id).await {
            Some(entry) => {
                let filenames = entry.output_filenames();
                if filenames.is_empty() {
                    warn!("Prompt {backend_prompt_id} completed with no output images");
                }
                self.db.set_job_completed(job_id, &filenames).await?;
                job = self.db.get_job(job_id).await?;
                self.post_generation_result(&job, &backend_prompt_id, &filenames, &token)
                    .await;
            }
            None => {
                let message = format!(
                    "Timed out after {}s waiting for prompt {backend_prompt_id}",
                    self.deadline.as_secs()
                );
                self.db.set_job_failed(job_id, &message).await?;
                self.notify_failure(&job.origin_channel_id, &job.requester_id, &message, &token)
                    .await;
            }
        }
        Ok(())
    }

    async fn process_upscale(&self, job_id: Uuid) -> easel_db::Result<()> {
        let job = match self.db.get_upscale_job(job_id).await {
            Ok(job) => job,
            Err(DbError::NotFound(_)) => {
                warn!("Dropping queue entry for unknown upscale {job_id}");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let token = self.queue.take_token(job_id);

        let graph = match self
            .templates
            .bind_upscale(&job, &job.source_image_filename)
        {
            Ok(graph) => graph,
            Err(err) => {
                let message = format!("Workflow bind failed: {err}");
                self.db.set_upscale_failed(job_id, &message).await?;
                self.notify_failure(&job.origin_channel_id, &job.requester_id, &message, &token)
                    .await;
                return Ok(());
            }
        };

        let backend_prompt_id = match self.backend.submit(&graph).await {
            Ok(id) => id,
            Err(err) => {
                let message = format!("Renderer rejected the upscale: {err}");
                self.db.set_upscale_failed(job_id, &message).await?;
                self.notify_failure(&job.origin_channel_id, &job.requester_id, &message, &token)
                    .await;
                return Ok(());
            }
        };

        self.db
            .set_upscale_running(job_id, &backend_prompt_id)
            .await?;
        self.update_ephemeral(&token, "Your upscale is running...").await;

        match self.poll_until_complete(&backend_prompt_id).await {
            Some(entry) => {
                let filenames = entry.output_filenames();
                if filenames.is_empty() {
                    warn!("Prompt {backend_prompt_id} completed with no output images");
                }
                self.db.set_upscale_completed(job_id, &filenames).await?;
                let job = self.db.get_upscale_job(job_id).await?;
                let attachments = self
                    .collect_attachments(&backend_prompt_id, &filenames)
                    .await;
                let post = UpscaleResultPost {
                    requester_id: job.requester_id.clone(),
                    attachments,
                    upscale_model: job.upscale_model.clone(),
                    delete_button: upscale_delete_button(&job),
                };
                if let Err(err) = self
                    .notifier
                    .post_upscale_result(&job.origin_channel_id, post)
                    .await
                {
                    warn!("Failed to post upscale result for {job_id}: {err}");
                }
            }
            None => {
                let message = format!(
                    "Timed out after {}s waiting for prompt {backend_prompt_id}",
                    self.deadline.as_secs()
                );
                self.db.set_upscale_failed(job_id, &message).await?;
                self.notify_failure(&job.origin_channel_id, &job.requester_id, &message, &token)
                    .await;
            }
        }
        Ok(())
    }

    /// Poll every two seconds until the entry reports completion or the
    /// deadline elapses. Null entries mean "not ready".
    async fn poll_until_complete(&self, backend_prompt_id: &str) -> Option<HistoryEntry> {
        let deadline = Instant::now() + self.deadline;
        loop {
            if let Some(entry) = self.backend.history(backend_prompt_id).await {
                if entry.status.completed {
                    return Some(entry);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn post_generation_result(
        &self,
        job: &easel_protocol::Job,
        backend_prompt_id: &str,
        filenames: &[String],
        token: &Option<EphemeralToken>,
    ) {
        self.update_ephemeral(token, "Done! Your image has been posted.")
            .await;
        let attachments = self.collect_attachments(backend_prompt_id, filenames).await;
        let post = ResultPost {
            requester_id: job.requester_id.clone(),
            attachments,
            summary: Some(ResultSummary::for_job(job)),
            buttons: result_buttons(job, self.upscale_enabled),
        };
        if let Err(err) = self.notifier.post_result(&job.origin_channel_id, post).await {
            warn!("Failed to post result for {}: {err}", job.id);
        }
    }

    /// Re-read the history entry to rediscover each filename's subfolder
    /// and type, then fetch the bytes. Missing images are skipped.
    async fn collect_attachments(
        &self,
        backend_prompt_id: &str,
        filenames: &[String],
    ) -> Vec<Attachment> {
        let entry = self.backend.history(backend_prompt_id).await;
        let mut attachments = Vec::new();
        for filename in filenames {
            let Some(image) = entry.as_ref().and_then(|e| e.find_image(filename)) else {
                warn!("Image {filename} missing from history entry {backend_prompt_id}");
                continue;
            };
            match self.backend.fetch_image(image).await {
                Ok(bytes) => attachments.push(Attachment {
                    filename: filename.clone(),
                    bytes,
                }),
                Err(err) => warn!("Failed to fetch {filename}: {err}"),
            }
        }
        attachments
    }

    /// Failure notices: public post mentioning the requester plus a
    /// best-effort ephemeral update.
    async fn notify_failure(
        &self,
        channel_id: &str,
        requester_id: &str,
        message: &str,
        token: &Option<EphemeralToken>,
    ) {
        if let Err(err) = self
            .notifier
            .post_failure(channel_id, requester_id, message)
            .await
        {
            warn!("Failed to post failure notice: {err}");
        }
        self.update_ephemeral(token, message).await;
    }

    async fn update_ephemeral(&self, token: &Option<EphemeralToken>, text: &str) {
        if let Some(token) = token {
            if let Err(err) = self.notifier.update_ephemeral(token, text).await {
                warn!("Ephemeral update failed (token likely expired): {err}");
            }
        }
    }
}

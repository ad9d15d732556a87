//! Interaction router: pure dispatch from typed chat events to draft
//! mutations, policy checks, and queue submission.
//!
//! Session expiry, missing rows, and permission failures always answer
//! ephemerally and never propagate.

use crate::backend::RenderBackend;
use crate::config::Config;
use crate::drafts::{DraftStore, SESSION_EXPIRED};
use crate::gateway::{
    BannedAction, EphemeralToken, Interaction, InteractionResponder, PromptsModal, SelectField,
};
use crate::guard::ContentGuard;
use crate::metadata::{
    resolve_trigger_words, AdapterMetadataSource, MetadataCache, TriggerWordsService,
};
use crate::queue::{JobKind, JobQueue, QueueEntry};
use crate::validate;
use easel_db::{DbError, EaselDb};
use easel_protocol::defaults::MAX_ADAPTER_SLOTS;
use easel_protocol::{now_ms, AdapterSlot, Draft, DraftPatch, Job, JobParams, JobStatus,
    NodeCatalog, SizePreset, UpscaleJobParams};
use easel_workflow::TemplateStore;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// Character budgets when revealing prompts in place.
const SHARE_POSITIVE_MAX: usize = 1000;
const SHARE_NEGATIVE_MAX: usize = 500;

const INTERNAL_ERROR: &str = "Something went wrong; please try again.";

pub struct Router<B: RenderBackend> {
    config: Arc<Config>,
    db: EaselDb,
    catalog: Arc<NodeCatalog>,
    templates: Arc<TemplateStore>,
    drafts: Arc<DraftStore>,
    guard: Arc<ContentGuard>,
    queue: Arc<JobQueue>,
    metadata: Arc<MetadataCache>,
    metadata_source: Arc<dyn AdapterMetadataSource>,
    trigger_service: Arc<dyn TriggerWordsService>,
    backend: Arc<B>,
}

impl<B: RenderBackend> Router<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        db: EaselDb,
        catalog: Arc<NodeCatalog>,
        templates: Arc<TemplateStore>,
        drafts: Arc<DraftStore>,
        guard: Arc<ContentGuard>,
        queue: Arc<JobQueue>,
        metadata: Arc<MetadataCache>,
        metadata_source: Arc<dyn AdapterMetadataSource>,
        trigger_service: Arc<dyn TriggerWordsService>,
        backend: Arc<B>,
    ) -> Self {
        Self {
            config,
            db,
            catalog,
            templates,
            drafts,
            guard,
            queue,
            metadata,
            metadata_source,
            trigger_service,
            backend,
        }
    }

    pub async fn handle(&self, event: Interaction, responder: &dyn InteractionResponder) {
        match event {
            Interaction::EntryCommand {
                requester_id,
                channel_id,
                ..
            } => self.entry_command(&requester_id, &channel_id, responder).await,
            Interaction::SelectChanged {
                requester_id,
                field,
                value,
            } => self.select_changed(&requester_id, field, &value, responder).await,
            Interaction::AdapterChanged {
                requester_id,
                slot,
                name,
                strength,
            } => {
                self.adapter_changed(&requester_id, slot, name, strength, responder)
                    .await
            }
            Interaction::EditPromptsButton { requester_id } => {
                self.edit_prompts(&requester_id, responder).await
            }
            Interaction::PromptsModalSubmitted {
                requester_id,
                fields,
            } => self.prompts_submitted(&requester_id, fields, responder).await,
            Interaction::GenerateButton {
                requester_id,
                scope_id,
                channel_id,
                ephemeral_token,
            } => {
                self.generate(&requester_id, &scope_id, &channel_id, ephemeral_token, responder)
                    .await
            }
            Interaction::SharePromptButton {
                requester_id,
                job_id,
            } => self.share_prompt(&requester_id, job_id, responder).await,
            Interaction::RerollButton {
                requester_id,
                job_id,
                ephemeral_token,
            } => {
                self.reroll(&requester_id, job_id, ephemeral_token, responder)
                    .await
            }
            Interaction::EditButton {
                requester_id,
                job_id,
            } => self.edit_job(&requester_id, job_id, responder).await,
            Interaction::DeleteButton {
                requester_id,
                job_id,
                is_moderator,
            } => {
                self.delete_message(&requester_id, job_id, is_moderator, responder)
                    .await
            }
            Interaction::UpscaleButton {
                requester_id,
                job_id,
                image_filename,
                ephemeral_token,
            } => {
                self.upscale(&requester_id, job_id, image_filename, ephemeral_token, responder)
                    .await
            }
            Interaction::BannedCommand {
                requester_id,
                action,
            } => self.banned_command(&requester_id, action, responder).await,
            Interaction::PurgeCommand {
                requester_id,
                max_age_hours,
            } => self.purge_command(&requester_id, max_age_hours, responder).await,
        }
    }

    async fn entry_command(
        &self,
        requester_id: &str,
        channel_id: &str,
        responder: &dyn InteractionResponder,
    ) {
        if !self.config.channel_allowed(channel_id) {
            responder
                .ephemeral("This command is not available in this channel.")
                .await;
            return;
        }
        let draft = self.drafts.init(
            requester_id,
            &self.catalog,
            &self.config.default_negative_prompt,
        );
        responder.open_prompts_modal(prefill_from(&draft)).await;
    }

    async fn select_changed(
        &self,
        requester_id: &str,
        field: SelectField,
        value: &str,
        responder: &dyn InteractionResponder,
    ) {
        let patch = match field {
            SelectField::Model => {
                if !self.catalog.models.iter().any(|m| m == value) {
                    responder.ephemeral("Unknown model selection.").await;
                    return;
                }
                DraftPatch {
                    model: Some(value.to_string()),
                    ..Default::default()
                }
            }
            SelectField::Sampler => {
                if !self.catalog.samplers.iter().any(|s| s == value) {
                    responder.ephemeral("Unknown sampler selection.").await;
                    return;
                }
                DraftPatch {
                    sampler: Some(value.to_string()),
                    ..Default::default()
                }
            }
            SelectField::Scheduler => {
                if !self.catalog.schedulers.iter().any(|s| s == value) {
                    responder.ephemeral("Unknown scheduler selection.").await;
                    return;
                }
                DraftPatch {
                    scheduler: Some(value.to_string()),
                    ..Default::default()
                }
            }
            SelectField::Size => DraftPatch {
                size: Some(SizePreset::parse(value)),
                ..Default::default()
            },
        };
        match self.drafts.merge(requester_id, patch) {
            Some(draft) => responder.show_form(&draft).await,
            None => responder.ephemeral(SESSION_EXPIRED).await,
        }
    }

    async fn adapter_changed(
        &self,
        requester_id: &str,
        slot: usize,
        name: Option<String>,
        strength: f64,
        responder: &dyn InteractionResponder,
    ) {
        if slot >= MAX_ADAPTER_SLOTS {
            responder.ephemeral("Unknown adapter slot.").await;
            return;
        }
        let contents = match name {
            None => None,
            Some(name) => {
                if !self.catalog.adapters.iter().any(|a| a == &name) {
                    responder.ephemeral("Unknown adapter selection.").await;
                    return;
                }
                let strength = match validate::validate_strength(strength) {
                    Ok(strength) => strength,
                    Err(err) => {
                        responder.ephemeral(&err.to_string()).await;
                        return;
                    }
                };
                let mut adapter = AdapterSlot::new(name.clone(), strength);
                adapter.trigger_words = resolve_trigger_words(
                    &self.metadata,
                    self.metadata_source.as_ref(),
                    self.trigger_service.as_ref(),
                    &name,
                )
                .await;
                Some(adapter)
            }
        };
        let patch = DraftPatch {
            adapters: vec![(slot, contents)],
            ..Default::default()
        };
        match self.drafts.merge(requester_id, patch) {
            Some(draft) => responder.show_form(&draft).await,
            None => responder.ephemeral(SESSION_EXPIRED).await,
        }
    }

    async fn edit_prompts(&self, requester_id: &str, responder: &dyn InteractionResponder) {
        match self.drafts.get(requester_id) {
            Some(draft) => responder.open_prompts_modal(prefill_from(&draft)).await,
            None => responder.ephemeral(SESSION_EXPIRED).await,
        }
    }

    async fn prompts_submitted(
        &self,
        requester_id: &str,
        fields: PromptsModal,
        responder: &dyn InteractionResponder,
    ) {
        let steps = match validate::parse_steps(&fields.steps) {
            Ok(steps) => steps,
            Err(err) => {
                responder.ephemeral(&err.to_string()).await;
                return;
            }
        };
        let cfg = match validate::parse_cfg(&fields.cfg) {
            Ok(cfg) => cfg,
            Err(err) => {
                responder.ephemeral(&err.to_string()).await;
                return;
            }
        };
        let seed = match validate::parse_seed(&fields.seed) {
            Ok(seed) => seed,
            Err(err) => {
                responder.ephemeral(&err.to_string()).await;
                return;
            }
        };
        let patch = DraftPatch {
            positive_prompt: Some(fields.positive_prompt),
            negative_prompt: Some(fields.negative_prompt),
            steps: Some(steps),
            cfg: Some(cfg),
            seed: Some(seed),
            ..Default::default()
        };
        match self.drafts.merge(requester_id, patch) {
            Some(draft) => responder.show_form(&draft).await,
            None => responder.ephemeral(SESSION_EXPIRED).await,
        }
    }

    async fn generate(
        &self,
        requester_id: &str,
        scope_id: &str,
        channel_id: &str,
        token: EphemeralToken,
        responder: &dyn InteractionResponder,
    ) {
        let Some(draft) = self.drafts.get(requester_id) else {
            responder.ephemeral(SESSION_EXPIRED).await;
            return;
        };
        if let Err(err) = validate::validate_positive_prompt(&draft.positive_prompt) {
            responder.ephemeral(&err.to_string()).await;
            return;
        }

        // Content policy runs over both prompts together.
        let combined = format!("{}\n{}", draft.positive_prompt, draft.negative_prompt);
        match self.guard.check(&combined).await {
            Ok(matches) if !matches.is_empty() => {
                let spoilered: Vec<String> =
                    matches.iter().map(|m| format!("||{}||", m.word)).collect();
                responder
                    .ephemeral_warning(&format!(
                        "Your prompt was blocked by the content policy: {}",
                        spoilered.join(", ")
                    ))
                    .await;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                error!("Content guard failed: {err}");
                responder.ephemeral(INTERNAL_ERROR).await;
                return;
            }
        }

        // Catch template drift before persisting anything.
        if let Err(err) = self.templates.validate_base() {
            responder
                .ephemeral(&format!("The workflow template is misconfigured: {err}"))
                .await;
            return;
        }
        for (value, list, label) in [
            (&draft.model, &self.catalog.models, "model"),
            (&draft.sampler, &self.catalog.samplers, "sampler"),
            (&draft.scheduler, &self.catalog.schedulers, "scheduler"),
        ] {
            if !list.iter().any(|v| v == value) {
                responder
                    .ephemeral(&format!("The selected {label} is no longer available."))
                    .await;
                return;
            }
        }

        let params = JobParams {
            requester_id: requester_id.to_string(),
            origin_scope_id: scope_id.to_string(),
            origin_channel_id: channel_id.to_string(),
            model: draft.model.clone(),
            sampler: draft.sampler.clone(),
            scheduler: draft.scheduler.clone(),
            steps: draft.steps,
            cfg: draft.cfg,
            seed: draft.seed,
            size: draft.size,
            positive_prompt: draft.positive_prompt.clone(),
            negative_prompt: draft.negative_prompt.clone(),
            adapters: draft.active_adapters(),
        };
        let job_id = Uuid::new_v4();
        let position = match self.persist_and_position(job_id, params).await {
            Ok(position) => position,
            Err(err) => {
                error!("Failed to persist job: {err}");
                responder.ephemeral(INTERNAL_ERROR).await;
                return;
            }
        };

        self.drafts.delete(requester_id);
        responder
            .ephemeral(&format!("Queued! You are #{position} in line."))
            .await;
        self.queue.enqueue(
            QueueEntry {
                job_id,
                kind: JobKind::Generation,
            },
            Some(token),
        );
    }

    async fn persist_and_position(&self, job_id: Uuid, params: JobParams) -> Result<i64, DbError> {
        self.db.insert_job(job_id, params).await?;
        let ahead = self.db.count_queued_before(job_id).await?;
        Ok(ahead + 1)
    }

    async fn share_prompt(
        &self,
        requester_id: &str,
        job_id: Uuid,
        responder: &dyn InteractionResponder,
    ) {
        let Some(job) = self.load_job(job_id, responder).await else {
            return;
        };
        if job.requester_id != requester_id {
            responder
                .ephemeral_warning("Only the requester can share this prompt.")
                .await;
            return;
        }
        responder
            .reveal_prompts(
                truncate(&job.positive_prompt, SHARE_POSITIVE_MAX),
                truncate(&job.negative_prompt, SHARE_NEGATIVE_MAX),
            )
            .await;
    }

    async fn reroll(
        &self,
        requester_id: &str,
        job_id: Uuid,
        token: EphemeralToken,
        responder: &dyn InteractionResponder,
    ) {
        let Some(job) = self.load_job(job_id, responder).await else {
            return;
        };
        if job.requester_id != requester_id {
            responder
                .ephemeral_warning("Only the requester can re-roll this job.")
                .await;
            return;
        }
        let params = JobParams {
            requester_id: job.requester_id.clone(),
            origin_scope_id: job.origin_scope_id.clone(),
            origin_channel_id: job.origin_channel_id.clone(),
            model: job.model.clone(),
            sampler: job.sampler.clone(),
            scheduler: job.scheduler.clone(),
            steps: job.steps,
            cfg: job.cfg,
            seed: easel_protocol::fresh_seed(),
            size: job.size,
            positive_prompt: job.positive_prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            adapters: job.adapters.clone(),
        };
        let new_id = Uuid::new_v4();
        let position = match self.persist_and_position(new_id, params).await {
            Ok(position) => position,
            Err(err) => {
                error!("Failed to persist re-roll: {err}");
                responder.ephemeral(INTERNAL_ERROR).await;
                return;
            }
        };
        responder
            .ephemeral(&format!("Re-rolling with a fresh seed; you are #{position} in line."))
            .await;
        self.queue.enqueue(
            QueueEntry {
                job_id: new_id,
                kind: JobKind::Generation,
            },
            Some(token),
        );
    }

    async fn edit_job(
        &self,
        requester_id: &str,
        job_id: Uuid,
        responder: &dyn InteractionResponder,
    ) {
        let Some(job) = self.load_job(job_id, responder).await else {
            return;
        };
        if job.requester_id != requester_id {
            responder
                .ephemeral_warning("Only the requester can edit this job.")
                .await;
            return;
        }
        let draft = self.drafts.init_from_job(requester_id, &job);
        responder.show_form(&draft).await;
    }

    async fn delete_message(
        &self,
        requester_id: &str,
        job_id: Uuid,
        is_moderator: bool,
        responder: &dyn InteractionResponder,
    ) {
        // Requester or moderator; the job row may already be purged, which
        // is fine for a delete.
        if !is_moderator {
            match self.db.get_job(job_id).await {
                Ok(job) if job.requester_id == requester_id => {}
                Ok(_) => {
                    responder
                        .ephemeral_warning("Only the requester or a moderator can delete this.")
                        .await;
                    return;
                }
                Err(DbError::NotFound(_)) => {}
                Err(err) => {
                    error!("Delete lookup failed: {err}");
                    responder.ephemeral(INTERNAL_ERROR).await;
                    return;
                }
            }
        }
        responder.delete_message().await;
    }

    async fn upscale(
        &self,
        requester_id: &str,
        job_id: Uuid,
        image_filename: Option<String>,
        token: EphemeralToken,
        responder: &dyn InteractionResponder,
    ) {
        if !self.config.upscale_enabled {
            responder.ephemeral("Upscaling is not enabled.").await;
            return;
        }
        let Some(job) = self.load_job(job_id, responder).await else {
            return;
        };
        if job.requester_id != requester_id {
            responder
                .ephemeral_warning("Only the requester can upscale this job.")
                .await;
            return;
        }
        if job.status != JobStatus::Completed {
            responder.ephemeral("This job has no finished images yet.").await;
            return;
        }
        let Some(filename) = image_filename.or_else(|| {
            job.output_images
                .as_ref()
                .and_then(|images| images.first().cloned())
        }) else {
            responder.ephemeral("This job produced no images.").await;
            return;
        };
        let Some(backend_prompt_id) = job.backend_prompt_id.as_deref() else {
            responder.ephemeral("The source render is no longer available.").await;
            return;
        };

        // Pull the image back out of the renderer's file store and push it
        // into the input folder; the returned name is authoritative.
        let image = match self.backend.history(backend_prompt_id).await {
            Some(entry) => entry.find_image(&filename).cloned(),
            None => None,
        };
        let Some(image) = image else {
            responder
                .ephemeral("The source image has expired on the renderer.")
                .await;
            return;
        };
        let bytes = match self.backend.fetch_image(&image).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Source image fetch failed: {err}");
                responder
                    .ephemeral("Couldn't fetch the source image from the renderer.")
                    .await;
                return;
            }
        };
        let uploaded = match self.backend.upload_image(bytes, &filename).await {
            Ok(uploaded) => uploaded,
            Err(err) => {
                warn!("Source image upload failed: {err}");
                responder
                    .ephemeral("Couldn't stage the source image on the renderer.")
                    .await;
                return;
            }
        };

        let params = UpscaleJobParams {
            requester_id: requester_id.to_string(),
            origin_scope_id: job.origin_scope_id.clone(),
            origin_channel_id: job.origin_channel_id.clone(),
            source_job_id: job.id,
            source_image_filename: uploaded.name,
            upscale_model: self.config.upscale_model.clone(),
            positive_prompt: job.positive_prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
        };
        let upscale_id = Uuid::new_v4();
        if let Err(err) = self.db.insert_upscale_job(upscale_id, params).await {
            error!("Failed to persist upscale: {err}");
            responder.ephemeral(INTERNAL_ERROR).await;
            return;
        }
        responder.ephemeral("Upscale queued.").await;
        self.queue.enqueue(
            QueueEntry {
                job_id: upscale_id,
                kind: JobKind::Upscale,
            },
            Some(token),
        );
    }

    async fn banned_command(
        &self,
        requester_id: &str,
        action: BannedAction,
        responder: &dyn InteractionResponder,
    ) {
        if !self.config.is_owner(requester_id) {
            responder
                .ephemeral_warning("Only the bot owner can manage banned words.")
                .await;
            return;
        }
        let result = match action {
            BannedAction::Add { word, partial } => {
                match self.db.add_banned_word(&word, partial, requester_id).await {
                    Ok(true) => {
                        self.guard.invalidate();
                        Ok(format!(
                            "Added \"{word}\" ({}).",
                            if partial { "substring" } else { "whole word" }
                        ))
                    }
                    Ok(false) => Ok(format!("\"{word}\" is already banned.")),
                    Err(err) => Err(err),
                }
            }
            BannedAction::Remove { word } => match self.db.remove_banned_word(&word).await {
                Ok(true) => {
                    self.guard.invalidate();
                    Ok(format!("Removed \"{word}\"."))
                }
                Ok(false) => Ok(format!("\"{word}\" was not banned.")),
                Err(err) => Err(err),
            },
            BannedAction::List => match self.db.list_banned_words().await {
                Ok(words) if words.is_empty() => Ok("No banned words.".to_string()),
                Ok(words) => Ok(words
                    .iter()
                    .map(|w| {
                        format!(
                            "{} ({})",
                            w.word,
                            if w.partial { "substring" } else { "whole word" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ")),
                Err(err) => Err(err),
            },
        };
        match result {
            Ok(text) => responder.ephemeral(&text).await,
            Err(err) => {
                error!("Banned-word command failed: {err}");
                responder.ephemeral(INTERNAL_ERROR).await;
            }
        }
    }

    async fn purge_command(
        &self,
        requester_id: &str,
        max_age_hours: Option<u64>,
        responder: &dyn InteractionResponder,
    ) {
        if !self.config.is_owner(requester_id) {
            responder
                .ephemeral_warning("Only the bot owner can purge history.")
                .await;
            return;
        }
        let max_age = max_age_hours
            .map(|hours| std::time::Duration::from_secs(hours * 3600))
            .unwrap_or(self.config.purge_max_age);
        let cutoff = now_ms() - max_age.as_millis() as i64;
        match self.db.purge_old(cutoff).await {
            Ok((jobs, upscales)) => {
                responder
                    .ephemeral(&format!(
                        "Purged {jobs} job(s) and {upscales} upscale(s)."
                    ))
                    .await
            }
            Err(err) => {
                error!("Manual purge failed: {err}");
                responder.ephemeral(INTERNAL_ERROR).await;
            }
        }
    }

    async fn load_job(&self, job_id: Uuid, responder: &dyn InteractionResponder) -> Option<Job> {
        match self.db.get_job(job_id).await {
            Ok(job) => Some(job),
            Err(DbError::NotFound(_)) => {
                responder.ephemeral("That job no longer exists.").await;
                None
            }
            Err(err) => {
                error!("Job lookup failed: {err}");
                responder.ephemeral(INTERNAL_ERROR).await;
                None
            }
        }
    }
}

fn prefill_from(draft: &Draft) -> PromptsModal {
    PromptsModal {
        positive_prompt: draft.positive_prompt.clone(),
        negative_prompt: draft.negative_prompt.clone(),
        steps: draft.steps.to_string(),
        cfg: draft.cfg.to_string(),
        seed: draft.seed.to_string(),
    }
}

/// Truncate on a character boundary.
fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

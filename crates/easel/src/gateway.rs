//! Interface types for the chat platform adapter.
//!
//! The gateway itself lives outside this crate; these are the typed events
//! it delivers and the reply surfaces the core calls back into. Ephemeral
//! follow-up tokens are single-use capabilities, valid for roughly fifteen
//! minutes on the platform side.

use async_trait::async_trait;
use easel_protocol::{Draft, Job, UpscaleJob};
use tracing::info;
use uuid::Uuid;

/// Opaque follow-up capability minted by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralToken(pub String);

/// Which dropdown changed on the interactive form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectField {
    Model,
    Sampler,
    Scheduler,
    Size,
}

/// Raw text fields from the prompts modal, validated by the router.
#[derive(Debug, Clone, Default)]
pub struct PromptsModal {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub steps: String,
    pub cfg: String,
    pub seed: String,
}

/// Owner-only banned-word administration.
#[derive(Debug, Clone)]
pub enum BannedAction {
    Add { word: String, partial: bool },
    Remove { word: String },
    List,
}

/// A typed interaction event, as delivered by the platform adapter.
#[derive(Debug, Clone)]
pub enum Interaction {
    EntryCommand {
        requester_id: String,
        scope_id: String,
        channel_id: String,
    },
    SelectChanged {
        requester_id: String,
        field: SelectField,
        value: String,
    },
    AdapterChanged {
        requester_id: String,
        slot: usize,
        /// `None` clears the slot.
        name: Option<String>,
        strength: f64,
    },
    EditPromptsButton {
        requester_id: String,
    },
    PromptsModalSubmitted {
        requester_id: String,
        fields: PromptsModal,
    },
    GenerateButton {
        requester_id: String,
        scope_id: String,
        channel_id: String,
        ephemeral_token: EphemeralToken,
    },
    SharePromptButton {
        requester_id: String,
        job_id: Uuid,
    },
    RerollButton {
        requester_id: String,
        job_id: Uuid,
        ephemeral_token: EphemeralToken,
    },
    EditButton {
        requester_id: String,
        job_id: Uuid,
    },
    DeleteButton {
        requester_id: String,
        job_id: Uuid,
        is_moderator: bool,
    },
    UpscaleButton {
        requester_id: String,
        job_id: Uuid,
        /// Which output image to upscale; defaults to the first.
        image_filename: Option<String>,
        ephemeral_token: EphemeralToken,
    },
    BannedCommand {
        requester_id: String,
        action: BannedAction,
    },
    PurgeCommand {
        requester_id: String,
        max_age_hours: Option<u64>,
    },
}

/// Reply surface for the interaction currently being handled. Every method
/// is best-effort; the platform may have expired the interaction.
#[async_trait]
pub trait InteractionResponder: Send + Sync {
    /// Plain ephemeral text reply.
    async fn ephemeral(&self, text: &str);

    /// Ephemeral warning embed (content policy, permission refusals).
    async fn ephemeral_warning(&self, text: &str);

    /// Open the prompts modal, prefilled from the draft.
    async fn open_prompts_modal(&self, prefill: PromptsModal);

    /// Render or refresh the interactive form for a draft.
    async fn show_form(&self, draft: &Draft);

    /// Rewrite the originating result message to reveal its prompts.
    async fn reveal_prompts(&self, positive: &str, negative: &str);

    /// Delete the originating message.
    async fn delete_message(&self);
}

/// Buttons attached to a result post, each carrying the job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionButton {
    SharePrompt(Uuid),
    Reroll(Uuid),
    Edit(Uuid),
    Upscale(Uuid),
    Delete(Uuid),
}

/// One attached output image.
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Structured summary rendered under a generation result. The positive
/// prompt is deliberately absent; a footer hints that it is hidden.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    pub model: String,
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub seed: i64,
    pub size: String,
}

impl ResultSummary {
    pub fn for_job(job: &Job) -> Self {
        Self {
            model: job.model.clone(),
            sampler: job.sampler.clone(),
            scheduler: job.scheduler.clone(),
            steps: job.steps,
            cfg: job.cfg,
            seed: job.seed,
            size: job.size.to_string(),
        }
    }
}

/// A public result post for the origin channel.
pub struct ResultPost {
    pub requester_id: String,
    pub attachments: Vec<Attachment>,
    pub summary: Option<ResultSummary>,
    pub buttons: Vec<ActionButton>,
}

/// Trimmed post for upscale results: attachments plus a delete button.
pub struct UpscaleResultPost {
    pub requester_id: String,
    pub attachments: Vec<Attachment>,
    pub upscale_model: String,
    pub delete_button: ActionButton,
}

/// Outbound channel messages the runner sends. Failures are swallowed by
/// callers; the token or channel may be gone.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn post_result(&self, channel_id: &str, post: ResultPost) -> anyhow::Result<()>;

    async fn post_upscale_result(
        &self,
        channel_id: &str,
        post: UpscaleResultPost,
    ) -> anyhow::Result<()>;

    async fn post_failure(
        &self,
        channel_id: &str,
        requester_id: &str,
        message: &str,
    ) -> anyhow::Result<()>;

    async fn update_ephemeral(&self, token: &EphemeralToken, text: &str) -> anyhow::Result<()>;
}

/// Notifier used when no platform adapter is linked in: logs every post.
/// Lets the binary run end-to-end against a real renderer.
pub struct LogNotifier;

#[async_trait]
impl ChatNotifier for LogNotifier {
    async fn post_result(&self, channel_id: &str, post: ResultPost) -> anyhow::Result<()> {
        info!(
            "Result for {} in #{channel_id}: {} attachment(s)",
            post.requester_id,
            post.attachments.len()
        );
        Ok(())
    }

    async fn post_upscale_result(
        &self,
        channel_id: &str,
        post: UpscaleResultPost,
    ) -> anyhow::Result<()> {
        info!(
            "Upscale result for {} in #{channel_id}: {} attachment(s)",
            post.requester_id,
            post.attachments.len()
        );
        Ok(())
    }

    async fn post_failure(
        &self,
        channel_id: &str,
        requester_id: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        info!("Failure notice for {requester_id} in #{channel_id}: {message}");
        Ok(())
    }

    async fn update_ephemeral(&self, token: &EphemeralToken, text: &str) -> anyhow::Result<()> {
        info!("Ephemeral update ({}): {text}", token.0);
        Ok(())
    }
}

/// Buttons for a completed generation result.
pub fn result_buttons(job: &Job, upscale_enabled: bool) -> Vec<ActionButton> {
    let mut buttons = vec![
        ActionButton::SharePrompt(job.id),
        ActionButton::Reroll(job.id),
        ActionButton::Edit(job.id),
    ];
    if upscale_enabled {
        buttons.push(ActionButton::Upscale(job.id));
    }
    buttons.push(ActionButton::Delete(job.id));
    buttons
}

/// Delete-only button set for an upscale result.
pub fn upscale_delete_button(job: &UpscaleJob) -> ActionButton {
    ActionButton::Delete(job.id)
}

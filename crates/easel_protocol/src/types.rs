//! Domain entities: jobs, upscale jobs, drafts, banned words, node catalog.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::defaults::{
    DEFAULT_CFG, DEFAULT_STEPS, MAX_ADAPTER_SLOTS, PREFERRED_SAMPLER, PREFERRED_SCHEDULER,
    SEED_MAX,
};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Draw a fresh 32-bit seed.
pub fn fresh_seed() -> i64 {
    rand::thread_rng().gen_range(0..=SEED_MAX)
}

// ============================================================================
// Job lifecycle
// ============================================================================

/// Status of a generation or upscale job.
///
/// `Cancelled` is accepted by the schema but never written by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states are eligible for retention purge.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output aspect presets mapped to latent dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizePreset {
    #[default]
    Portrait,
    Square,
    Landscape,
}

impl SizePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Square => "square",
            Self::Landscape => "landscape",
        }
    }

    /// Unknown values fall back to portrait.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "square" => Self::Square,
            "landscape" => Self::Landscape,
            _ => Self::Portrait,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Portrait => (832, 1216),
            Self::Square => (1024, 1024),
            Self::Landscape => (1216, 832),
        }
    }
}

impl std::fmt::Display for SizePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One occupied adapter slot.
///
/// Trigger words exist only in memory; the persisted form is `{name, strength}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSlot {
    pub name: String,
    pub strength: f64,
    #[serde(skip)]
    pub trigger_words: Vec<String>,
}

impl AdapterSlot {
    pub fn new(name: impl Into<String>, strength: f64) -> Self {
        Self {
            name: name.into(),
            strength,
            trigger_words: Vec::new(),
        }
    }
}

/// A user-submitted generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub requester_id: String,
    pub origin_scope_id: String,
    pub origin_channel_id: String,
    pub status: JobStatus,
    pub model: String,
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub seed: i64,
    pub size: SizePreset,
    pub positive_prompt: String,
    pub negative_prompt: String,
    /// Occupied slots only, in slot order. At most four.
    pub adapters: Vec<AdapterSlot>,
    pub backend_prompt_id: Option<String>,
    pub output_images: Option<Vec<String>>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Parameters for inserting a new job. The store stamps id-independent
/// fields (`status=queued`, `created_at=now`).
#[derive(Debug, Clone)]
pub struct JobParams {
    pub requester_id: String,
    pub origin_scope_id: String,
    pub origin_channel_id: String,
    pub model: String,
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub seed: i64,
    pub size: SizePreset,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub adapters: Vec<AdapterSlot>,
}

/// An upscale of one output image of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleJob {
    pub id: Uuid,
    pub requester_id: String,
    pub origin_scope_id: String,
    pub origin_channel_id: String,
    pub status: JobStatus,
    pub source_job_id: Uuid,
    pub source_image_filename: String,
    pub upscale_model: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub backend_prompt_id: Option<String>,
    pub output_images: Option<Vec<String>>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UpscaleJobParams {
    pub requester_id: String,
    pub origin_scope_id: String,
    pub origin_channel_id: String,
    pub source_job_id: Uuid,
    pub source_image_filename: String,
    pub upscale_model: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
}

/// A banned-word entry. `partial` selects substring matching over
/// whole-word matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedWord {
    pub word: String,
    pub partial: bool,
    pub added_by: String,
    pub added_at: i64,
}

// ============================================================================
// Node catalog
// ============================================================================

/// Legal enum values and concrete node classes, resolved once at boot.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCatalog {
    pub models: Vec<String>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
    pub adapters: Vec<String>,
    /// Concrete class chosen for checkpoint loading.
    pub checkpoint_class: String,
    /// Concrete class chosen for sampling.
    pub sampler_class: String,
}

// ============================================================================
// Draft sessions
// ============================================================================

/// The mutable subset of a job the user edits through the interactive form.
/// Never persisted; a restart means the form starts over.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub model: String,
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub seed: i64,
    pub size: SizePreset,
    pub positive_prompt: String,
    pub negative_prompt: String,
    /// Fixed slots; `None` is an empty slot.
    pub adapters: [Option<AdapterSlot>; MAX_ADAPTER_SLOTS],
}

impl Draft {
    /// Fresh draft populated from catalog defaults.
    pub fn new(catalog: &NodeCatalog, default_negative: &str) -> Self {
        let pick = |options: &[String], preferred: &str| -> String {
            if options.iter().any(|o| o == preferred) {
                preferred.to_string()
            } else {
                options.first().cloned().unwrap_or_default()
            }
        };
        Self {
            model: catalog.models.first().cloned().unwrap_or_default(),
            sampler: pick(&catalog.samplers, PREFERRED_SAMPLER),
            scheduler: pick(&catalog.schedulers, PREFERRED_SCHEDULER),
            steps: DEFAULT_STEPS,
            cfg: DEFAULT_CFG,
            seed: fresh_seed(),
            size: SizePreset::default(),
            positive_prompt: String::new(),
            negative_prompt: default_negative.to_string(),
            adapters: Default::default(),
        }
    }

    /// Seed a draft from a completed job (the Edit flow).
    pub fn from_job(job: &Job) -> Self {
        let mut adapters: [Option<AdapterSlot>; MAX_ADAPTER_SLOTS] = Default::default();
        for (slot, adapter) in adapters.iter_mut().zip(job.adapters.iter()) {
            *slot = Some(adapter.clone());
        }
        Self {
            model: job.model.clone(),
            sampler: job.sampler.clone(),
            scheduler: job.scheduler.clone(),
            steps: job.steps,
            cfg: job.cfg,
            seed: job.seed,
            size: job.size,
            positive_prompt: job.positive_prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            adapters,
        }
    }

    /// Occupied slots in order.
    pub fn active_adapters(&self) -> Vec<AdapterSlot> {
        self.adapters.iter().flatten().cloned().collect()
    }

    pub fn apply(&mut self, patch: DraftPatch) {
        if let Some(model) = patch.model {
            self.model = model;
        }
        if let Some(sampler) = patch.sampler {
            self.sampler = sampler;
        }
        if let Some(scheduler) = patch.scheduler {
            self.scheduler = scheduler;
        }
        if let Some(steps) = patch.steps {
            self.steps = steps;
        }
        if let Some(cfg) = patch.cfg {
            self.cfg = cfg;
        }
        if let Some(seed) = patch.seed {
            self.seed = seed;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(positive) = patch.positive_prompt {
            self.positive_prompt = positive;
        }
        if let Some(negative) = patch.negative_prompt {
            self.negative_prompt = negative;
        }
        for (index, slot) in patch.adapters.into_iter() {
            if index < MAX_ADAPTER_SLOTS {
                self.adapters[index] = slot;
            }
        }
    }
}

/// Partial update merged into a draft by the interaction router.
#[derive(Debug, Clone, Default)]
pub struct DraftPatch {
    pub model: Option<String>,
    pub sampler: Option<String>,
    pub scheduler: Option<String>,
    pub steps: Option<u32>,
    pub cfg: Option<f64>,
    pub seed: Option<i64>,
    pub size: Option<SizePreset>,
    pub positive_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    /// Slot index paired with its new contents (`None` clears the slot).
    pub adapters: Vec<(usize, Option<AdapterSlot>)>,
}

//! Shared fakes and builders for integration tests.

use async_trait::async_trait;
use easel::backend::RenderBackend;
use easel::gateway::{
    ActionButton, ChatNotifier, EphemeralToken, InteractionResponder, PromptsModal, ResultPost,
    ResultSummary, UpscaleResultPost,
};
use easel::config::Config;
use easel_protocol::{Draft, JobParams, NodeCatalog, SizePreset};
use easel_renderer::{HistoryEntry, HistoryStatus, ImageRef, NodeImages, RendererError, UploadedImage};
use easel_workflow::{TemplateStore, UpscaleWorkflow};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const BASE_TEMPLATE: &str = include_str!("../../../../workflows/generate.json");
pub const SIMPLE_TEMPLATE: &str = include_str!("../../../../workflows/upscale_simple.json");
pub const ULTIMATE_TEMPLATE: &str = include_str!("../../../../workflows/upscale_ultimate.json");

/// Scripted renderer: completes prompts on submit unless told otherwise.
pub struct FakeBackend {
    pub submitted: Mutex<Vec<(String, Value)>>,
    pub next_submit_error: Mutex<Option<RendererError>>,
    pub history: Mutex<HashMap<String, HistoryEntry>>,
    /// When false, history stays empty and polling never completes.
    pub complete_on_submit: bool,
    pub image_bytes: Vec<u8>,
    counter: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            next_submit_error: Mutex::new(None),
            history: Mutex::new(HashMap::new()),
            complete_on_submit: true,
            image_bytes: b"png-bytes".to_vec(),
            counter: AtomicUsize::new(1),
        }
    }
}

impl FakeBackend {
    pub fn never_completing() -> Self {
        Self {
            complete_on_submit: false,
            ..Self::default()
        }
    }

    pub fn submitted_graphs(&self) -> Vec<(String, Value)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn insert_history(&self, prompt_id: &str, entry: HistoryEntry) {
        self.history.lock().unwrap().insert(prompt_id.to_string(), entry);
    }
}

pub fn completed_entry(filenames: &[&str]) -> HistoryEntry {
    let mut outputs = std::collections::BTreeMap::new();
    outputs.insert(
        "9".to_string(),
        NodeImages {
            images: filenames
                .iter()
                .map(|f| ImageRef {
                    filename: f.to_string(),
                    subfolder: String::new(),
                    kind: "output".to_string(),
                })
                .collect(),
        },
    );
    HistoryEntry {
        status: HistoryStatus {
            completed: true,
            status_str: Some("success".to_string()),
        },
        outputs,
    }
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn submit(&self, graph: &Value) -> Result<String, RendererError> {
        if let Some(err) = self.next_submit_error.lock().unwrap().take() {
            return Err(err);
        }
        let id = format!("prompt-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.submitted.lock().unwrap().push((id.clone(), graph.clone()));
        if self.complete_on_submit {
            self.insert_history(&id, completed_entry(&[&format!("{id}.png")]));
        }
        Ok(id)
    }

    async fn history(&self, backend_prompt_id: &str) -> Option<HistoryEntry> {
        self.history.lock().unwrap().get(backend_prompt_id).cloned()
    }

    async fn fetch_image(&self, _image: &ImageRef) -> Result<Vec<u8>, RendererError> {
        Ok(self.image_bytes.clone())
    }

    async fn upload_image(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedImage, RendererError> {
        Ok(UploadedImage {
            name: format!("staged_{filename}"),
            subfolder: String::new(),
            kind: "input".to_string(),
        })
    }
}

#[async_trait]
impl easel::metadata::AdapterMetadataSource for FakeBackend {
    async fn local_trigger_words(&self, _stem: &str) -> Option<Vec<String>> {
        None
    }

    async fn file_hash(&self, _filename: &str) -> Option<String> {
        None
    }
}

/// Trigger-word service that always fails transiently; selection-time
/// lookups then resolve to empty without caching.
pub struct NoTriggerService;

#[async_trait]
impl easel::metadata::TriggerWordsService for NoTriggerService {
    async fn by_hash(&self, _hash: &str) -> easel_renderer::TriggerWordsOutcome {
        easel_renderer::TriggerWordsOutcome::TransientFailure
    }

    async fn by_search(&self, _term: &str) -> easel_renderer::TriggerWordsOutcome {
        easel_renderer::TriggerWordsOutcome::TransientFailure
    }
}

/// Records every outbound chat message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub results: Mutex<Vec<(String, ResultPostRecord)>>,
    pub upscale_results: Mutex<Vec<(String, String)>>,
    pub failures: Mutex<Vec<(String, String, String)>>,
    pub ephemerals: Mutex<Vec<(String, String)>>,
}

#[derive(Clone)]
pub struct ResultPostRecord {
    pub requester_id: String,
    pub attachment_names: Vec<String>,
    pub summary: Option<ResultSummary>,
    pub buttons: Vec<ActionButton>,
}

#[async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn post_result(&self, channel_id: &str, post: ResultPost) -> anyhow::Result<()> {
        self.results.lock().unwrap().push((
            channel_id.to_string(),
            ResultPostRecord {
                requester_id: post.requester_id,
                attachment_names: post.attachments.iter().map(|a| a.filename.clone()).collect(),
                summary: post.summary,
                buttons: post.buttons,
            },
        ));
        Ok(())
    }

    async fn post_upscale_result(
        &self,
        channel_id: &str,
        post: UpscaleResultPost,
    ) -> anyhow::Result<()> {
        self.upscale_results
            .lock()
            .unwrap()
            .push((channel_id.to_string(), post.requester_id));
        Ok(())
    }

    async fn post_failure(
        &self,
        channel_id: &str,
        requester_id: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        self.failures.lock().unwrap().push((
            channel_id.to_string(),
            requester_id.to_string(),
            message.to_string(),
        ));
        Ok(())
    }

    async fn update_ephemeral(&self, token: &EphemeralToken, text: &str) -> anyhow::Result<()> {
        self.ephemerals
            .lock()
            .unwrap()
            .push((token.0.clone(), text.to_string()));
        Ok(())
    }
}

/// Records every reply surface call from the router.
#[derive(Default)]
pub struct RecordingResponder {
    pub ephemerals: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
    pub modals: Mutex<Vec<PromptsModal>>,
    pub forms: Mutex<Vec<Draft>>,
    pub revealed: Mutex<Vec<(String, String)>>,
    pub deleted: AtomicBool,
}

impl RecordingResponder {
    pub fn last_ephemeral(&self) -> Option<String> {
        self.ephemerals.lock().unwrap().last().cloned()
    }

    pub fn last_warning(&self) -> Option<String> {
        self.warnings.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl InteractionResponder for RecordingResponder {
    async fn ephemeral(&self, text: &str) {
        self.ephemerals.lock().unwrap().push(text.to_string());
    }

    async fn ephemeral_warning(&self, text: &str) {
        self.warnings.lock().unwrap().push(text.to_string());
    }

    async fn open_prompts_modal(&self, prefill: PromptsModal) {
        self.modals.lock().unwrap().push(prefill);
    }

    async fn show_form(&self, draft: &Draft) {
        self.forms.lock().unwrap().push(draft.clone());
    }

    async fn reveal_prompts(&self, positive: &str, negative: &str) {
        self.revealed
            .lock()
            .unwrap()
            .push((positive.to_string(), negative.to_string()));
    }

    async fn delete_message(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }
}

pub fn test_catalog() -> NodeCatalog {
    NodeCatalog {
        models: vec!["base_v1.safetensors".into(), "other.safetensors".into()],
        samplers: vec!["euler".into(), "dpmpp_2m_sde".into()],
        schedulers: vec!["normal".into(), "karras".into()],
        adapters: vec!["detail.safetensors".into()],
        checkpoint_class: "CheckpointLoaderSimple".into(),
        sampler_class: "KSampler (Efficient)".into(),
    }
}

pub fn test_config(workflow_dir: PathBuf) -> Config {
    Config {
        token: "tok".into(),
        app_id: "app".into(),
        scope_id: "guild-1".into(),
        allowed_channel_ids: vec!["chan-1".into()],
        backend_base_url: "http://127.0.0.1:8188".into(),
        backend_timeout: Duration::from_secs(300),
        db_path: ":memory:".into(),
        log_level: None,
        default_negative_prompt: "lowres".into(),
        upscale_model: "4x_foolhardy.pth".into(),
        upscale_workflow: UpscaleWorkflow::Simple,
        upscale_enabled: true,
        owner_id: "owner".into(),
        purge_max_age: Duration::from_secs(48 * 3600),
        purge_interval: Duration::from_secs(6 * 3600),
        civitai_api_key: None,
        workflow_dir,
    }
}

/// Write the shipped templates into a temp dir and load a store from it.
pub fn test_templates(dir: &std::path::Path) -> TemplateStore {
    std::fs::write(dir.join("generate.json"), BASE_TEMPLATE).unwrap();
    std::fs::write(dir.join("upscale_simple.json"), SIMPLE_TEMPLATE).unwrap();
    std::fs::write(dir.join("upscale_ultimate.json"), ULTIMATE_TEMPLATE).unwrap();
    TemplateStore::load(dir, UpscaleWorkflow::Simple).unwrap()
}

pub fn job_params(requester: &str, channel: &str) -> JobParams {
    JobParams {
        requester_id: requester.to_string(),
        origin_scope_id: "guild-1".to_string(),
        origin_channel_id: channel.to_string(),
        model: "base_v1.safetensors".to_string(),
        sampler: "dpmpp_2m_sde".to_string(),
        scheduler: "karras".to_string(),
        steps: 28,
        cfg: 5.0,
        seed: 42,
        size: SizePreset::Portrait,
        positive_prompt: "a cat".to_string(),
        negative_prompt: String::new(),
        adapters: vec![],
    }
}

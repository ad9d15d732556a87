//! Template storage: source text is read from disk once and cached;
//! every bind re-parses it so jobs never share graph state.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::bind::{bind_generation_graph, bind_upscale_graph};
use crate::error::TemplateError;
use crate::validate;
use easel_protocol::{Job, UpscaleJob};

/// Which upscale template is active, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpscaleWorkflow {
    /// Tiled re-diffusion with the original prompts.
    #[default]
    Ultimate,
    /// Plain model upscale.
    Simple,
}

impl UpscaleWorkflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultimate => "ultimate",
            Self::Simple => "simple",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ultimate" => Some(Self::Ultimate),
            "simple" => Some(Self::Simple),
            _ => None,
        }
    }

    fn file_name(&self) -> String {
        format!("upscale_{}.json", self.as_str())
    }
}

impl std::fmt::Display for UpscaleWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cached template sources, validated once at load.
#[derive(Debug)]
pub struct TemplateStore {
    base_source: String,
    upscale_source: String,
    upscale_kind: UpscaleWorkflow,
}

impl TemplateStore {
    /// Read and validate the base template and the active upscale template
    /// from `dir`. Validation failure here is boot-fatal.
    pub fn load(dir: &Path, upscale_kind: UpscaleWorkflow) -> Result<Self, TemplateError> {
        let base_source = read_template(&dir.join("generate.json"))?;
        let base: Map<String, Value> = serde_json::from_str(&base_source)?;
        validate::validate_base(&base)?;

        let upscale_source = read_template(&dir.join(upscale_kind.file_name()))?;
        let upscale: Map<String, Value> = serde_json::from_str(&upscale_source)?;
        match upscale_kind {
            UpscaleWorkflow::Simple => validate::validate_upscale_simple(&upscale)?,
            UpscaleWorkflow::Ultimate => validate::validate_upscale_ultimate(&upscale)?,
        }

        info!(
            "Loaded workflow templates from {} (upscale: {upscale_kind})",
            dir.display()
        );
        Ok(Self {
            base_source,
            upscale_source,
            upscale_kind,
        })
    }

    /// Revalidate the cached base template. Used at submission time to
    /// catch template drift before a row is persisted.
    pub fn validate_base(&self) -> Result<(), TemplateError> {
        let base: Map<String, Value> = serde_json::from_str(&self.base_source)?;
        validate::validate_base(&base)
    }

    pub fn bind_generation(&self, job: &Job) -> Result<Value, TemplateError> {
        bind_generation_graph(&self.base_source, job)
    }

    pub fn bind_upscale(
        &self,
        job: &UpscaleJob,
        uploaded_name: &str,
    ) -> Result<Value, TemplateError> {
        bind_upscale_graph(&self.upscale_source, self.upscale_kind, job, uploaded_name)
    }

    pub fn upscale_kind(&self) -> UpscaleWorkflow {
        self.upscale_kind
    }
}

fn read_template(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.display().to_string(),
        source,
    })
}

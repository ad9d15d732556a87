//! Environment configuration. Missing or invalid required values abort
//! startup with a diagnostic naming the offending variable.

use easel_protocol::defaults::{
    DEFAULT_BACKEND_BASE_URL, DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_PURGE_INTERVAL_HOURS,
    DEFAULT_PURGE_MAX_AGE_HOURS,
};
use easel_workflow::UpscaleWorkflow;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub app_id: String,
    pub scope_id: String,
    pub allowed_channel_ids: Vec<String>,
    pub backend_base_url: String,
    /// Per-job completion deadline enforced by the runner's poll loop.
    pub backend_timeout: Duration,
    pub db_path: String,
    pub log_level: Option<String>,
    pub default_negative_prompt: String,
    pub upscale_model: String,
    pub upscale_workflow: UpscaleWorkflow,
    pub upscale_enabled: bool,
    pub owner_id: String,
    pub purge_max_age: Duration,
    pub purge_interval: Duration,
    pub civitai_api_key: Option<String>,
    pub workflow_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; tests inject maps here.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let allowed_channel_ids: Vec<String> = required("ALLOWED_CHANNEL_IDS")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if allowed_channel_ids.is_empty() {
            return Err(ConfigError::Missing("ALLOWED_CHANNEL_IDS"));
        }

        let backend_timeout_ms = parse_number(
            "BACKEND_TIMEOUT_MS",
            optional("BACKEND_TIMEOUT_MS"),
            DEFAULT_BACKEND_TIMEOUT_MS,
        )?;
        let purge_max_age_hours = parse_number(
            "PURGE_MAX_AGE_HOURS",
            optional("PURGE_MAX_AGE_HOURS"),
            DEFAULT_PURGE_MAX_AGE_HOURS,
        )?;
        let purge_interval_hours = parse_number(
            "PURGE_INTERVAL_HOURS",
            optional("PURGE_INTERVAL_HOURS"),
            DEFAULT_PURGE_INTERVAL_HOURS,
        )?;

        let upscale_workflow = match optional("UPSCALE_WORKFLOW") {
            Some(raw) => {
                UpscaleWorkflow::parse(&raw).ok_or(ConfigError::Invalid {
                    name: "UPSCALE_WORKFLOW",
                    value: raw,
                })?
            }
            None => UpscaleWorkflow::default(),
        };

        let upscale_enabled = match optional("UPSCALE_ENABLED") {
            Some(raw) => parse_bool("UPSCALE_ENABLED", &raw)?,
            None => false,
        };

        Ok(Self {
            token: required("TOKEN")?,
            app_id: required("APP_ID")?,
            scope_id: required("SCOPE_ID")?,
            allowed_channel_ids,
            backend_base_url: optional("BACKEND_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BACKEND_BASE_URL.to_string()),
            backend_timeout: Duration::from_millis(backend_timeout_ms),
            db_path: required("DB_PATH")?,
            log_level: optional("LOG_LEVEL"),
            default_negative_prompt: optional("DEFAULT_NEGATIVE_PROMPT").unwrap_or_default(),
            upscale_model: optional("UPSCALE_MODEL").unwrap_or_default(),
            upscale_workflow,
            upscale_enabled,
            owner_id: required("OWNER_ID")?,
            purge_max_age: Duration::from_secs(purge_max_age_hours * 3600),
            purge_interval: Duration::from_secs(purge_interval_hours * 3600),
            civitai_api_key: optional("CIVITAI_API_KEY"),
            workflow_dir: optional("WORKFLOW_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./workflows")),
        })
    }

    pub fn channel_allowed(&self, channel_id: &str) -> bool {
        self.allowed_channel_ids.iter().any(|c| c == channel_id)
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

fn parse_number(
    name: &'static str,
    raw: Option<String>,
    default: u64,
) -> Result<u64, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
        }),
    }
}

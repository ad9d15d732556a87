//! Boot-time node catalog resolution.
//!
//! Discovers the concrete checkpoint-loader and sampler classes installed
//! on the renderer and the legal enum values for models, samplers,
//! schedulers, and adapters. Resolved once; frozen for the process lifetime.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::client::RendererClient;
use crate::error::RendererError;
use easel_protocol::defaults::{ADAPTER_OPTION_CAP, WIDGET_OPTION_CAP};
use easel_protocol::NodeCatalog;

/// Checkpoint loader classes, best first. Anything else containing
/// "CheckpointLoader" is accepted as a fuzzy fallback.
const CHECKPOINT_CLASSES: &[&str] = &["CheckpointLoaderSimpleShared", "CheckpointLoaderSimple"];

/// Sampler classes, best first. The stock class is a last resort because
/// its graph semantics differ from the efficiency variants.
const SAMPLER_CLASSES: &[&str] = &["KSampler Adv. (Efficient)", "KSampler (Efficient)", "KSampler"];

const ADAPTER_LOADER_CLASS: &str = "LoraLoader";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error("No checkpoint loader class found on the renderer")]
    NoCheckpointClass,

    #[error("No sampler class found on the renderer")]
    NoSamplerClass,

    #[error("Node class {class} has no values for required input {field}")]
    EmptyEnum { class: String, field: String },
}

/// Resolve the catalog from a live renderer.
pub async fn resolve_catalog(client: &RendererClient) -> Result<NodeCatalog, CatalogError> {
    let info = client.object_info().await?;
    resolve_from_object_info(&info)
}

/// Resolve the catalog from an introspection map.
pub fn resolve_from_object_info(info: &Map<String, Value>) -> Result<NodeCatalog, CatalogError> {
    let checkpoint_class = pick_checkpoint_class(info)?;
    let sampler_class = pick_sampler_class(info)?;

    let models = required_enum(info, &checkpoint_class, "ckpt_name")?;
    let samplers = required_enum(info, &sampler_class, "sampler_name")?;
    let schedulers = required_enum(info, &sampler_class, "scheduler")?;
    let adapters = required_enum(info, ADAPTER_LOADER_CLASS, "lora_name").unwrap_or_default();

    Ok(NodeCatalog {
        models: truncate(models, WIDGET_OPTION_CAP, "models"),
        samplers: truncate(samplers, WIDGET_OPTION_CAP, "samplers"),
        schedulers: truncate(schedulers, WIDGET_OPTION_CAP, "schedulers"),
        adapters: truncate(adapters, ADAPTER_OPTION_CAP, "adapters"),
        checkpoint_class,
        sampler_class,
    })
}

fn pick_checkpoint_class(info: &Map<String, Value>) -> Result<String, CatalogError> {
    for class in CHECKPOINT_CLASSES {
        if info.contains_key(*class) {
            return Ok((*class).to_string());
        }
    }
    // Fuzzy fallback: any class whose name mentions CheckpointLoader.
    if let Some(name) = info.keys().find(|k| k.contains("CheckpointLoader")) {
        warn!("Using fuzzy checkpoint loader match: {name}");
        return Ok(name.clone());
    }
    Err(CatalogError::NoCheckpointClass)
}

fn pick_sampler_class(info: &Map<String, Value>) -> Result<String, CatalogError> {
    for class in SAMPLER_CLASSES {
        if info.contains_key(*class) {
            if *class == "KSampler" {
                warn!("Falling back to stock KSampler; graph semantics differ");
            }
            return Ok((*class).to_string());
        }
    }
    Err(CatalogError::NoSamplerClass)
}

/// Read `input.required.<field>[0]` (a list of legal values) off a class.
fn required_enum(
    info: &Map<String, Value>,
    class: &str,
    field: &str,
) -> Result<Vec<String>, CatalogError> {
    let values = info
        .get(class)
        .and_then(|schema| schema.pointer(&format!("/input/required/{field}/0")))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if values.is_empty() {
        return Err(CatalogError::EmptyEnum {
            class: class.to_string(),
            field: field.to_string(),
        });
    }
    Ok(values)
}

fn truncate(mut values: Vec<String>, cap: usize, label: &str) -> Vec<String> {
    if values.len() > cap {
        warn!("Truncating {label} list from {} to {cap}", values.len());
        values.truncate(cap);
    }
    values
}

//! The bind transform: deep-clone a template and write per-job values into
//! its nodes.

use serde_json::{json, Map, Value};

use crate::error::TemplateError;
use crate::template::UpscaleWorkflow;
use crate::validate::{
    self, ADAPTER_BASE_ID, AUX_SAMPLER_NODES, CHECKPOINT_NODE, LATENT_NODE, NEGATIVE_NODE,
    POSITIVE_NODE, PRIMARY_SAMPLER_NODE, SEED_NODE, UPSCALE_LOAD_NODE, UPSCALE_MODEL_NODE,
    UPSCALE_NEGATIVE_NODE, UPSCALE_POSITIVE_NODE,
};
use easel_protocol::defaults::MAX_ADAPTER_SLOTS;
use easel_protocol::{AdapterSlot, Job, UpscaleJob};

/// Bind the base generation template for one job. The source text is parsed
/// fresh so the caller's cached template is never mutated.
pub fn bind_generation_graph(source: &str, job: &Job) -> Result<Value, TemplateError> {
    let mut nodes: Map<String, Value> = serde_json::from_str(source)?;
    validate::validate_base(&nodes)?;

    let active: Vec<&AdapterSlot> = job.adapters.iter().take(MAX_ADAPTER_SLOTS).collect();
    if !active.is_empty() {
        inject_adapter_chain(&mut nodes, &active);
    }

    let (width, height) = job.size.dimensions();
    set_input(&mut nodes, LATENT_NODE, "width", json!(width));
    set_input(&mut nodes, LATENT_NODE, "height", json!(height));
    set_input(&mut nodes, CHECKPOINT_NODE, "ckpt_name", json!(job.model));
    set_input(&mut nodes, SEED_NODE, "seed", json!(job.seed));
    set_input(
        &mut nodes,
        POSITIVE_NODE,
        "text",
        json!(compose_positive(&job.positive_prompt, &active)),
    );
    set_input(&mut nodes, NEGATIVE_NODE, "text", json!(job.negative_prompt));

    set_input(
        &mut nodes,
        PRIMARY_SAMPLER_NODE,
        "sampler_name",
        json!(job.sampler),
    );
    set_input(
        &mut nodes,
        PRIMARY_SAMPLER_NODE,
        "scheduler",
        json!(job.scheduler),
    );
    set_input(&mut nodes, PRIMARY_SAMPLER_NODE, "steps", json!(job.steps));
    set_input(&mut nodes, PRIMARY_SAMPLER_NODE, "cfg", json!(job.cfg));

    // Aux samplers take sampler and scheduler only; their steps and cfg
    // belong to the template.
    for aux in AUX_SAMPLER_NODES {
        set_input(&mut nodes, aux, "sampler_name", json!(job.sampler));
        set_input(&mut nodes, aux, "scheduler", json!(job.scheduler));
    }

    Ok(Value::Object(nodes))
}

/// Bind the active upscale template: inject the uploaded source image name,
/// the upscale model, and (for the rich template) the original prompts.
pub fn bind_upscale_graph(
    source: &str,
    kind: UpscaleWorkflow,
    job: &UpscaleJob,
    uploaded_name: &str,
) -> Result<Value, TemplateError> {
    let mut nodes: Map<String, Value> = serde_json::from_str(source)?;
    match kind {
        UpscaleWorkflow::Simple => validate::validate_upscale_simple(&nodes)?,
        UpscaleWorkflow::Ultimate => validate::validate_upscale_ultimate(&nodes)?,
    }

    set_input(&mut nodes, UPSCALE_LOAD_NODE, "image", json!(uploaded_name));
    set_input(
        &mut nodes,
        UPSCALE_MODEL_NODE,
        "model_name",
        json!(job.upscale_model),
    );
    if kind == UpscaleWorkflow::Ultimate {
        set_input(
            &mut nodes,
            UPSCALE_POSITIVE_NODE,
            "text",
            json!(job.positive_prompt),
        );
        set_input(
            &mut nodes,
            UPSCALE_NEGATIVE_NODE,
            "text",
            json!(job.negative_prompt),
        );
    }

    Ok(Value::Object(nodes))
}

/// Build the adapter chain: slot 0 reads model/clip from the checkpoint's
/// outputs 0/1, slot k from slot k-1. Every pre-existing reference to the
/// checkpoint's outputs 0/1 is rerouted to the last slot. Rewriting runs
/// before insertion, so the new nodes themselves are never rerouted.
fn inject_adapter_chain(nodes: &mut Map<String, Value>, adapters: &[&AdapterSlot]) {
    let last_id = (ADAPTER_BASE_ID + adapters.len() as u64 - 1).to_string();
    rewrite_model_clip_refs(nodes, CHECKPOINT_NODE, &last_id);

    for (k, slot) in adapters.iter().enumerate() {
        let id = (ADAPTER_BASE_ID + k as u64).to_string();
        let source = if k == 0 {
            CHECKPOINT_NODE.to_string()
        } else {
            (ADAPTER_BASE_ID + k as u64 - 1).to_string()
        };
        nodes.insert(
            id,
            json!({
                "class_type": "LoraLoader",
                "inputs": {
                    "lora_name": slot.name,
                    "strength_model": slot.strength,
                    "strength_clip": slot.strength,
                    "model": [source, 0],
                    "clip": [source, 1],
                }
            }),
        );
    }
}

/// Reroute `[from, 0]` and `[from, 1]` input references to `to`. References
/// are matched by (source id, output index), never by field name; other
/// output indices (e.g. a VAE on output 2) stay on the original node.
fn rewrite_model_clip_refs(nodes: &mut Map<String, Value>, from: &str, to: &str) {
    for node in nodes.values_mut() {
        let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) else {
            continue;
        };
        for value in inputs.values_mut() {
            let Some(reference) = value.as_array_mut() else {
                continue;
            };
            if reference.len() != 2 {
                continue;
            }
            let source_matches = reference[0].as_str() == Some(from);
            if source_matches && matches!(reference[1].as_u64(), Some(0) | Some(1)) {
                reference[0] = Value::String(to.to_string());
            }
        }
    }
}

/// The user's positive prompt plus all active trigger words, joined by
/// single spaces and trimmed. Falls back to the prompt alone when the
/// combination is empty.
fn compose_positive(positive: &str, adapters: &[&AdapterSlot]) -> String {
    let mut combined = positive.trim().to_string();
    for word in adapters.iter().flat_map(|slot| slot.trigger_words.iter()) {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        if !combined.is_empty() {
            combined.push(' ');
        }
        combined.push_str(word);
    }
    if combined.is_empty() {
        positive.to_string()
    } else {
        combined
    }
}

fn set_input(nodes: &mut Map<String, Value>, node: &str, field: &str, value: Value) {
    if let Some(inputs) = nodes
        .get_mut(node)
        .and_then(|n| n.get_mut("inputs"))
        .and_then(Value::as_object_mut)
    {
        inputs.insert(field.to_string(), value);
    }
}

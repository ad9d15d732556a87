//! Required-node tables and template validation.
//!
//! Node ids are fixed by the shipped templates. Validation short-circuits
//! at the first missing node or field so the diagnostic names exactly one
//! culprit.

use serde_json::{Map, Value};

use crate::error::TemplateError;

/// Latent size node (`width`, `height`).
pub const LATENT_NODE: &str = "135";
/// Checkpoint loader (`ckpt_name`). Outputs 0/1 feed model/clip consumers.
pub const CHECKPOINT_NODE: &str = "152";
/// Shared seed node (`seed`).
pub const SEED_NODE: &str = "256";
/// Positive prompt encoder (`text`).
pub const POSITIVE_NODE: &str = "45";
/// Negative prompt encoder (`text`).
pub const NEGATIVE_NODE: &str = "49";
/// Primary sampler; receives all four of sampler/scheduler/steps/cfg.
pub const PRIMARY_SAMPLER_NODE: &str = "14";
/// Auxiliary samplers; receive sampler/scheduler only, never steps or cfg.
pub const AUX_SAMPLER_NODES: [&str; 3] = ["36", "37", "38"];

/// Synthetic ids for injected adapter nodes, well outside the template's
/// range so reference rewriting can skip them unambiguously.
pub const ADAPTER_BASE_ID: u64 = 2001;

// Upscale template node ids (shared by both variants).
pub const UPSCALE_LOAD_NODE: &str = "1";
pub const UPSCALE_MODEL_NODE: &str = "2";
pub const UPSCALE_POSITIVE_NODE: &str = "6";
pub const UPSCALE_NEGATIVE_NODE: &str = "7";

type RequiredFields = &'static [(&'static str, &'static [&'static str])];

const BASE_REQUIRED: RequiredFields = &[
    (LATENT_NODE, &["width", "height"]),
    (CHECKPOINT_NODE, &["ckpt_name"]),
    (SEED_NODE, &["seed"]),
    (POSITIVE_NODE, &["text"]),
    (NEGATIVE_NODE, &["text"]),
    (
        PRIMARY_SAMPLER_NODE,
        &["sampler_name", "scheduler", "steps", "cfg"],
    ),
    (AUX_SAMPLER_NODES[0], &["sampler_name", "scheduler"]),
    (AUX_SAMPLER_NODES[1], &["sampler_name", "scheduler"]),
    (AUX_SAMPLER_NODES[2], &["sampler_name", "scheduler"]),
];

const UPSCALE_SIMPLE_REQUIRED: RequiredFields = &[
    (UPSCALE_LOAD_NODE, &["image"]),
    (UPSCALE_MODEL_NODE, &["model_name"]),
];

const UPSCALE_ULTIMATE_REQUIRED: RequiredFields = &[
    (UPSCALE_LOAD_NODE, &["image"]),
    (UPSCALE_MODEL_NODE, &["model_name"]),
    (UPSCALE_POSITIVE_NODE, &["text"]),
    (UPSCALE_NEGATIVE_NODE, &["text"]),
];

/// Validate the base generation graph.
pub fn validate_base(nodes: &Map<String, Value>) -> Result<(), TemplateError> {
    validate_required(nodes, BASE_REQUIRED)
}

/// Validate the simple upscale graph.
pub fn validate_upscale_simple(nodes: &Map<String, Value>) -> Result<(), TemplateError> {
    validate_required(nodes, UPSCALE_SIMPLE_REQUIRED)
}

/// Validate the rich upscale graph.
pub fn validate_upscale_ultimate(nodes: &Map<String, Value>) -> Result<(), TemplateError> {
    validate_required(nodes, UPSCALE_ULTIMATE_REQUIRED)
}

fn validate_required(
    nodes: &Map<String, Value>,
    required: RequiredFields,
) -> Result<(), TemplateError> {
    for (node, fields) in required.iter().copied() {
        let inputs = nodes
            .get(node)
            .and_then(|n| n.get("inputs"))
            .ok_or(TemplateError::MissingNode { node })?;
        for field in fields.iter().copied() {
            let value = inputs.get(field);
            if value.is_none() || value == Some(&Value::Null) {
                return Err(TemplateError::MissingField { node, field });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::test_fixtures::parse_base;

    #[test]
    fn shipped_base_template_validates() {
        validate_base(&parse_base()).unwrap();
    }

    #[test]
    fn missing_node_short_circuits_with_its_id() {
        let mut nodes = parse_base();
        nodes.remove(SEED_NODE);
        match validate_base(&nodes) {
            Err(TemplateError::MissingNode { node }) => assert_eq!(node, SEED_NODE),
            other => panic!("expected MissingNode, got {other:?}"),
        }
    }

    #[test]
    fn missing_field_names_node_and_field() {
        let mut nodes = parse_base();
        nodes[PRIMARY_SAMPLER_NODE]["inputs"]
            .as_object_mut()
            .unwrap()
            .remove("cfg");
        match validate_base(&nodes) {
            Err(TemplateError::MissingField { node, field }) => {
                assert_eq!(node, PRIMARY_SAMPLER_NODE);
                assert_eq!(field, "cfg");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn null_field_counts_as_missing() {
        let mut nodes = parse_base();
        nodes[CHECKPOINT_NODE]["inputs"]["ckpt_name"] = Value::Null;
        assert!(matches!(
            validate_base(&nodes),
            Err(TemplateError::MissingField {
                node: CHECKPOINT_NODE,
                field: "ckpt_name"
            })
        ));
    }
}

//! Workflow binder: loads template graphs, validates their required nodes,
//! and rewrites independent copies with per-job parameters.
//!
//! A graph is a JSON mapping from string node-id to
//! `{class_type, inputs}`, where inputs hold literals or references of the
//! form `[source_node_id, output_index]`.

mod bind;
mod error;
mod template;
pub mod validate;

pub use bind::{bind_generation_graph, bind_upscale_graph};
pub use error::TemplateError;
pub use template::{TemplateStore, UpscaleWorkflow};

//! Template and bind errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template is not a JSON object graph: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Template missing required node {node}")]
    MissingNode { node: &'static str },

    #[error("Template node {node} missing required field {field}")]
    MissingField {
        node: &'static str,
        field: &'static str,
    },
}

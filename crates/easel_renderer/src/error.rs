//! Renderer transport error taxonomy.

use thiserror::Error;

/// Errors from the renderer HTTP client. The client never retries; retry
/// policy belongs to callers.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Connect failure or timeout.
    #[error("Renderer unreachable: {0}")]
    Unreachable(String),

    /// Non-2xx response; the body text is carried for diagnostics.
    #[error("Renderer returned HTTP {status}: {body}")]
    Protocol { status: u16, body: String },

    /// Response parsed but did not have the expected shape.
    #[error("Unexpected renderer response: {0}")]
    Shape(String),

    /// The configured base URL does not parse.
    #[error("Invalid renderer base url: {0}")]
    InvalidUrl(String),
}

impl RendererError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::Shape(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

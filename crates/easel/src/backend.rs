//! Seam between the job lifecycle engine and the renderer transport.

use async_trait::async_trait;
use easel_renderer::{HistoryEntry, ImageRef, RendererClient, RendererError, UploadedImage};
use serde_json::Value;

/// The renderer operations the runner and router depend on. Production
/// uses [`RendererClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn submit(&self, graph: &Value) -> Result<String, RendererError>;

    /// `None` means "not ready yet".
    async fn history(&self, backend_prompt_id: &str) -> Option<HistoryEntry>;

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, RendererError>;

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedImage, RendererError>;
}

#[async_trait]
impl RenderBackend for RendererClient {
    async fn submit(&self, graph: &Value) -> Result<String, RendererError> {
        RendererClient::submit(self, graph).await
    }

    async fn history(&self, backend_prompt_id: &str) -> Option<HistoryEntry> {
        RendererClient::history(self, backend_prompt_id).await
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, RendererError> {
        RendererClient::fetch_image(self, image).await
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedImage, RendererError> {
        RendererClient::upload_image(self, bytes, filename).await
    }
}

//! Typed HTTP client for the renderer.

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::error::RendererError;

/// Reachability probe budget.
const PING_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget for ordinary API calls; the per-job deadline is enforced by the
/// runner's poll loop, not here.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One image reference in a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Images produced by one output node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeImages {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status_str: Option<String>,
}

/// Execution record for one submitted prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: HistoryStatus,
    /// Keyed by node id; BTreeMap keeps output iteration deterministic.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeImages>,
}

impl HistoryEntry {
    /// Filenames from every output node's images, in node-id order.
    pub fn output_filenames(&self) -> Vec<String> {
        self.outputs
            .values()
            .flat_map(|node| node.images.iter().map(|img| img.filename.clone()))
            .collect()
    }

    /// Find the full image reference for a filename, for re-fetching.
    pub fn find_image(&self, filename: &str) -> Option<&ImageRef> {
        self.outputs
            .values()
            .flat_map(|node| node.images.iter())
            .find(|img| img.filename == filename)
    }
}

/// Result of a multipart image upload. The returned `name` may differ from
/// the requested filename and is what graph injection must use.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedImage {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Typed client over the renderer's HTTP surface. Never retries.
#[derive(Clone)]
pub struct RendererClient {
    http: reqwest::Client,
    base: Url,
}

impl RendererClient {
    pub fn new(base_url: &str) -> Result<Self, RendererError> {
        let base = Url::parse(base_url)
            .map_err(|e| RendererError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RendererError::from_reqwest)?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<Url, RendererError> {
        self.base
            .join(path)
            .map_err(|e| RendererError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Reachability probe; false on any failure.
    pub async fn ping(&self) -> bool {
        let Ok(url) = self.url("system_stats") else {
            return false;
        };
        match self.http.get(url).timeout(PING_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Full node introspection map, class name to schema.
    pub async fn object_info(&self) -> Result<serde_json::Map<String, Value>, RendererError> {
        let url = self.url("object_info")?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(RendererError::from_reqwest)?;
        let resp = check_status(resp).await?;
        let value: Value = resp.json().await.map_err(RendererError::from_reqwest)?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(RendererError::Shape(format!(
                "object_info is not an object: {other}"
            ))),
        }
    }

    /// Submit a bound graph; returns the backend prompt id.
    pub async fn submit(&self, graph: &Value) -> Result<String, RendererError> {
        let url = self.url("prompt")?;
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "prompt": graph }))
            .send()
            .await
            .map_err(RendererError::from_reqwest)?;
        let resp = check_status(resp).await?;
        let value: Value = resp.json().await.map_err(RendererError::from_reqwest)?;
        value
            .get("prompt_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RendererError::Shape("submit response missing prompt_id".into()))
    }

    /// Execution history for a prompt. `None` means "not ready": 404,
    /// network failure, or the prompt not present yet.
    pub async fn history(&self, backend_prompt_id: &str) -> Option<HistoryEntry> {
        let url = self.url(&format!("history/{backend_prompt_id}")).ok()?;
        let resp = self.http.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let mut value: BTreeMap<String, HistoryEntry> = resp.json().await.ok()?;
        value.remove(backend_prompt_id)
    }

    /// Fetch raw image bytes from the renderer's file store.
    pub async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, RendererError> {
        let url = self.url("view")?;
        let resp = self
            .http
            .get(url)
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .send()
            .await
            .map_err(RendererError::from_reqwest)?;
        let resp = check_status(resp).await?;
        let bytes = resp.bytes().await.map_err(RendererError::from_reqwest)?;
        Ok(bytes.to_vec())
    }

    /// Upload image bytes into the renderer's input folder.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadedImage, RendererError> {
        let url = self.url("upload/image")?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");
        let resp = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(RendererError::from_reqwest)?;
        let resp = check_status(resp).await?;
        resp.json().await.map_err(RendererError::from_reqwest)
    }

    /// Embedded SHA-256 of an adapter file, when the renderer exposes the
    /// metadata endpoint. Best effort: `None` on any failure.
    pub async fn adapter_metadata(&self, filename: &str) -> Option<String> {
        let url = self.url("view_metadata/loras").ok()?;
        let resp = self
            .http
            .get(url)
            .query(&[("filename", filename)])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let value: Value = resp.json().await.ok()?;
        for key in ["sha256", "sshs_model_hash", "modelspec.hash.sha256"] {
            if let Some(hash) = value.get(key).and_then(Value::as_str) {
                let hash = hash.trim();
                if !hash.is_empty() {
                    return Some(hash.to_string());
                }
            }
        }
        None
    }

    /// Trigger words from an optional renderer-side plugin. Best effort:
    /// `None` on any failure, `Some(words)` (possibly empty) on success.
    pub async fn adapter_trigger_words_local(&self, stem: &str) -> Option<Vec<String>> {
        let url = self.url("api/lm/loras/get-trigger-words").ok()?;
        let resp = self
            .http
            .get(url)
            .query(&[("name", stem)])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let value: Value = resp.json().await.ok()?;
        if value.get("success").and_then(Value::as_bool) != Some(true) {
            debug!("Local trigger-word plugin answered without success for {stem}");
            return None;
        }
        let raw = value.get("trigger_words")?.as_array()?;
        Some(split_trigger_words(raw))
    }
}

/// Entries may be comma-joined strings; split and trim them.
pub(crate) fn split_trigger_words(raw: &[Value]) -> Vec<String> {
    raw.iter()
        .filter_map(Value::as_str)
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RendererError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RendererError::Protocol {
        status: status.as_u16(),
        body,
    })
}

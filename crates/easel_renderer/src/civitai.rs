//! Client for the remote adapter metadata service.
//!
//! Lookups are best-effort and must distinguish "definitively no trigger
//! words" from "transient failure": the caller caches the first, retries
//! the second.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const API_BASE_URL: &str = "https://civitai.com/api/v1";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Three-valued lookup outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerWordsOutcome {
    /// The service knows this adapter and lists trigger words.
    Words(Vec<String>),
    /// The service answered authoritatively: nothing indexed (cacheable).
    DefinitelyEmpty,
    /// Rate limit or network failure; do not cache.
    TransientFailure,
}

#[derive(Clone)]
pub struct CivitaiClient {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl CivitaiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: API_BASE_URL.to_string(),
            api_key,
        }
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url).timeout(LOOKUP_TIMEOUT);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Look up a model version by its file hash.
    pub async fn trigger_words_by_hash(&self, hash: &str) -> TriggerWordsOutcome {
        let url = format!("{}/model-versions/by-hash/{hash}", self.base);
        let resp = match self.request(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                debug!("Metadata by-hash lookup failed: {err}");
                return TriggerWordsOutcome::TransientFailure;
            }
        };
        match resp.status().as_u16() {
            404 => return TriggerWordsOutcome::DefinitelyEmpty,
            429 => return TriggerWordsOutcome::TransientFailure,
            code if code >= 400 => return TriggerWordsOutcome::TransientFailure,
            _ => {}
        }
        let Ok(value) = resp.json::<Value>().await else {
            return TriggerWordsOutcome::TransientFailure;
        };
        words_outcome(value.get("trainedWords"))
    }

    /// Fall back to a text search on the adapter filename stem.
    pub async fn trigger_words_by_search(&self, term: &str) -> TriggerWordsOutcome {
        let url = format!("{}/models", self.base);
        let resp = match self
            .request(url)
            .query(&[("query", term), ("types", "LORA"), ("limit", "5")])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                debug!("Metadata search failed for {term}: {err}");
                return TriggerWordsOutcome::TransientFailure;
            }
        };
        match resp.status().as_u16() {
            429 => return TriggerWordsOutcome::TransientFailure,
            code if code >= 400 => return TriggerWordsOutcome::TransientFailure,
            _ => {}
        }
        let Ok(value) = resp.json::<Value>().await else {
            return TriggerWordsOutcome::TransientFailure;
        };
        let first_version = value
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("modelVersions"))
            .and_then(Value::as_array)
            .and_then(|versions| versions.first());
        match first_version {
            Some(version) => words_outcome(version.get("trainedWords")),
            None => TriggerWordsOutcome::DefinitelyEmpty,
        }
    }
}

fn words_outcome(trained: Option<&Value>) -> TriggerWordsOutcome {
    let words = trained
        .and_then(Value::as_array)
        .map(|raw| crate::client::split_trigger_words(raw))
        .unwrap_or_default();
    if words.is_empty() {
        TriggerWordsOutcome::DefinitelyEmpty
    } else {
        TriggerWordsOutcome::Words(words)
    }
}

/// Normalise a filename stem for search: strip a trailing version suffix
/// and replace separators with spaces.
pub fn normalise_stem(stem: &str) -> String {
    let mut stem = stem.to_string();
    // Trailing version markers like "-v1.5", "_V2", ".v10".
    if let Some(pos) = stem.char_indices().rev().find_map(|(i, c)| {
        matches!(c, 'v' | 'V').then_some(i)
    }) {
        let (head, tail) = stem.split_at(pos);
        let marker = head.chars().last();
        let digits = &tail[1..];
        if matches!(marker, Some('-') | Some('_') | Some('.') | Some(' '))
            && !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        {
            stem = head[..head.len() - 1].to_string();
        }
    }
    stem.chars()
        .map(|c| if c == '_' || c == '-' || c == '.' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

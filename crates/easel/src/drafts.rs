//! Per-user draft sessions. Process memory only; a restart clears them and
//! the user redoes the form.

use easel_protocol::{Draft, DraftPatch, Job, NodeCatalog};
use std::collections::HashMap;
use std::sync::Mutex;

/// Message shown when a draft is expected but gone.
pub const SESSION_EXPIRED: &str =
    "Your session has expired. Use the entry command to start a new request.";

#[derive(Default)]
pub struct DraftStore {
    inner: Mutex<HashMap<String, Draft>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh draft with catalog defaults, replacing any previous
    /// session for the requester.
    pub fn init(&self, requester_id: &str, catalog: &NodeCatalog, default_negative: &str) -> Draft {
        let draft = Draft::new(catalog, default_negative);
        self.put(requester_id, draft.clone());
        draft
    }

    /// Seed a draft from a completed job (the Edit flow).
    pub fn init_from_job(&self, requester_id: &str, job: &Job) -> Draft {
        let draft = Draft::from_job(job);
        self.put(requester_id, draft.clone());
        draft
    }

    pub fn get(&self, requester_id: &str) -> Option<Draft> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(requester_id).cloned())
    }

    /// Merge a patch into the requester's draft. `None` means the session
    /// is gone (expired or never started); callers tell the user, this is
    /// not an internal error.
    pub fn merge(&self, requester_id: &str, patch: DraftPatch) -> Option<Draft> {
        let mut map = self.inner.lock().ok()?;
        let draft = map.get_mut(requester_id)?;
        draft.apply(patch);
        Some(draft.clone())
    }

    /// Drop the session after successful submission.
    pub fn delete(&self, requester_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(requester_id);
        }
    }

    fn put(&self, requester_id: &str, draft: Draft) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(requester_id.to_string(), draft);
        }
    }
}

//! Shared domain types for Easel.
//!
//! These types are the single source of truth for jobs, drafts, and the
//! node catalog. All crates (store, renderer, workflow, bot) use them.

pub mod defaults;
pub mod types;

pub use types::{
    fresh_seed, now_ms, AdapterSlot, BannedWord, Draft, DraftPatch, Job, JobParams, JobStatus,
    NodeCatalog, SizePreset, UpscaleJob, UpscaleJobParams,
};

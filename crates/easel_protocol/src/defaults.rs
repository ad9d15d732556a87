//! Shared constants and tunables.

/// Default sampler steps for a fresh draft.
pub const DEFAULT_STEPS: u32 = 28;
/// Default CFG scale for a fresh draft.
pub const DEFAULT_CFG: f64 = 5.0;
/// Sampler preferred for fresh drafts when the renderer offers it.
pub const PREFERRED_SAMPLER: &str = "dpmpp_2m_sde";
/// Scheduler preferred for fresh drafts when the renderer offers it.
pub const PREFERRED_SCHEDULER: &str = "karras";

/// Adapter slots per job.
pub const MAX_ADAPTER_SLOTS: usize = 4;

pub const STEPS_MIN: u32 = 1;
pub const STEPS_MAX: u32 = 150;
pub const CFG_MIN: f64 = 1.0;
pub const CFG_MAX: f64 = 30.0;
pub const STRENGTH_MIN: f64 = 0.1;
pub const STRENGTH_MAX: f64 = 3.0;
/// Seeds are 32-bit unsigned on the renderer side.
pub const SEED_MAX: i64 = u32::MAX as i64;

/// Chat widgets cap dropdowns at 25 options.
pub const WIDGET_OPTION_CAP: usize = 25;
/// Adapter pickers page through a larger autocomplete list.
pub const ADAPTER_OPTION_CAP: usize = 100;

pub const DEFAULT_BACKEND_BASE_URL: &str = "http://127.0.0.1:8188";
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_PURGE_MAX_AGE_HOURS: u64 = 48;
pub const DEFAULT_PURGE_INTERVAL_HOURS: u64 = 6;

//! User-input validation for the interactive form. Errors carry the
//! user-facing message naming the offending field; they are never persisted.

use easel_protocol::defaults::{
    CFG_MAX, CFG_MIN, SEED_MAX, STEPS_MAX, STEPS_MIN, STRENGTH_MAX, STRENGTH_MIN,
};
use easel_protocol::fresh_seed;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Steps must be a whole number from {STEPS_MIN} to {STEPS_MAX}, got \"{0}\"")]
    Steps(String),

    #[error("CFG must be a number from {CFG_MIN} to {CFG_MAX}, got \"{0}\"")]
    Cfg(String),

    #[error("Seed must be a whole number from 0 to {SEED_MAX}, empty, or \"random\", got \"{0}\"")]
    Seed(String),

    #[error("Adapter strength must be from {STRENGTH_MIN} to {STRENGTH_MAX}, got {0}")]
    Strength(f64),

    #[error("The positive prompt must not be empty")]
    EmptyPositivePrompt,
}

pub fn parse_steps(raw: &str) -> Result<u32, ValidationError> {
    let steps: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::Steps(raw.to_string()))?;
    if !(STEPS_MIN..=STEPS_MAX).contains(&steps) {
        return Err(ValidationError::Steps(raw.to_string()));
    }
    Ok(steps)
}

pub fn parse_cfg(raw: &str) -> Result<f64, ValidationError> {
    let cfg: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::Cfg(raw.to_string()))?;
    if !(CFG_MIN..=CFG_MAX).contains(&cfg) {
        return Err(ValidationError::Cfg(raw.to_string()));
    }
    Ok(cfg)
}

/// Empty input or the literal "random" rolls a fresh seed.
pub fn parse_seed(raw: &str) -> Result<i64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("random") {
        return Ok(fresh_seed());
    }
    let seed: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::Seed(raw.to_string()))?;
    if !(0..=SEED_MAX).contains(&seed) {
        return Err(ValidationError::Seed(raw.to_string()));
    }
    Ok(seed)
}

pub fn validate_strength(strength: f64) -> Result<f64, ValidationError> {
    if !(STRENGTH_MIN..=STRENGTH_MAX).contains(&strength) {
        return Err(ValidationError::Strength(strength));
    }
    Ok(strength)
}

/// The trimmed positive prompt, which must be non-empty.
pub fn validate_positive_prompt(raw: &str) -> Result<&str, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPositivePrompt);
    }
    Ok(trimmed)
}

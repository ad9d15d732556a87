//! HTTP clients for the local image renderer and the remote adapter
//! metadata service, plus the boot-time node catalog resolver.

pub mod catalog;
pub mod civitai;
mod client;
mod error;

pub use catalog::{resolve_catalog, resolve_from_object_info, CatalogError};
pub use civitai::{CivitaiClient, TriggerWordsOutcome};
pub use client::{HistoryEntry, HistoryStatus, ImageRef, NodeImages, RendererClient, UploadedImage};
pub use error::RendererError;

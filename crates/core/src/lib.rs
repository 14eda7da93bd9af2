//! Core types and shared functionality for the filings pipeline.
//!
//! This crate provides:
//! - Document descriptors and render quality levels
//! - On-disk artifact cache with JSON metadata sidecars
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;

pub use cache::{CacheKey, CacheMetadata, CacheStore, CachedArtifact};
pub use config::{AppConfig, ConfigError, TierLimits};
pub use descriptor::{DocumentDescriptor, DocumentType, RenderQuality};
pub use error::Error;

//! Content-addressed on-disk cache for rendered documents.
//!
//! Artifacts live under `{root}/artifacts/{subject}/` and every artifact has a
//! same-stem JSON sidecar under `{root}/metadata/{subject}/`. It supports:
//!
//! - Deterministic keys derived from (subject, document type, date)
//! - Atomic writes (temp file + rename), so readers never see partial files
//! - No expiry: filings are immutable once filed, so presence means valid
//! - Purge by subject or by age

pub mod hash;
pub mod metadata;
pub mod store;

pub use crate::Error;

pub use hash::CacheKey;
pub use metadata::CacheMetadata;
pub use store::{CacheStore, CachedArtifact};

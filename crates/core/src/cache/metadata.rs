//! JSON sidecar records stored next to cached artifacts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::descriptor::{DocumentDescriptor, DocumentType};

/// Metadata captured when an artifact is first written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheMetadata {
    pub id: String,
    pub subject: String,
    pub document_type: DocumentType,
    pub date: NaiveDate,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub artifact_path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256 of the artifact bytes.
    pub sha256: String,
    pub cached_at: DateTime<Utc>,
}

impl CacheMetadata {
    /// Build the sidecar record for `bytes` fetched for `descriptor`.
    pub fn capture(descriptor: &DocumentDescriptor, artifact_path: &Path, bytes: &[u8]) -> Self {
        Self {
            id: descriptor.id.clone(),
            subject: descriptor.subject.clone(),
            document_type: descriptor.document_type,
            date: descriptor.date,
            source_url: descriptor.source_url.clone(),
            company_name: descriptor.company_name.clone(),
            artifact_path: artifact_path.to_path_buf(),
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            cached_at: Utc::now(),
        }
    }

    /// Echo of the descriptor this entry was created for.
    pub fn descriptor(&self) -> DocumentDescriptor {
        DocumentDescriptor {
            id: self.id.clone(),
            subject: self.subject.clone(),
            document_type: self.document_type,
            date: self.date,
            source_url: self.source_url.clone(),
            company_name: self.company_name.clone(),
        }
    }
}

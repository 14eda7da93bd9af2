//! Deterministic cache key generation.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::Error;
use crate::descriptor::{DocumentDescriptor, DocumentType};

/// Longest subject accepted as a directory name.
const MAX_SUBJECT_LEN: usize = 32;

/// Compute the content-addressed digest for a document identity.
pub fn compute_cache_key(subject: &str, document_type: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(b"\n");
    hasher.update(document_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(date.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a subject and check it is safe to use as a path component.
pub fn normalize_subject(subject: &str) -> Result<String, Error> {
    let normalized = subject.trim().to_ascii_uppercase();

    if normalized.is_empty() {
        return Err(Error::InvalidDescriptor("subject cannot be empty".into()));
    }
    if normalized.len() > MAX_SUBJECT_LEN {
        return Err(Error::InvalidDescriptor(format!("subject too long: {} chars", normalized.len())));
    }
    if normalized.chars().all(|c| c == '.') {
        return Err(Error::InvalidDescriptor(format!("invalid subject: {subject}")));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return Err(Error::InvalidDescriptor(format!("invalid characters in subject: {subject}")));
    }

    Ok(normalized)
}

/// Cache identity of a descriptor.
///
/// Only (subject, document type, date) participate, so the key never depends
/// on when or how the document was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    subject: String,
    document_type: DocumentType,
    date: NaiveDate,
}

impl CacheKey {
    pub fn new(subject: &str, document_type: DocumentType, date: NaiveDate) -> Result<Self, Error> {
        Ok(Self { subject: normalize_subject(subject)?, document_type, date })
    }

    pub fn for_descriptor(descriptor: &DocumentDescriptor) -> Result<Self, Error> {
        Self::new(&descriptor.subject, descriptor.document_type, descriptor.date)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Filename stem shared by the artifact and its sidecar.
    pub fn stem(&self) -> String {
        format!("{}_{}_{}", self.subject, self.document_type.as_form(), self.date.format("%Y-%m-%d"))
    }

    /// SHA-256 hex digest of the key.
    pub fn digest(&self) -> String {
        compute_cache_key(
            &self.subject,
            self.document_type.as_form(),
            &self.date.format("%Y-%m-%d").to_string(),
        )
    }
}

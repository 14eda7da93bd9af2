//! Document descriptors resolved from the search service.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of regulatory filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
pub enum DocumentType {
    /// Annual report (form 10-K).
    #[serde(rename = "10-K")]
    AnnualReport,
    /// Quarterly report (form 10-Q).
    #[serde(rename = "10-Q")]
    QuarterlyReport,
    /// Current/event report (form 8-K).
    #[serde(rename = "8-K")]
    EventReport,
    /// Any other form type.
    #[serde(rename = "OTHER")]
    Other,
}

impl DocumentType {
    /// Form type string used by the provider and in cache filenames.
    pub fn as_form(&self) -> &'static str {
        match self {
            DocumentType::AnnualReport => "10-K",
            DocumentType::QuarterlyReport => "10-Q",
            DocumentType::EventReport => "8-K",
            DocumentType::Other => "OTHER",
        }
    }

    /// Map a provider form type onto the enumeration.
    ///
    /// Unknown forms (amendments, proxies, ...) become [`DocumentType::Other`].
    pub fn from_form(form: &str) -> Self {
        match form.trim().to_ascii_uppercase().as_str() {
            "10-K" => DocumentType::AnnualReport,
            "10-Q" => DocumentType::QuarterlyReport,
            "8-K" => DocumentType::EventReport,
            _ => DocumentType::Other,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_form())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    /// Strict parse used for user input: unknown forms are rejected rather
    /// than folded into `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match DocumentType::from_form(s) {
            DocumentType::Other if !s.trim().eq_ignore_ascii_case("OTHER") => {
                Err(format!("unsupported document type: {s}"))
            }
            parsed => Ok(parsed),
        }
    }
}

/// Rendering quality requested from the render service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl RenderQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderQuality::Low => "low",
            RenderQuality::Medium => "medium",
            RenderQuality::High => "high",
        }
    }
}

/// Immutable identity of a document to be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DocumentDescriptor {
    /// Provider-assigned unique id (accession number).
    pub id: String,
    /// Subject identifier, usually a ticker symbol.
    pub subject: String,
    pub document_type: DocumentType,
    /// Publication (filed-at) date.
    pub date: NaiveDate,
    /// Locator of the source document.
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

impl DocumentDescriptor {
    pub fn new(
        id: impl Into<String>, subject: impl Into<String>, document_type: DocumentType, date: NaiveDate,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            document_type,
            date,
            source_url: source_url.into(),
            company_name: None,
        }
    }

    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }
}

impl fmt::Display for DocumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} ({})", self.subject, self.document_type, self.date, self.id)
    }
}

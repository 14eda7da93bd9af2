//! Filing search response types and normalization.

use chrono::NaiveDate;
use filings_core::{DocumentDescriptor, DocumentType};
use serde::Deserialize;

/// Raw response from the search endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct QueryApiResponse {
    #[serde(default)]
    pub total: Option<TotalInfo>,
    /// Hits are kept as raw JSON so one malformed record cannot fail the page.
    #[serde(default)]
    pub filings: Vec<serde_json::Value>,
}

/// Hit count metadata.
#[derive(Debug, Deserialize)]
pub struct TotalInfo {
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub relation: Option<String>,
}

/// One filing as returned by the provider. Every field is optional here;
/// [`RawFiling::into_descriptor`] decides what is required.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFiling {
    pub id: Option<String>,
    pub accession_no: Option<String>,
    pub form_type: Option<String>,
    pub filed_at: Option<String>,
    pub ticker: Option<String>,
    pub cik: Option<String>,
    pub company_name: Option<String>,
    pub link_to_filing_details: Option<String>,
    pub link_to_html: Option<String>,
    #[serde(default)]
    pub document_format_files: Option<Vec<RawDocumentFile>>,
}

/// Entry of a filing's document list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocumentFile {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub document_url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse the date part of a filed-at timestamp such as `2023-11-02T18:01:14-04:00`.
pub fn parse_filed_at(value: &str) -> Option<NaiveDate> {
    let date_part = value.trim().get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

impl RawFiling {
    /// Provider id: accession number, falling back to the record id.
    fn document_id(&self) -> Option<&str> {
        non_empty(&self.accession_no).or_else(|| non_empty(&self.id))
    }

    /// Locator of the primary document: the listed file whose type matches
    /// the form type, else the HTML link, else the filing index page.
    fn locator(&self) -> Option<&str> {
        let form = non_empty(&self.form_type);
        let primary = self.document_format_files.iter().flatten().find_map(|file| {
            let kind = non_empty(&file.kind)?;
            if Some(kind) == form { non_empty(&file.document_url) } else { None }
        });

        primary
            .or_else(|| non_empty(&self.link_to_html))
            .or_else(|| non_empty(&self.link_to_filing_details))
    }

    /// Normalize into a descriptor, or say why the hit is unusable.
    pub fn into_descriptor(self, fallback_subject: Option<&str>) -> Result<DocumentDescriptor, &'static str> {
        let id = self.document_id().ok_or("missing accession number")?.to_string();
        let date = non_empty(&self.filed_at)
            .and_then(parse_filed_at)
            .ok_or("missing or malformed filedAt")?;
        let locator = self.locator().ok_or("missing document locator")?.to_string();
        let subject = non_empty(&self.ticker)
            .or_else(|| non_empty(&self.cik))
            .or(fallback_subject)
            .ok_or("missing subject")?
            .to_ascii_uppercase();
        let document_type = non_empty(&self.form_type)
            .map(DocumentType::from_form)
            .unwrap_or(DocumentType::Other);

        let mut descriptor = DocumentDescriptor::new(id, subject, document_type, date, locator);
        if let Some(name) = non_empty(&self.company_name) {
            descriptor = descriptor.with_company_name(name);
        }
        Ok(descriptor)
    }
}

impl QueryApiResponse {
    /// Convert raw hits to descriptors, skipping malformed ones individually.
    pub fn into_descriptors(self, fallback_subject: Option<&str>) -> Vec<DocumentDescriptor> {
        let mut descriptors: Vec<DocumentDescriptor> = Vec::with_capacity(self.filings.len());

        for (idx, hit) in self.filings.into_iter().enumerate() {
            let raw = match serde_json::from_value::<RawFiling>(hit) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(index = idx, error = %e, "skipping unparseable search hit");
                    continue;
                }
            };

            match raw.into_descriptor(fallback_subject) {
                Ok(descriptor) if descriptors.iter().any(|d| d.id == descriptor.id) => {
                    tracing::debug!(id = %descriptor.id, "skipping duplicate search hit");
                }
                Ok(descriptor) => descriptors.push(descriptor),
                Err(reason) => tracing::warn!(index = idx, reason, "skipping malformed search hit"),
            }
        }

        descriptors
    }

    /// Total hits reported by the provider.
    pub fn total_hits(&self) -> u64 {
        self.total.as_ref().map(|t| t.value).unwrap_or(0)
    }
}

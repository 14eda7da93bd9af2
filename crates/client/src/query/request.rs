//! Filing search request types and validation.

use std::sync::LazyLock;

use chrono::NaiveDate;
use filings_core::DocumentType;
use regex::Regex;
use serde::Serialize;

use super::QueryError;

/// Default and maximum page size accepted by the search service.
pub const DEFAULT_SIZE: u8 = 10;
pub const MAX_SIZE: u8 = 50;

/// Most subjects accepted in one request.
const MAX_SUBJECTS: usize = 20;

static TICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{1,5}(?:[.\-][A-Z0-9]{1,2})?$").expect("valid ticker regex"));

/// A subject identifier: exchange ticker or SEC Central Index Key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Ticker(String),
    /// CIK without leading zeros.
    Cik(String),
}

impl Subject {
    /// Parse and validate a user-supplied identifier.
    ///
    /// All-digit inputs of 1 to 10 digits are CIKs; everything else must look
    /// like a ticker (1 to 5 alphanumerics, optional class suffix like `.B`).
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QueryError::InvalidSubject("subject cannot be empty".to_string()));
        }

        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            if trimmed.len() > 10 {
                return Err(QueryError::InvalidSubject(format!("CIK too long: {trimmed}")));
            }
            let stripped = trimmed.trim_start_matches('0');
            if stripped.is_empty() {
                return Err(QueryError::InvalidSubject(format!("invalid CIK: {trimmed}")));
            }
            return Ok(Subject::Cik(stripped.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        if !TICKER.is_match(&upper) {
            return Err(QueryError::InvalidSubject(format!("invalid ticker: {trimmed}")));
        }
        Ok(Subject::Ticker(upper))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Subject::Ticker(s) | Subject::Cik(s) => s,
        }
    }
}

/// Parameters for a filing search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Tickers and/or CIKs (at least one).
    pub subjects: Vec<String>,

    /// Restrict to one form type.
    pub document_type: Option<DocumentType>,

    /// Earliest filed-at date, inclusive.
    pub start_date: Option<NaiveDate>,

    /// Latest filed-at date, inclusive.
    pub end_date: Option<NaiveDate>,

    /// Number of hits (1-50, default 10).
    pub size: Option<u8>,
}

/// Wire body for the search endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueryPayload {
    pub query: String,
    pub from: String,
    pub size: String,
    pub sort: Vec<serde_json::Value>,
}

impl SearchRequest {
    /// Request for one subject.
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self { subjects: vec![subject.into()], ..Default::default() }
    }

    pub fn document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = Some(document_type);
        self
    }

    pub fn size(mut self, size: u8) -> Self {
        self.size = Some(size);
        self
    }

    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Validate the request and parse its subjects.
    pub fn validate(&self) -> Result<Vec<Subject>, QueryError> {
        if self.subjects.is_empty() {
            return Err(QueryError::InvalidSubject("at least one subject is required".to_string()));
        }
        if self.subjects.len() > MAX_SUBJECTS {
            return Err(QueryError::InvalidSubject(format!(
                "too many subjects: {} (max {MAX_SUBJECTS})",
                self.subjects.len()
            )));
        }

        if let Some(size) = self.size
            && !(1..=MAX_SIZE).contains(&size)
        {
            return Err(QueryError::InvalidSize);
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(QueryError::InvalidDateRange { start, end });
        }

        self.subjects.iter().map(|s| Subject::parse(s)).collect()
    }

    /// Get the effective size (default 10).
    pub fn get_size(&self) -> u8 {
        self.size.unwrap_or(DEFAULT_SIZE)
    }

    /// Build the Lucene query string.
    pub fn to_query(&self) -> Result<String, QueryError> {
        let subjects = self.validate()?;

        let ciks: Vec<&str> = subjects
            .iter()
            .filter_map(|s| match s {
                Subject::Cik(c) => Some(c.as_str()),
                Subject::Ticker(_) => None,
            })
            .collect();
        let tickers: Vec<&str> = subjects
            .iter()
            .filter_map(|s| match s {
                Subject::Ticker(t) => Some(t.as_str()),
                Subject::Cik(_) => None,
            })
            .collect();

        let mut clauses = Vec::new();
        match (ciks.is_empty(), tickers.is_empty()) {
            (false, false) => clauses.push(format!("(cik:({}) OR ticker:({}))", ciks.join(", "), tickers.join(", "))),
            (false, true) => clauses.push(format!("cik:({})", ciks.join(", "))),
            (true, false) => clauses.push(format!("ticker:({})", tickers.join(", "))),
            (true, true) => {}
        }

        if let Some(document_type) = self.document_type {
            clauses.push(format!("formType:\"{}\"", document_type.as_form()));
        }

        if self.start_date.is_some() || self.end_date.is_some() {
            let start = self.start_date.map_or_else(|| "*".to_string(), |d| d.to_string());
            let end = self.end_date.map_or_else(|| "*".to_string(), |d| d.to_string());
            clauses.push(format!("filedAt:[{start} TO {end}]"));
        }

        Ok(clauses.join(" AND "))
    }

    /// Build the JSON body, newest filings first.
    pub fn to_payload(&self) -> Result<QueryPayload, QueryError> {
        Ok(QueryPayload {
            query: self.to_query()?,
            from: "0".to_string(),
            size: self.get_size().to_string(),
            sort: vec![serde_json::json!({"filedAt": {"order": "desc"}})],
        })
    }
}

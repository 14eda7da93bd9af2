//! Source locator normalization for render requests.

const SEC_HOST: &str = "www.sec.gov";
const MIRROR_HOST: &str = "sec-api.io";
const INLINE_VIEWER_PREFIX: &str = "/ix?doc=";

/// Error type for locator normalization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("empty source URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("source URL is not an EDGAR archive document: {0}")]
    NotArchive(String),
}

/// Normalize a filing locator into the EDGAR archive URL the renderer expects.
///
/// Normalization steps:
/// 1. Trim whitespace; default the scheme to https:// if missing
/// 2. Strip the inline-XBRL viewer prefix (`/ix?doc=`)
/// 3. Rewrite mirror links (`*.sec-api.io/.../Archives/...`) to `https://www.sec.gov/Archives/...`
/// 4. Remove the fragment
pub fn normalize_source_url(input: &str) -> Result<url::Url, SourceError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SourceError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let url_str = url_str.replacen(INLINE_VIEWER_PREFIX, "", 1);

    let mut parsed = url::Url::parse(&url_str).map_err(|e| SourceError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(SourceError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed.host_str().map(str::to_ascii_lowercase).unwrap_or_default();

    if host == SEC_HOST || host == "sec.gov" {
        parsed
            .set_host(Some(SEC_HOST))
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        parsed
            .set_scheme("https")
            .map_err(|_| SourceError::InvalidUrl(url_str.clone()))?;
    } else if host == MIRROR_HOST || host.ends_with(&format!(".{MIRROR_HOST}")) {
        let path = parsed.path();
        let Some((_, archive_path)) = path.split_once("/Archives/") else {
            return Err(SourceError::NotArchive(trimmed.to_string()));
        };
        parsed = url::Url::parse(&format!("https://{SEC_HOST}/Archives/{archive_path}"))
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
    } else {
        return Err(SourceError::NotArchive(trimmed.to_string()));
    }

    parsed.set_fragment(None);
    Ok(parsed)
}

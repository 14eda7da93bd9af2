//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FILINGS_*)
//! 2. TOML config file (if FILINGS_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Nested tables are addressed with a double underscore, e.g.
//! `FILINGS_RENDER_TIER__MAX_CONCURRENT=4`.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::descriptor::RenderQuality;

mod validation;

pub use validation::ConfigError;

/// Concurrency and pacing budget for one class of remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum requests in flight at once.
    pub max_concurrent: usize,
    /// Minimum spacing between request starts, in milliseconds.
    pub min_interval_ms: u64,
}

impl TierLimits {
    pub const fn new(max_concurrent: usize, min_interval_ms: u64) -> Self {
        Self { max_concurrent, min_interval_ms }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FILINGS_*)
/// 2. TOML config file (if FILINGS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API token used by both the search and render services.
    ///
    /// Set via FILINGS_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Search/index service endpoint.
    #[serde(default = "default_query_url")]
    pub query_url: String,

    /// Document render service endpoint.
    #[serde(default = "default_render_url")]
    pub render_url: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for a single search round trip in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for a single render round trip in milliseconds.
    ///
    /// Rendering large filings is slow, so this is longer than the search timeout.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Quality level requested from the render service.
    #[serde(default)]
    pub render_quality: RenderQuality,

    /// Transient failures tolerated before a fetch gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Cap for a single backoff delay in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Provider 429 responses tolerated before a fetch gives up.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// "Still processing" responses tolerated before a fetch gives up.
    #[serde(default = "default_max_processing_polls")]
    pub max_processing_polls: u32,

    /// Wait between polls when the provider gives no usable hint.
    #[serde(default = "default_processing_default_wait_ms")]
    pub processing_default_wait_ms: u64,

    /// Upper bound applied to provider-suggested waits.
    #[serde(default = "default_processing_max_wait_ms")]
    pub processing_max_wait_ms: u64,

    #[serde(default = "default_search_tier")]
    pub search_tier: TierLimits,

    #[serde(default = "default_query_tier")]
    pub query_tier: TierLimits,

    #[serde(default = "default_render_tier")]
    pub render_tier: TierLimits,

    #[serde(default = "default_download_tier")]
    pub download_tier: TierLimits,

    /// Worker ceiling for batch downloads.
    ///
    /// Kept below the provider's advertised maximum; clamped to the render
    /// tier's concurrency at runtime.
    #[serde(default = "default_batch_max_workers")]
    pub batch_max_workers: usize,

    /// Root directory of the artifact cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Whether cached artifacts are served without a network call.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_query_url() -> String {
    "https://api.sec-api.io".into()
}

fn default_render_url() -> String {
    "https://api.sec-api.io/filing-reader".into()
}

fn default_user_agent() -> String {
    "mcp-filings/0.1".into()
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

fn default_render_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    5_000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_max_rate_limit_retries() -> u32 {
    8
}

fn default_max_processing_polls() -> u32 {
    24
}

fn default_processing_default_wait_ms() -> u64 {
    5_000
}

fn default_processing_max_wait_ms() -> u64 {
    120_000
}

fn default_search_tier() -> TierLimits {
    TierLimits::new(10, 100) // 10 req/s
}

fn default_query_tier() -> TierLimits {
    TierLimits::new(20, 50) // 20 req/s
}

fn default_render_tier() -> TierLimits {
    TierLimits::new(20, 50)
}

fn default_download_tier() -> TierLimits {
    TierLimits::new(23, 43) // 7000 per 5 minutes
}

fn default_batch_max_workers() -> usize {
    20
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache/filings")
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            query_url: default_query_url(),
            render_url: default_render_url(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            render_timeout_ms: default_render_timeout_ms(),
            render_quality: RenderQuality::default(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_processing_polls: default_max_processing_polls(),
            processing_default_wait_ms: default_processing_default_wait_ms(),
            processing_max_wait_ms: default_processing_max_wait_ms(),
            search_tier: default_search_tier(),
            query_tier: default_query_tier(),
            render_tier: default_render_tier(),
            download_tier: default_download_tier(),
            batch_max_workers: default_batch_max_workers(),
            cache_dir: default_cache_dir(),
            cache_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FILINGS_`
    /// 2. TOML file from `FILINGS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FILINGS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("FILINGS_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Check if the provider token is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the token is unset or blank.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "api_key".into(),
                hint: "Set FILINGS_API_KEY environment variable".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.query_url, "https://api.sec-api.io");
        assert_eq!(config.render_url, "https://api.sec-api.io/filing-reader");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay_ms, 5_000);
        assert_eq!(config.render_quality, RenderQuality::High);
        assert_eq!(config.render_tier, TierLimits::new(20, 50));
        assert_eq!(config.batch_max_workers, 20);
        assert!(config.cache_enabled);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_millis(20_000));
        assert_eq!(config.render_timeout(), Duration::from_millis(60_000));
        assert_eq!(config.download_tier.min_interval(), Duration::from_millis(43));
    }

    #[test]
    fn test_require_api_key_missing() {
        let config = AppConfig::default();
        assert!(matches!(config.require_api_key(), Err(ConfigError::Missing { .. })));

        let config = AppConfig { api_key: Some("   ".into()), ..Default::default() };
        assert!(matches!(config.require_api_key(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_api_key_present() {
        let config = AppConfig { api_key: Some("test-key".into()), ..Default::default() };
        assert_eq!(config.require_api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_load_layers_env_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "filings.toml",
                r#"
                max_retries = 2
                cache_enabled = false

                [render_tier]
                max_concurrent = 4
                min_interval_ms = 250
                "#,
            )?;
            jail.set_env("FILINGS_CONFIG_FILE", "filings.toml");
            jail.set_env("FILINGS_MAX_RETRIES", "7");
            jail.set_env("FILINGS_API_KEY", "from-env");
            jail.set_env("FILINGS_SEARCH_TIER__MAX_CONCURRENT", "3");

            let config = AppConfig::load().expect("config should load");
            assert_eq!(config.max_retries, 7);
            assert!(!config.cache_enabled);
            assert_eq!(config.render_tier, TierLimits::new(4, 250));
            assert_eq!(config.search_tier.max_concurrent, 3);
            assert_eq!(config.search_tier.min_interval_ms, 100);
            assert_eq!(config.api_key.as_deref(), Some("from-env"));
            Ok(())
        });
    }
}

//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, TierLimits};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn validate_timeout(field: &str, value_ms: u64) -> Result<(), ConfigError> {
    if value_ms < 100 {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value_ms > 600_000 {
        return Err(invalid(field, "must not exceed 10 minutes (600000ms)"));
    }
    Ok(())
}

fn validate_tier(field: &str, tier: &TierLimits) -> Result<(), ConfigError> {
    if tier.max_concurrent == 0 {
        return Err(invalid(field, "max_concurrent must be greater than 0"));
    }
    if tier.max_concurrent > 256 {
        return Err(invalid(field, "max_concurrent must not exceed 256"));
    }
    if tier.min_interval_ms > 60_000 {
        return Err(invalid(field, "min_interval_ms must not exceed 60000"));
    }
    Ok(())
}

fn validate_endpoint(field: &str, url: &str) -> Result<(), ConfigError> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(invalid(field, "must be an http(s) URL"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - an endpoint is not an http(s) URL
    /// - a timeout is below 100ms or above 10 minutes
    /// - `max_retries` exceeds 20 or any backoff bound is inconsistent
    /// - a tier allows zero (or absurdly many) concurrent requests
    /// - `batch_max_workers` is 0
    /// - `user_agent` or `cache_dir` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("query_url", &self.query_url)?;
        validate_endpoint("render_url", &self.render_url)?;

        validate_timeout("request_timeout_ms", self.request_timeout_ms)?;
        validate_timeout("render_timeout_ms", self.render_timeout_ms)?;

        if self.max_retries > 20 {
            return Err(invalid("max_retries", "must not exceed 20"));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(invalid("retry_base_delay_ms", "must be greater than 0"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(invalid("retry_max_delay_ms", "must be at least retry_base_delay_ms"));
        }
        if self.max_processing_polls == 0 {
            return Err(invalid("max_processing_polls", "must be greater than 0"));
        }
        if self.processing_max_wait_ms < self.processing_default_wait_ms {
            return Err(invalid("processing_max_wait_ms", "must be at least processing_default_wait_ms"));
        }

        validate_tier("search_tier", &self.search_tier)?;
        validate_tier("query_tier", &self.query_tier)?;
        validate_tier("render_tier", &self.render_tier)?;
        validate_tier("download_tier", &self.download_tier)?;

        if self.batch_max_workers == 0 {
            return Err(invalid("batch_max_workers", "must be greater than 0"));
        }
        if self.batch_max_workers > self.render_tier.max_concurrent {
            tracing::warn!(
                batch_max_workers = self.batch_max_workers,
                render_max_concurrent = self.render_tier.max_concurrent,
                "batch_max_workers exceeds the render tier ceiling; batches will be clamped"
            );
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(invalid("cache_dir", "must not be empty"));
        }

        Ok(())
    }
}

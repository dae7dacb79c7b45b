//! Service configuration.
//!
//! Configuration is layered: built-in defaults, then a TOML file, then
//! `RANGEID_*` environment variables, then command-line overrides. Each
//! layer is loaded into a full [`ServiceConfig`] and folded in with
//! [`ServiceConfig::merge`], where a layer only overrides fields it changed
//! from their defaults.
//!
//! ```toml
//! holder_id = "allocator-1"
//! update_timeout_ms = 2500
//! max_allocation_attempts = 50
//!
//! [rate_limit]
//! violation_threshold = 3
//! lockout_ms = 15000
//! windows = [
//!     { duration_ms = 1000, max_requests = 10 },
//!     { duration_ms = 30000, max_requests = 60 },
//! ]
//! ```

use std::path::Path;
use std::path::PathBuf;

use rangeid_constants::allocation::DEFAULT_MAX_ALLOCATION_ATTEMPTS;
use rangeid_constants::allocation::MAX_ALLOCATION_ATTEMPTS;
use rangeid_constants::rate_limit::MAX_WINDOWS;
use rangeid_constants::store::DEFAULT_LEASE_DURATION_MS;
use rangeid_constants::store::MAX_LEASE_DURATION_MS;
use rangeid_constants::store::MIN_LEASE_DURATION_MS;
use rangeid_constants::update::DEFAULT_UPDATE_TIMEOUT_MS;
use rangeid_constants::update::MAX_UPDATE_TIMEOUT_MS;
use rangeid_constants::update::READ_RETRY_BACKOFF_MS;
use rangeid_store::LeaseId;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;

use crate::types::RateLimitConfig;
use crate::types::RateWindow;
use crate::updater::UpdaterConfig;

/// Configuration for an [`IdService`](crate::IdService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Lease identity of this instance. A random id is used when unset.
    #[serde(default)]
    pub holder_id: Option<String>,

    /// Wall-clock budget for one optimistic update.
    #[serde(default = "default_update_timeout_ms")]
    pub update_timeout_ms: u64,

    /// Pause between retries of a transiently failing store call.
    #[serde(default = "default_read_retry_backoff_ms")]
    pub read_retry_backoff_ms: u64,

    /// Attempt bound for one allocation under contention.
    #[serde(default = "default_max_allocation_attempts")]
    pub max_allocation_attempts: u32,

    /// Duration of document locks.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,

    /// Admission control policy.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            holder_id: None,
            update_timeout_ms: default_update_timeout_ms(),
            read_retry_backoff_ms: default_read_retry_backoff_ms(),
            max_allocation_attempts: default_max_allocation_attempts(),
            lease_duration_ms: default_lease_duration_ms(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        toml::from_str(&content).context(ParseTomlSnafu { path })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables follow the pattern `RANGEID_<FIELD_NAME>`; rate limit
    /// fields use `RANGEID_RATE_LIMIT_<FIELD_NAME>`, with windows written
    /// as `duration_ms:max_requests` pairs separated by commas.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|value| value.trim().parse().ok());
        let defaults = RateLimitConfig::default();
        Self {
            holder_id: lookup("RANGEID_HOLDER_ID").filter(|id| !id.trim().is_empty()),
            update_timeout_ms: parse("RANGEID_UPDATE_TIMEOUT_MS").unwrap_or_else(default_update_timeout_ms),
            read_retry_backoff_ms: parse("RANGEID_READ_RETRY_BACKOFF_MS").unwrap_or_else(default_read_retry_backoff_ms),
            max_allocation_attempts: lookup("RANGEID_MAX_ALLOCATION_ATTEMPTS")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or_else(default_max_allocation_attempts),
            lease_duration_ms: parse("RANGEID_LEASE_DURATION_MS").unwrap_or_else(default_lease_duration_ms),
            rate_limit: RateLimitConfig {
                windows: lookup("RANGEID_RATE_LIMIT_WINDOWS")
                    .and_then(|value| parse_windows(&value))
                    .unwrap_or(defaults.windows),
                violation_threshold: lookup("RANGEID_RATE_LIMIT_VIOLATION_THRESHOLD")
                    .and_then(|value| value.trim().parse().ok())
                    .unwrap_or(defaults.violation_threshold),
                lockout_ms: parse("RANGEID_RATE_LIMIT_LOCKOUT_MS").unwrap_or(defaults.lockout_ms),
            },
        }
    }

    /// Merge configuration from another source.
    ///
    /// Fields in `other` that are `Some` or non-default override fields in
    /// `self`.
    pub fn merge(&mut self, other: Self) {
        if other.holder_id.is_some() {
            self.holder_id = other.holder_id;
        }
        if other.update_timeout_ms != default_update_timeout_ms() {
            self.update_timeout_ms = other.update_timeout_ms;
        }
        if other.read_retry_backoff_ms != default_read_retry_backoff_ms() {
            self.read_retry_backoff_ms = other.read_retry_backoff_ms;
        }
        if other.max_allocation_attempts != default_max_allocation_attempts() {
            self.max_allocation_attempts = other.max_allocation_attempts;
        }
        if other.lease_duration_ms != default_lease_duration_ms() {
            self.lease_duration_ms = other.lease_duration_ms;
        }

        let defaults = RateLimitConfig::default();
        if other.rate_limit.windows != defaults.windows {
            self.rate_limit.windows = other.rate_limit.windows;
        }
        if other.rate_limit.violation_threshold != defaults.violation_threshold {
            self.rate_limit.violation_threshold = other.rate_limit.violation_threshold;
        }
        if other.rate_limit.lockout_ms != defaults.lockout_ms {
            self.rate_limit.lockout_ms = other.rate_limit.lockout_ms;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.holder_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(validation("holder_id must not be empty"));
        }
        if self.update_timeout_ms == 0 || self.update_timeout_ms > MAX_UPDATE_TIMEOUT_MS {
            return Err(validation(format!(
                "update_timeout_ms must be between 1 and {MAX_UPDATE_TIMEOUT_MS}, got {}",
                self.update_timeout_ms
            )));
        }
        if self.update_timeout_ms <= self.read_retry_backoff_ms {
            return Err(validation("read_retry_backoff_ms must be shorter than update_timeout_ms"));
        }
        if self.max_allocation_attempts == 0 || self.max_allocation_attempts > MAX_ALLOCATION_ATTEMPTS {
            return Err(validation(format!(
                "max_allocation_attempts must be between 1 and {MAX_ALLOCATION_ATTEMPTS}, got {}",
                self.max_allocation_attempts
            )));
        }
        if !(MIN_LEASE_DURATION_MS..=MAX_LEASE_DURATION_MS).contains(&self.lease_duration_ms) {
            return Err(validation(format!(
                "lease_duration_ms must be between {MIN_LEASE_DURATION_MS} and {MAX_LEASE_DURATION_MS}, got {}",
                self.lease_duration_ms
            )));
        }

        let rate_limit = &self.rate_limit;
        if rate_limit.windows.is_empty() || rate_limit.windows.len() > MAX_WINDOWS as usize {
            return Err(validation(format!("rate_limit.windows must hold 1 to {MAX_WINDOWS} windows")));
        }
        if let Some(window) = rate_limit.windows.iter().find(|w| w.duration_ms == 0 || w.max_requests == 0) {
            return Err(validation(format!(
                "rate_limit window {}ms/{} must have a non-zero duration and limit",
                window.duration_ms, window.max_requests
            )));
        }
        if rate_limit.violation_threshold == 0 {
            return Err(validation("rate_limit.violation_threshold must be at least 1"));
        }
        Ok(())
    }

    /// The configured lease identity, or a freshly generated one.
    pub fn resolve_holder(&self) -> LeaseId {
        match &self.holder_id {
            Some(id) => LeaseId::new(id.clone()),
            None => LeaseId::generate(),
        }
    }

    /// Updater settings presenting `holder` as the writer's lease.
    pub fn updater_config(&self, holder: &LeaseId) -> UpdaterConfig {
        UpdaterConfig {
            timeout_ms: self.update_timeout_ms,
            read_retry_backoff_ms: self.read_retry_backoff_ms,
            lease: Some(holder.clone()),
        }
    }
}

/// Parse `"1000:10,5000:20"` into windows sorted by duration.
fn parse_windows(value: &str) -> Option<Vec<RateWindow>> {
    let mut windows = value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (duration, max) = part.split_once(':')?;
            Some(RateWindow::new(duration.trim().parse().ok()?, max.trim().parse().ok()?))
        })
        .collect::<Option<Vec<_>>>()?;
    windows.sort_by_key(|window| window.duration_ms);
    Some(windows)
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn default_update_timeout_ms() -> u64 {
    DEFAULT_UPDATE_TIMEOUT_MS
}

fn default_read_retry_backoff_ms() -> u64 {
    READ_RETRY_BACKOFF_MS
}

fn default_max_allocation_attempts() -> u32 {
    DEFAULT_MAX_ALLOCATION_ATTEMPTS
}

fn default_lease_duration_ms() -> u64 {
    DEFAULT_LEASE_DURATION_MS
}

/// Configuration loading errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse TOML config file {}: {source}", path.display()))]
    ParseToml { path: PathBuf, source: toml::de::Error },

    #[snafu(display("configuration validation failed: {message}"))]
    Validation { message: String },
}

//! Configuration for the report engine

use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream endpoint base URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Real-time quote and fund-flow host
    pub quote: String,
    /// Daily candle history host
    pub history: String,
    /// Financial statements and concept-board host
    pub datacenter: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            quote: "https://push2.eastmoney.com".to_string(),
            history: "https://push2his.eastmoney.com".to_string(),
            datacenter: "https://datacenter.eastmoney.com".to_string(),
        }
    }
}

/// Configuration for report aggregation and caching
///
/// Immutable once handed to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// How long a completed report stays fresh
    pub cache_ttl: Duration,

    /// Maximum number of cached reports
    pub max_cache_entries: usize,

    /// Budget for one dimension fetch, including the wait for an outbound permit
    pub fetch_timeout: Duration,

    /// Process-wide limit on dimension fetches in flight
    ///
    /// A fundamental or sentiment fetch issues two upstream requests at once,
    /// so up to twice this many HTTP requests may be open.
    pub max_concurrent_fetches: usize,

    /// Timeout of a single HTTP request
    pub http_timeout: Duration,

    /// Attempts per upstream request, the first one included (1 disables retries)
    pub max_attempts: u32,

    /// Delay before the first retry; doubles for each further retry
    pub retry_backoff_base: Duration,

    /// Daily candles requested for indicator math
    pub history_days: usize,

    pub endpoints: Endpoints,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),      // 5 minutes
            max_cache_entries: 1000,
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 10,
            http_timeout: Duration::from_secs(8),
            max_attempts: 2,
            retry_backoff_base: Duration::from_millis(500),
            history_days: 250,
            endpoints: Endpoints::default(),
        }
    }
}

/// Environment variables read by [`ReportConfig::from_env`]
pub mod env {
    pub const CACHE_TTL_SECS: &str = "QUARK_CACHE_TTL_SECS";
    pub const MAX_CACHE_ENTRIES: &str = "QUARK_MAX_CACHE_ENTRIES";
    pub const FETCH_TIMEOUT_MS: &str = "QUARK_FETCH_TIMEOUT_MS";
    pub const MAX_CONCURRENT_FETCHES: &str = "QUARK_MAX_CONCURRENT_FETCHES";
    pub const HTTP_TIMEOUT_MS: &str = "QUARK_HTTP_TIMEOUT_MS";
    pub const MAX_ATTEMPTS: &str = "QUARK_MAX_ATTEMPTS";
    pub const HISTORY_DAYS: &str = "QUARK_HISTORY_DAYS";
}

impl ReportConfig {
    /// Create a new configuration builder
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Defaults overridden by `QUARK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(secs) = quark_utils::lookup_parse::<u64, _>(env::CACHE_TTL_SECS, &lookup)? {
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }
        if let Some(n) = quark_utils::lookup_parse(env::MAX_CACHE_ENTRIES, &lookup)? {
            builder = builder.max_cache_entries(n);
        }
        if let Some(ms) = quark_utils::lookup_parse::<u64, _>(env::FETCH_TIMEOUT_MS, &lookup)? {
            builder = builder.fetch_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = quark_utils::lookup_parse(env::MAX_CONCURRENT_FETCHES, &lookup)? {
            builder = builder.max_concurrent_fetches(n);
        }
        if let Some(ms) = quark_utils::lookup_parse::<u64, _>(env::HTTP_TIMEOUT_MS, &lookup)? {
            builder = builder.http_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = quark_utils::lookup_parse(env::MAX_ATTEMPTS, &lookup)? {
            builder = builder.max_attempts(n);
        }
        if let Some(n) = quark_utils::lookup_parse(env::HISTORY_DAYS, &lookup)? {
            builder = builder.history_days(n);
        }

        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("cache_ttl", self.cache_ttl.is_zero()),
            ("max_cache_entries", self.max_cache_entries == 0),
            ("fetch_timeout", self.fetch_timeout.is_zero()),
            ("max_concurrent_fetches", self.max_concurrent_fetches == 0),
            ("http_timeout", self.http_timeout.is_zero()),
            ("max_attempts", self.max_attempts == 0),
            ("history_days", self.history_days == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ReportError::Config(format!(
                "{field} must be greater than 0"
            )));
        }

        for (name, url) in [
            ("quote", &self.endpoints.quote),
            ("history", &self.endpoints.history),
            ("datacenter", &self.endpoints.datacenter),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ReportError::Config(format!(
                    "{name} endpoint must be an http(s) URL, got {url:?}"
                )));
            }
        }

        Ok(())
    }

    /// Delay before retry number `retry` (0-based)
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        self.retry_backoff_base * 2_u32.saturating_pow(retry)
    }
}

/// Builder for ReportConfig
#[derive(Debug, Default)]
pub struct ReportConfigBuilder {
    cache_ttl: Option<Duration>,
    max_cache_entries: Option<usize>,
    fetch_timeout: Option<Duration>,
    max_concurrent_fetches: Option<usize>,
    http_timeout: Option<Duration>,
    max_attempts: Option<u32>,
    retry_backoff_base: Option<Duration>,
    history_days: Option<usize>,
    endpoints: Option<Endpoints>,
}

impl ReportConfigBuilder {
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn max_cache_entries(mut self, entries: usize) -> Self {
        self.max_cache_entries = Some(entries);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Set attempts per upstream request
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    pub fn history_days(mut self, days: usize) -> Self {
        self.history_days = Some(days);
        self
    }

    /// Point the upstream client somewhere else (e.g. a local fixture server)
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ReportConfig> {
        let defaults = ReportConfig::default();

        let config = ReportConfig {
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            max_cache_entries: self.max_cache_entries.unwrap_or(defaults.max_cache_entries),
            fetch_timeout: self.fetch_timeout.unwrap_or(defaults.fetch_timeout),
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(defaults.max_concurrent_fetches),
            http_timeout: self.http_timeout.unwrap_or(defaults.http_timeout),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            history_days: self.history_days.unwrap_or(defaults.history_days),
            endpoints: self.endpoints.unwrap_or(defaults.endpoints),
        };

        config.validate()?;
        Ok(config)
    }
}

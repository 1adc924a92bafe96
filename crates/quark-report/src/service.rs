//! Report service: the engine's entry point
//!
//! Validates the identifier, then serves the report from the single-flight
//! cache, running one fan-out aggregation on a miss.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::EastMoneyClient;
use crate::cache::{CacheStats, ReportCache};
use crate::config::ReportConfig;
use crate::coordinator::FanOutCoordinator;
use crate::error::Result;
use crate::fetchers::FetcherSet;
use crate::identifier::Identifier;
use crate::report::Report;

/// Aggregates and caches four-dimension reports
#[derive(Debug, Clone)]
pub struct ReportService {
    config: Arc<ReportConfig>,
    cache: Arc<ReportCache>,
    coordinator: Arc<FanOutCoordinator>,
}

impl ReportService {
    /// Build a service around the given fetchers
    pub fn new(config: ReportConfig, fetchers: FetcherSet) -> Result<Self> {
        config.validate()?;

        let cache = ReportCache::new(config.cache_ttl, config.max_cache_entries);
        let coordinator = FanOutCoordinator::new(
            fetchers,
            config.fetch_timeout,
            config.max_concurrent_fetches,
        );
        info!(
            ttl_secs = config.cache_ttl.as_secs(),
            max_entries = config.max_cache_entries,
            fetch_timeout_ms = config.fetch_timeout.as_millis() as u64,
            max_concurrent_fetches = config.max_concurrent_fetches,
            "Report service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            coordinator: Arc::new(coordinator),
        })
    }

    /// Build a service backed by the East Money endpoints in `config`
    pub fn eastmoney(config: ReportConfig) -> Result<Self> {
        let client = Arc::new(EastMoneyClient::new(&config)?);
        let fetchers = FetcherSet::eastmoney(client, config.history_days);
        Self::new(config, fetchers)
    }

    /// Get the report for a raw security code
    ///
    /// The code is validated before anything else happens; an invalid code
    /// never reaches the cache or any fetcher.
    pub async fn get_report(&self, code: &str) -> Result<Arc<Report>> {
        let code = Identifier::parse(code)?;
        self.report_for(&code).await
    }

    /// Get the report for an already validated identifier
    pub async fn report_for(&self, code: &Identifier) -> Result<Arc<Report>> {
        let coordinator = Arc::clone(&self.coordinator);
        let key = code.clone();
        self.cache
            .get_or_load(code, move || async move { coordinator.aggregate(&key).await })
            .await
    }

    /// Drop the cached report for `code`, if any
    pub fn invalidate(&self, code: &str) -> Result<bool> {
        let code = Identifier::parse(code)?;
        Ok(self.cache.invalidate(&code))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Periodically purge expired reports
    ///
    /// The task holds only a weak reference and stops once the service and
    /// all its clones are dropped.
    pub fn spawn_expiry_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache: Weak<ReportCache> = Arc::downgrade(&self.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Report cache dropped, stopping sweeper");
                    break;
                };
                cache.purge_expired();
            }
        })
    }
}

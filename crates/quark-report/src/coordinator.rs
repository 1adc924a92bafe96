//! Fan-out over the four dimension fetchers
//!
//! All four fetches run concurrently, each on its own task, and the
//! coordinator waits for every one of them to settle. Each fetch is bounded by
//! its own timeout, and the wait for an outbound permit counts against that
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::assembler::ReportAssembler;
use crate::dimension::DimensionResult;
use crate::error::{FetchError, ReportError, Result};
use crate::fetchers::{DimensionFetcher, FetcherSet};
use crate::identifier::Identifier;
use crate::report::Report;

/// Runs one aggregation per call
#[derive(Debug, Clone)]
pub struct FanOutCoordinator {
    fetchers: FetcherSet,
    assembler: ReportAssembler,
    fetch_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl FanOutCoordinator {
    pub fn new(
        fetchers: FetcherSet,
        fetch_timeout: Duration,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            fetchers,
            assembler: ReportAssembler::new(),
            fetch_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent_fetches)),
        }
    }

    /// Fetch all four dimensions and assemble them
    ///
    /// Fails with [`ReportError::AllDimensionsFailed`] only when no slot of
    /// the assembled report is available.
    pub async fn aggregate(&self, code: &Identifier) -> Result<Report> {
        let started = Instant::now();

        let (fundamental, valuation, technical, sentiment) = tokio::join!(
            self.settle(&self.fetchers.fundamental, code),
            self.settle(&self.fetchers.valuation, code),
            self.settle(&self.fetchers.technical, code),
            self.settle(&self.fetchers.sentiment, code),
        );

        let report = self
            .assembler
            .assemble(code, [fundamental, valuation, technical, sentiment]);

        if report.available_count() == 0 {
            let failures = report.failures();
            warn!(
                %code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "All dimensions failed"
            );
            return Err(ReportError::AllDimensionsFailed {
                code: code.clone(),
                failures,
            });
        }

        info!(
            %code,
            available = report.available_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregated report"
        );
        Ok(report)
    }

    /// Run one fetch on its own task and wait for it to settle
    ///
    /// A fetcher that panics only costs its own dimension.
    async fn settle(
        &self,
        fetcher: &Arc<dyn DimensionFetcher>,
        code: &Identifier,
    ) -> DimensionResult {
        let dimension = fetcher.dimension();
        let started = Instant::now();

        let task = tokio::spawn(fetch_within(
            Arc::clone(fetcher),
            code.clone(),
            Arc::clone(&self.permits),
            self.fetch_timeout,
        ));
        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(%code, %dimension, error = %err, "Dimension fetch task crashed");
                return Err(FetchError::unavailable(format!(
                    "{dimension} fetcher crashed: {err}"
                )));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(%code, %dimension, elapsed_ms, "Dimension fetched"),
            Err(e) => warn!(
                %code,
                %dimension,
                kind = %e.kind,
                elapsed_ms,
                error = %e.message,
                "Dimension fetch failed"
            ),
        }

        result
    }
}

/// Acquire an outbound permit and fetch, all within `budget`
async fn fetch_within(
    fetcher: Arc<dyn DimensionFetcher>,
    code: Identifier,
    permits: Arc<Semaphore>,
    budget: Duration,
) -> DimensionResult {
    let outcome = timeout(budget, async {
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| FetchError::unavailable("outbound fetch limiter closed"))?;
        fetcher.fetch(&code).await
    })
    .await;

    outcome.unwrap_or_else(|_| {
        Err(FetchError::timeout(format!(
            "{} fetch exceeded {}ms",
            fetcher.dimension(),
            budget.as_millis()
        )))
    })
}

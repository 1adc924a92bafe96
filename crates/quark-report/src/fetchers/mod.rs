//! Dimension fetchers
//!
//! One fetcher per [`Dimension`]. Each one hides the upstream calls it needs
//! behind [`DimensionFetcher::fetch`] and reports every failure as a typed
//! [`FetchError`](crate::error::FetchError), never as a transport error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::api::EastMoneyClient;
use crate::dimension::{Dimension, DimensionResult};
use crate::error::{ReportError, Result};
use crate::identifier::Identifier;

pub mod fundamental;
pub mod sentiment;
pub mod technical;
pub mod valuation;

pub use fundamental::FundamentalFetcher;
pub use sentiment::SentimentFetcher;
pub use technical::{TechnicalFetcher, compute_indicators};
pub use valuation::ValuationFetcher;

/// Capability shared by the four dimension fetchers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DimensionFetcher: Send + Sync {
    /// Dimension this fetcher produces
    fn dimension(&self) -> Dimension;

    /// Retrieve this dimension for one security
    async fn fetch(&self, code: &Identifier) -> DimensionResult;
}

/// The four fetchers, one per slot
#[derive(Clone)]
pub struct FetcherSet {
    pub(crate) fundamental: Arc<dyn DimensionFetcher>,
    pub(crate) valuation: Arc<dyn DimensionFetcher>,
    pub(crate) technical: Arc<dyn DimensionFetcher>,
    pub(crate) sentiment: Arc<dyn DimensionFetcher>,
}

impl FetcherSet {
    /// Group four fetchers, checking each one serves its slot
    pub fn new(
        fundamental: Arc<dyn DimensionFetcher>,
        valuation: Arc<dyn DimensionFetcher>,
        technical: Arc<dyn DimensionFetcher>,
        sentiment: Arc<dyn DimensionFetcher>,
    ) -> Result<Self> {
        let set = Self {
            fundamental,
            valuation,
            technical,
            sentiment,
        };

        for (expected, fetcher) in Dimension::ALL.into_iter().zip(set.in_order()) {
            let actual = fetcher.dimension();
            if actual != expected {
                return Err(ReportError::Config(format!(
                    "{actual} fetcher placed in the {expected} slot"
                )));
            }
        }

        Ok(set)
    }

    /// Fetchers backed by the East Money client
    pub fn eastmoney(client: Arc<EastMoneyClient>, history_days: usize) -> Self {
        Self {
            fundamental: Arc::new(FundamentalFetcher::new(Arc::clone(&client))),
            valuation: Arc::new(ValuationFetcher::new(Arc::clone(&client))),
            technical: Arc::new(TechnicalFetcher::new(Arc::clone(&client), history_days)),
            sentiment: Arc::new(SentimentFetcher::new(client)),
        }
    }

    /// Fetchers in canonical dimension order
    pub fn in_order(&self) -> [&Arc<dyn DimensionFetcher>; 4] {
        [
            &self.fundamental,
            &self.valuation,
            &self.technical,
            &self.sentiment,
        ]
    }
}

impl std::fmt::Debug for FetcherSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherSet").finish_non_exhaustive()
    }
}

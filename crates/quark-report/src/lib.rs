//! Four-dimension A-share report engine
//!
//! Given a six-digit security code, this crate fetches four independently
//! sourced data dimensions concurrently and merges them into one report:
//!
//! - Fundamental: market size, profitability, balance-sheet health
//! - Valuation: price multiples
//! - Technical: latest session, moving averages, RSI, MACD, Bollinger bands
//! - Sentiment: capital flows by order size, concept and industry labels
//!
//! A failed dimension does not fail the report; it shows up as an
//! "unavailable" marker with a failure kind. Only when all four fail does the
//! caller get an error.
//!
//! # Architecture
//!
//! - [`ReportService`]: entry point; validates the code and owns the cache
//! - [`ReportCache`]: TTL + LRU cache with single-flight loading, so N
//!   concurrent requests for one code trigger one aggregation
//! - [`FanOutCoordinator`]: runs the four [`DimensionFetcher`]s with per-fetch
//!   timeouts and an outbound concurrency limit
//! - [`ReportAssembler`]: validates payloads and stamps the report header
//! - [`api::EastMoneyClient`]: upstream HTTP client used by the default fetchers
//!
//! # Example
//!
//! ```rust,ignore
//! use quark_report::{ReportConfig, ReportService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ReportService::eastmoney(ReportConfig::from_env()?)?;
//!
//!     let report = service.get_report("600519").await?;
//!     println!("{}", serde_json::to_string_pretty(&*report)?);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod assembler;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod dimension;
pub mod error;
pub mod fetchers;
pub mod identifier;
pub mod report;
pub mod service;

// Re-export main types for convenience
pub use assembler::ReportAssembler;
pub use cache::{CacheStats, ReportCache};
pub use config::{Endpoints, ReportConfig, ReportConfigBuilder};
pub use coordinator::FanOutCoordinator;
pub use dimension::{
    Dimension, DimensionPayload, DimensionResult, FundamentalData, SentimentData, TechnicalData,
    ValuationData,
};
pub use error::{FetchError, FetchErrorKind, ProviderError, ReportError, Result};
pub use fetchers::{DimensionFetcher, FetcherSet};
pub use identifier::{Identifier, Market};
pub use report::{Report, Slot, UnavailableDetail};
pub use service::ReportService;

//! End-to-end behaviour of the report service with stub fetchers

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quark_report::{
    Dimension, DimensionFetcher, DimensionPayload, DimensionResult, FetchError, FetchErrorKind,
    FetcherSet, FundamentalData, Identifier, ReportConfig, ReportError, ReportService,
    SentimentData, TechnicalData, ValuationData,
};

struct StubFetcher {
    dimension: Dimension,
    calls: Arc<AtomicUsize>,
    delay: Duration,
    failure: Option<FetchError>,
    panic_first: bool,
}

impl StubFetcher {
    fn ok(dimension: Dimension) -> Self {
        Self {
            dimension,
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_millis(20),
            failure: None,
            panic_first: false,
        }
    }

    fn failing(dimension: Dimension, failure: FetchError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::ok(dimension)
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn panicking_once(mut self) -> Self {
        self.panic_first = true;
        self
    }
}

#[async_trait]
impl DimensionFetcher for StubFetcher {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn fetch(&self, _code: &Identifier) -> DimensionResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.panic_first && call == 0 {
            panic!("{} provider crashed", self.dimension);
        }
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(payload(self.dimension)),
        }
    }
}

fn payload(dimension: Dimension) -> DimensionPayload {
    match dimension {
        Dimension::Fundamental => DimensionPayload::Fundamental(FundamentalData {
            name: Some("贵州茅台".to_string()),
            market_cap: Some(21_360.0),
            roe: Some(9.39),
            ..Default::default()
        }),
        Dimension::Valuation => DimensionPayload::Valuation(ValuationData {
            pe_ratio_ttm: Some(26.2),
            pb_ratio: Some(8.9),
            ..Default::default()
        }),
        Dimension::Technical => DimensionPayload::Technical(TechnicalData {
            current_price: Some(1700.5),
            day_high: Some(1712.0),
            day_low: Some(1688.0),
            ma_5: Some(1695.3),
            ..Default::default()
        }),
        Dimension::Sentiment => DimensionPayload::Sentiment(SentimentData {
            main_net_inflow: Some(-5230.0),
            concept_labels: vec!["白酒".to_string()],
            ..Default::default()
        }),
    }
}

struct Harness {
    service: ReportService,
    calls: [Arc<AtomicUsize>; 4],
}

impl Harness {
    fn new(config: ReportConfig, stubs: [StubFetcher; 4]) -> Self {
        let calls = stubs.each_ref().map(|stub| Arc::clone(&stub.calls));
        let [fundamental, valuation, technical, sentiment] = stubs;
        let fetchers = FetcherSet::new(
            Arc::new(fundamental),
            Arc::new(valuation),
            Arc::new(technical),
            Arc::new(sentiment),
        )
        .unwrap();

        Self {
            service: ReportService::new(config, fetchers).unwrap(),
            calls,
        }
    }

    fn healthy(config: ReportConfig) -> Self {
        Self::new(config, Dimension::ALL.map(StubFetcher::ok))
    }

    fn calls(&self) -> [usize; 4] {
        self.calls.each_ref().map(|c| c.load(Ordering::SeqCst))
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_trigger_one_aggregation() {
    let harness = Harness::healthy(ReportConfig::default());

    let requests = (0..50).map(|_| harness.service.get_report("600519"));
    let reports: Vec<_> = futures::future::join_all(requests)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(harness.calls(), [1, 1, 1, 1]);
    assert!(reports.iter().all(|r| Arc::ptr_eq(r, &reports[0])));

    let stats = harness.service.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 49);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn report_is_served_from_cache_until_ttl() {
    let config = ReportConfig::builder()
        .cache_ttl(Duration::from_secs(300))
        .build()
        .unwrap();
    let harness = Harness::healthy(config);

    let first = harness.service.get_report("600519").await.unwrap();
    tokio::time::advance(Duration::from_secs(120)).await;
    let second = harness.service.get_report("600519").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.calls(), [1, 1, 1, 1]);

    tokio::time::advance(Duration::from_secs(300)).await;
    let third = harness.service.get_report("600519").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(harness.calls(), [2, 2, 2, 2]);
}

#[tokio::test(start_paused = true)]
async fn least_recently_used_report_is_evicted() {
    let config = ReportConfig::builder().max_cache_entries(2).build().unwrap();
    let harness = Harness::healthy(config);

    harness.service.get_report("600519").await.unwrap();
    harness.service.get_report("000001").await.unwrap();
    harness.service.get_report("600519").await.unwrap();
    harness.service.get_report("300750").await.unwrap();
    assert_eq!(harness.calls(), [3, 3, 3, 3]);

    // 600519 survived, 000001 did not
    harness.service.get_report("600519").await.unwrap();
    assert_eq!(harness.calls(), [3, 3, 3, 3]);
    harness.service.get_report("000001").await.unwrap();
    assert_eq!(harness.calls(), [4, 4, 4, 4]);

    let stats = harness.service.cache_stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 2);
}

#[tokio::test(start_paused = true)]
async fn partial_failure_returns_report_with_markers() {
    let harness = Harness::new(
        ReportConfig::default(),
        [
            StubFetcher::ok(Dimension::Fundamental),
            StubFetcher::failing(Dimension::Valuation, FetchError::unavailable("HTTP 502")),
            StubFetcher::failing(Dimension::Technical, FetchError::not_found("no candles")),
            StubFetcher::ok(Dimension::Sentiment),
        ],
    );

    let report = harness.service.get_report("600519").await.unwrap();
    assert_eq!(report.name(), "贵州茅台");
    assert_eq!(report.available_count(), 2);
    assert!(!report.is_complete());

    let json = serde_json::to_value(&*report).unwrap();
    assert_eq!(json["code"], "600519");
    assert_eq!(json["fundamental"]["status"], "available");
    assert_eq!(json["fundamental"]["detail"]["roe"], 9.39);
    assert_eq!(json["valuation"]["status"], "unavailable");
    assert_eq!(json["valuation"]["detail"]["kind"], "upstream_unavailable");
    assert_eq!(json["technical"]["detail"]["kind"], "not_found");
    assert_eq!(json["technical"]["detail"]["retryable"], false);

    // Partial reports are cached like complete ones
    harness.service.get_report("600519").await.unwrap();
    assert_eq!(harness.calls(), [1, 1, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn all_failed_is_reported_and_not_cached() {
    let harness = Harness::new(
        ReportConfig::default(),
        Dimension::ALL.map(|d| StubFetcher::failing(d, FetchError::not_found("unknown code"))),
    );

    for attempt in 1..=2 {
        let err = harness.service.get_report("999999").await.unwrap_err();
        let ReportError::AllDimensionsFailed { code, failures } = err else {
            panic!("expected AllDimensionsFailed, got {err:?}");
        };
        assert_eq!(code.as_str(), "999999");
        assert_eq!(failures.len(), 4);
        assert!(failures.iter().all(|(_, f)| f.kind == FetchErrorKind::NotFound));
        assert_eq!(harness.calls(), [attempt; 4]);
    }
    assert_eq!(harness.service.cache_stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_identifier_fails_without_fetching() {
    let harness = Harness::healthy(ReportConfig::default());

    for input in ["", "60051", "6005190", "ABC123", "60 519", "６００５１９"] {
        let err = harness.service.get_report(input).await.unwrap_err();
        assert_eq!(err.code(), "report.invalid_identifier", "input {input:?}");
    }

    assert_eq!(harness.calls(), [0, 0, 0, 0]);
    assert_eq!(harness.service.cache_stats().misses, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_dimension_times_out_without_blocking_others() {
    let config = ReportConfig::builder()
        .fetch_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let harness = Harness::new(
        config,
        [
            StubFetcher::ok(Dimension::Fundamental),
            StubFetcher::ok(Dimension::Valuation),
            StubFetcher::ok(Dimension::Technical),
            StubFetcher::ok(Dimension::Sentiment).delayed(Duration::from_secs(60)),
        ],
    );

    let started = tokio::time::Instant::now();
    let report = harness.service.get_report("600519").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.available_count(), 3);
    let detail = report.unavailable(Dimension::Sentiment).unwrap();
    assert_eq!(detail.kind, FetchErrorKind::Timeout);
    assert!(detail.retryable);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetcher_only_loses_its_dimension() {
    let harness = Harness::new(
        ReportConfig::default(),
        [
            StubFetcher::ok(Dimension::Fundamental),
            StubFetcher::ok(Dimension::Valuation).panicking_once(),
            StubFetcher::ok(Dimension::Technical),
            StubFetcher::ok(Dimension::Sentiment),
        ],
    );

    let (first, second) = tokio::join!(
        harness.service.get_report("600519"),
        harness.service.get_report("600519"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.available_count(), 3);
    assert_eq!(first.name(), "贵州茅台");
    let detail = first.unavailable(Dimension::Valuation).unwrap();
    assert_eq!(detail.kind, FetchErrorKind::UpstreamUnavailable);
    assert_eq!(harness.calls(), [1, 1, 1, 1]);
    assert_eq!(harness.service.cache_stats().in_flight, 0);

    assert!(harness.service.invalidate("600519").unwrap());
    let report = harness.service.get_report("600519").await.unwrap();
    assert!(report.is_complete());
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_all_failed_outcome() {
    let harness = Harness::new(
        ReportConfig::default(),
        Dimension::ALL.map(|d| StubFetcher::failing(d, FetchError::unavailable("HTTP 503"))),
    );

    let requests = (0..20).map(|_| harness.service.get_report("000001"));
    let outcomes = futures::future::join_all(requests).await;

    assert_eq!(harness.calls(), [1, 1, 1, 1]);
    for outcome in outcomes {
        let err = outcome.unwrap_err();
        assert_eq!(err.code(), "report.all_dimensions_failed");
        let ReportError::AllDimensionsFailed { failures, .. } = err else {
            unreachable!();
        };
        assert!(failures.iter().all(|(_, f)| f.kind == FetchErrorKind::UpstreamUnavailable));
    }

    let stats = harness.service.cache_stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!((stats.misses, stats.coalesced), (1, 19));
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_refetch() {
    let harness = Harness::healthy(ReportConfig::default());

    harness.service.get_report("000001").await.unwrap();
    assert!(harness.service.invalidate("000001").unwrap());
    assert!(!harness.service.invalidate("000001").unwrap());
    assert!(harness.service.invalidate("bogus").is_err());

    harness.service.get_report("000001").await.unwrap();
    assert_eq!(harness.calls(), [2, 2, 2, 2]);
}

//! Report assembly
//!
//! Pure data shaping: takes the four settled fetch results for one
//! identifier, re-checks every payload against its dimension schema and
//! stamps the report header. No I/O happens here.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::dimension::{Dimension, DimensionPayload, DimensionResult};
use crate::error::FetchError;
use crate::identifier::Identifier;
use crate::report::{Report, Slot};

/// Builds immutable [`Report`]s out of raw dimension results
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Assemble a report stamped with the current time
    ///
    /// `results` must be in canonical [`Dimension::ALL`] order.
    pub fn assemble(&self, code: &Identifier, results: [DimensionResult; 4]) -> Report {
        self.assemble_at(code, results, Utc::now())
    }

    /// Assemble a report with a caller-supplied generation timestamp
    pub fn assemble_at(
        &self,
        code: &Identifier,
        results: [DimensionResult; 4],
        generated_at: DateTime<Utc>,
    ) -> Report {
        let [fundamental, valuation, technical, sentiment] = results;
        let fundamental = check(code, Dimension::Fundamental, fundamental);
        let valuation = check(code, Dimension::Valuation, valuation);
        let technical = check(code, Dimension::Technical, technical);
        let sentiment = check(code, Dimension::Sentiment, sentiment);

        let name = [&fundamental, &valuation]
            .into_iter()
            .filter_map(|result| result.as_ref().ok())
            .find_map(DimensionPayload::display_name)
            .unwrap_or(code.as_str())
            .to_string();

        Report::new(
            code.clone(),
            name,
            generated_at,
            into_slot(fundamental, |p| match p {
                DimensionPayload::Fundamental(data) => Ok(data),
                other => Err(other),
            }),
            into_slot(valuation, |p| match p {
                DimensionPayload::Valuation(data) => Ok(data),
                other => Err(other),
            }),
            into_slot(technical, |p| match p {
                DimensionPayload::Technical(data) => Ok(data),
                other => Err(other),
            }),
            into_slot(sentiment, |p| match p {
                DimensionPayload::Sentiment(data) => Ok(data),
                other => Err(other),
            }),
        )
    }
}

/// Apply the schema checks, downgrading a bad payload to `MalformedData`
fn check(code: &Identifier, dimension: Dimension, result: DimensionResult) -> DimensionResult {
    let payload = result?;

    if payload.dimension() != dimension {
        let reason = format!(
            "expected {dimension} payload, got {}",
            payload.dimension()
        );
        warn!(%code, %dimension, %reason, "Discarding mismatched payload");
        return Err(FetchError::malformed(reason));
    }

    if let Err(reason) = payload.validate() {
        warn!(%code, %dimension, %reason, "Discarding payload that failed validation");
        return Err(FetchError::malformed(reason));
    }

    Ok(payload)
}

fn into_slot<T>(
    result: DimensionResult,
    extract: impl FnOnce(DimensionPayload) -> std::result::Result<T, DimensionPayload>,
) -> Slot<T> {
    match result.map(extract) {
        Ok(Ok(data)) => Slot::Available(data),
        Ok(Err(payload)) => Slot::Unavailable(
            FetchError::malformed(format!("unexpected {} payload", payload.dimension())).into(),
        ),
        Err(err) => Slot::Unavailable(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{FundamentalData, SentimentData, TechnicalData, ValuationData};
    use crate::error::FetchErrorKind;
    use chrono::TimeZone;

    fn code() -> Identifier {
        Identifier::parse("600519").unwrap()
    }

    fn fundamental(name: Option<&str>) -> DimensionResult {
        Ok(DimensionPayload::Fundamental(FundamentalData {
            name: name.map(str::to_string),
            market_cap: Some(21_350.2),
            roe: Some(34.2),
            ..Default::default()
        }))
    }

    fn valuation(name: Option<&str>) -> DimensionResult {
        Ok(DimensionPayload::Valuation(ValuationData {
            name: name.map(str::to_string),
            pe_ratio_ttm: Some(28.1),
            pb_ratio: Some(9.6),
            ..Default::default()
        }))
    }

    fn technical() -> DimensionResult {
        Ok(DimensionPayload::Technical(TechnicalData {
            current_price: Some(1700.0),
            day_high: Some(1712.0),
            day_low: Some(1688.5),
            rsi_6: Some(55.0),
            ..Default::default()
        }))
    }

    fn sentiment() -> DimensionResult {
        Ok(DimensionPayload::Sentiment(SentimentData {
            main_net_inflow: Some(-5230.0),
            concept_labels: vec!["白酒".to_string(), "MSCI中国".to_string()],
            ..Default::default()
        }))
    }

    #[test]
    fn test_assemble_complete_report() {
        let report = ReportAssembler::new().assemble(
            &code(),
            [fundamental(Some("贵州茅台")), valuation(None), technical(), sentiment()],
        );

        assert!(report.is_complete());
        assert_eq!(report.name(), "贵州茅台");
        assert_eq!(report.code().as_str(), "600519");
        assert_eq!(
            report.technical().data().and_then(|t| t.current_price),
            Some(1700.0)
        );
    }

    #[test]
    fn test_failures_become_markers() {
        let report = ReportAssembler::new().assemble(
            &code(),
            [
                Err(FetchError::not_found("no finance rows")),
                valuation(Some("贵州茅台")),
                Err(FetchError::timeout("elapsed")),
                sentiment(),
            ],
        );

        assert_eq!(report.available_count(), 2);
        assert_eq!(report.name(), "贵州茅台");
        let detail = report.unavailable(Dimension::Technical).unwrap();
        assert_eq!(detail.kind, FetchErrorKind::Timeout);
        assert!(detail.retryable);
        assert!(!report.unavailable(Dimension::Fundamental).unwrap().retryable);
    }

    #[test]
    fn test_mismatched_payload_is_downgraded() {
        let report =
            ReportAssembler::new().assemble(&code(), [valuation(None), valuation(None), technical(), sentiment()]);

        let detail = report.unavailable(Dimension::Fundamental).unwrap();
        assert_eq!(detail.kind, FetchErrorKind::MalformedData);
        assert!(detail.reason.contains("expected fundamental"));
        assert!(report.is_available(Dimension::Valuation));
    }

    #[test]
    fn test_invalid_payloads_are_downgraded() {
        let bad_technical = Ok(DimensionPayload::Technical(TechnicalData {
            day_high: Some(10.0),
            day_low: Some(12.0),
            ..Default::default()
        }));
        let empty_sentiment = Ok(DimensionPayload::Sentiment(SentimentData::default()));
        let nan_fundamental = Ok(DimensionPayload::Fundamental(FundamentalData {
            roe: Some(f64::INFINITY),
            ..Default::default()
        }));

        let report = ReportAssembler::new().assemble(
            &code(),
            [nan_fundamental, valuation(None), bad_technical, empty_sentiment],
        );

        assert_eq!(report.available_dimensions(), vec![Dimension::Valuation]);
        for dimension in [Dimension::Fundamental, Dimension::Technical, Dimension::Sentiment] {
            assert_eq!(
                report.unavailable(dimension).unwrap().kind,
                FetchErrorKind::MalformedData
            );
        }
    }

    #[test]
    fn test_name_falls_back_to_code() {
        let report = ReportAssembler::new().assemble(
            &code(),
            [fundamental(Some("  ")), valuation(None), technical(), sentiment()],
        );
        assert_eq!(report.name(), "600519");
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let assembler = ReportAssembler::new();
        let first = assembler.assemble_at(
            &code(),
            [fundamental(None), valuation(None), technical(), Err(FetchError::unavailable("503"))],
            at,
        );
        let second = assembler.assemble_at(
            &code(),
            [fundamental(None), valuation(None), technical(), Err(FetchError::unavailable("503"))],
            at,
        );
        assert_eq!(first, second);
        assert_eq!(first.generated_at(), at);
    }
}

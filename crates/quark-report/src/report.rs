//! The assembled four-dimension report
//!
//! A [`Report`] can only be built by the assembler. Once handed out it is
//! shared as `Arc<Report>` and never mutated.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dimension::{Dimension, FundamentalData, SentimentData, TechnicalData, ValuationData};
use crate::error::{FetchError, FetchErrorKind};
use crate::identifier::Identifier;

/// Why a slot holds no data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableDetail {
    pub kind: FetchErrorKind,
    pub reason: String,
    pub retryable: bool,
}

impl From<FetchError> for UnavailableDetail {
    fn from(err: FetchError) -> Self {
        Self {
            kind: err.kind,
            retryable: err.kind.is_retryable(),
            reason: err.message,
        }
    }
}

/// One dimension's position in a report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Slot<T> {
    Available(T),
    Unavailable(UnavailableDetail),
}

impl<T> Slot<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Available(data) => Some(data),
            Self::Unavailable(_) => None,
        }
    }

    pub fn unavailable(&self) -> Option<&UnavailableDetail> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(detail) => Some(detail),
        }
    }
}

/// Aggregated report for one security
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    code: Identifier,
    name: String,
    generated_at: DateTime<Utc>,
    fundamental: Slot<FundamentalData>,
    valuation: Slot<ValuationData>,
    technical: Slot<TechnicalData>,
    sentiment: Slot<SentimentData>,
}

impl Report {
    pub(crate) fn new(
        code: Identifier,
        name: String,
        generated_at: DateTime<Utc>,
        fundamental: Slot<FundamentalData>,
        valuation: Slot<ValuationData>,
        technical: Slot<TechnicalData>,
        sentiment: Slot<SentimentData>,
    ) -> Self {
        Self {
            code,
            name,
            generated_at,
            fundamental,
            valuation,
            technical,
            sentiment,
        }
    }

    pub fn code(&self) -> &Identifier {
        &self.code
    }

    /// Display name; falls back to the code when upstream sent none
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn fundamental(&self) -> &Slot<FundamentalData> {
        &self.fundamental
    }

    pub fn valuation(&self) -> &Slot<ValuationData> {
        &self.valuation
    }

    pub fn technical(&self) -> &Slot<TechnicalData> {
        &self.technical
    }

    pub fn sentiment(&self) -> &Slot<SentimentData> {
        &self.sentiment
    }

    /// Failure detail for a dimension, `None` when it is available
    pub fn unavailable(&self, dimension: Dimension) -> Option<&UnavailableDetail> {
        match dimension {
            Dimension::Fundamental => self.fundamental.unavailable(),
            Dimension::Valuation => self.valuation.unavailable(),
            Dimension::Technical => self.technical.unavailable(),
            Dimension::Sentiment => self.sentiment.unavailable(),
        }
    }

    pub fn is_available(&self, dimension: Dimension) -> bool {
        self.unavailable(dimension).is_none()
    }

    /// Available dimensions in canonical order
    pub fn available_dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.is_available(*d))
            .collect()
    }

    pub fn available_count(&self) -> usize {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.is_available(*d))
            .count()
    }

    /// Unavailable dimensions with their failure, in canonical order
    pub fn failures(&self) -> Vec<(Dimension, FetchError)> {
        Dimension::ALL
            .into_iter()
            .filter_map(|d| {
                self.unavailable(d)
                    .map(|detail| (d, FetchError::new(detail.kind, detail.reason.clone())))
            })
            .collect()
    }

    /// All four dimensions are present
    pub fn is_complete(&self) -> bool {
        self.available_count() == Dimension::ALL.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Report {
        Report::new(
            Identifier::parse("000001").unwrap(),
            "平安银行".to_string(),
            Utc.with_ymd_and_hms(2024, 5, 17, 7, 0, 0).unwrap(),
            Slot::Available(FundamentalData {
                market_cap: Some(2100.5),
                ..Default::default()
            }),
            Slot::Unavailable(FetchError::timeout("fetch exceeded 10s").into()),
            Slot::Unavailable(FetchError::not_found("no candles").into()),
            Slot::Available(SentimentData {
                main_net_inflow: Some(-1234.5),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_query_helpers() {
        let report = sample();
        assert_eq!(report.available_count(), 2);
        assert!(!report.is_complete());
        assert_eq!(
            report.available_dimensions(),
            vec![Dimension::Fundamental, Dimension::Sentiment]
        );

        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, Dimension::Valuation);
        assert_eq!(failures[0].1.kind, FetchErrorKind::Timeout);
        assert_eq!(failures[1].0, Dimension::Technical);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["code"], "000001");
        assert_eq!(json["name"], "平安银行");
        assert_eq!(json["generated_at"], "2024-05-17T07:00:00Z");
        assert_eq!(json["fundamental"]["status"], "available");
        assert_eq!(json["fundamental"]["detail"]["market_cap"], 2100.5);
        assert_eq!(json["valuation"]["status"], "unavailable");
        assert_eq!(json["valuation"]["detail"]["kind"], "timeout");
        assert_eq!(json["valuation"]["detail"]["retryable"], true);
        assert_eq!(json["technical"]["detail"]["retryable"], false);
    }
}

//! Dimension identifiers and their typed payload records
//!
//! Every dimension has a fixed field set. All fields are optional because the
//! provider may legitimately omit any of them; the assembler decides whether
//! a payload as a whole is usable (see [`DimensionPayload::validate`]).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::error::FetchError;

/// Maximum number of concept labels kept per security
pub const MAX_CONCEPT_LABELS: usize = 10;

/// One of the four data categories composing a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Fundamental,
    Valuation,
    Technical,
    Sentiment,
}

impl Dimension {
    /// Canonical report order
    pub const ALL: [Dimension; 4] = [
        Self::Fundamental,
        Self::Valuation,
        Self::Technical,
        Self::Sentiment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fundamental => "fundamental",
            Self::Valuation => "valuation",
            Self::Technical => "technical",
            Self::Sentiment => "sentiment",
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Company size, profitability and balance-sheet health
///
/// Monetary amounts are in units of 100M CNY, share counts in 10k shares,
/// ratios suffixed with `margin`, `roe`, `roa`, `ratio` (debt) or `yoy` are
/// percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalData {
    /// Short name as listed upstream; lifted into the report header
    #[serde(skip)]
    pub name: Option<String>,
    pub market_cap: Option<f64>,
    pub circulating_market_cap: Option<f64>,
    pub total_shares: Option<f64>,
    pub circulating_shares: Option<f64>,
    /// Reporting period of the financial indicators, `YYYY-MM-DD`
    pub report_period: Option<String>,
    pub revenue: Option<f64>,
    pub net_profit: Option<f64>,
    pub gross_profit_margin: Option<f64>,
    pub net_profit_margin: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub debt_to_asset_ratio: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub revenue_growth_yoy: Option<f64>,
    pub net_profit_growth_yoy: Option<f64>,
    pub inventory_turnover: Option<f64>,
    pub accounts_receivable_turnover: Option<f64>,
    pub total_asset_turnover: Option<f64>,
}

/// Price multiples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationData {
    #[serde(skip)]
    pub name: Option<String>,
    pub pe_ratio_static: Option<f64>,
    pub pe_ratio_dynamic: Option<f64>,
    pub pe_ratio_ttm: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    /// Trailing dividend yield, percent
    pub dividend_yield: Option<f64>,
}

/// Latest session, price ranges and indicator values
///
/// Prices in CNY, volume in lots, turnover in CNY, rates in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalData {
    pub current_price: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_percent: Option<f64>,
    pub volume: Option<f64>,
    pub turnover: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub ma_5: Option<f64>,
    pub ma_10: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_60: Option<f64>,
    pub rsi_6: Option<f64>,
    pub rsi_12: Option<f64>,
    pub rsi_24: Option<f64>,
    pub macd_dif: Option<f64>,
    pub macd_dea: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub boll_upper: Option<f64>,
    pub boll_middle: Option<f64>,
    pub boll_lower: Option<f64>,
}

/// Capital flows and thematic labels
///
/// Net inflows are in 10k CNY for the most recent session in `flow_date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentData {
    pub flow_date: Option<String>,
    pub main_net_inflow: Option<f64>,
    pub super_large_net_inflow: Option<f64>,
    pub large_net_inflow: Option<f64>,
    pub medium_net_inflow: Option<f64>,
    pub small_net_inflow: Option<f64>,
    #[serde(default)]
    pub concept_labels: Vec<String>,
    pub industry_label: Option<String>,
}

/// Payload of one successful dimension fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dimension", content = "data", rename_all = "snake_case")]
pub enum DimensionPayload {
    Fundamental(FundamentalData),
    Valuation(ValuationData),
    Technical(TechnicalData),
    Sentiment(SentimentData),
}

/// Tagged outcome of one dimension fetch
pub type DimensionResult = std::result::Result<DimensionPayload, FetchError>;

impl DimensionPayload {
    pub fn dimension(&self) -> Dimension {
        match self {
            Self::Fundamental(_) => Dimension::Fundamental,
            Self::Valuation(_) => Dimension::Valuation,
            Self::Technical(_) => Dimension::Technical,
            Self::Sentiment(_) => Dimension::Sentiment,
        }
    }

    /// Security name carried by the payload, if the provider sent one
    pub fn display_name(&self) -> Option<&str> {
        let name = match self {
            Self::Fundamental(data) => data.name.as_deref(),
            Self::Valuation(data) => data.name.as_deref(),
            Self::Technical(_) | Self::Sentiment(_) => None,
        };
        name.map(str::trim).filter(|n| !n.is_empty())
    }

    /// Schema checks: presence, finiteness, sign and ordering rules
    ///
    /// Returns the first violated rule as a human-readable reason.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Fundamental(data) => data.validate(),
            Self::Valuation(data) => data.validate(),
            Self::Technical(data) => data.validate(),
            Self::Sentiment(data) => data.validate(),
        }
    }
}

type Field = (&'static str, Option<f64>);

fn check_numeric(fields: &[Field], extra_populated: usize) -> std::result::Result<(), String> {
    let populated = fields.iter().filter(|(_, v)| v.is_some()).count() + extra_populated;
    if populated == 0 {
        return Err("no fields populated".to_string());
    }

    for (name, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(format!("{name} is not a finite number"));
            }
        }
    }

    Ok(())
}

fn non_negative(fields: &[Field]) -> std::result::Result<(), String> {
    for (name, value) in fields {
        if let Some(v) = value {
            if *v < 0.0 {
                return Err(format!("{name} must not be negative (got {v})"));
            }
        }
    }
    Ok(())
}

fn ordered(low: Field, high: Field) -> std::result::Result<(), String> {
    if let ((low_name, Some(lo)), (high_name, Some(hi))) = (low, high) {
        if lo > hi {
            return Err(format!("{low_name} ({lo}) exceeds {high_name} ({hi})"));
        }
    }
    Ok(())
}

impl FundamentalData {
    fn numeric_fields(&self) -> [Field; 18] {
        [
            ("market_cap", self.market_cap),
            ("circulating_market_cap", self.circulating_market_cap),
            ("total_shares", self.total_shares),
            ("circulating_shares", self.circulating_shares),
            ("revenue", self.revenue),
            ("net_profit", self.net_profit),
            ("gross_profit_margin", self.gross_profit_margin),
            ("net_profit_margin", self.net_profit_margin),
            ("roe", self.roe),
            ("roa", self.roa),
            ("debt_to_asset_ratio", self.debt_to_asset_ratio),
            ("current_ratio", self.current_ratio),
            ("quick_ratio", self.quick_ratio),
            ("revenue_growth_yoy", self.revenue_growth_yoy),
            ("net_profit_growth_yoy", self.net_profit_growth_yoy),
            ("inventory_turnover", self.inventory_turnover),
            ("accounts_receivable_turnover", self.accounts_receivable_turnover),
            ("total_asset_turnover", self.total_asset_turnover),
        ]
    }

    fn validate(&self) -> std::result::Result<(), String> {
        check_numeric(&self.numeric_fields(), usize::from(self.report_period.is_some()))?;
        non_negative(&[
            ("market_cap", self.market_cap),
            ("circulating_market_cap", self.circulating_market_cap),
            ("total_shares", self.total_shares),
            ("circulating_shares", self.circulating_shares),
            ("current_ratio", self.current_ratio),
            ("quick_ratio", self.quick_ratio),
            ("inventory_turnover", self.inventory_turnover),
            ("accounts_receivable_turnover", self.accounts_receivable_turnover),
            ("total_asset_turnover", self.total_asset_turnover),
        ])
    }
}

impl ValuationData {
    fn validate(&self) -> std::result::Result<(), String> {
        check_numeric(
            &[
                ("pe_ratio_static", self.pe_ratio_static),
                ("pe_ratio_dynamic", self.pe_ratio_dynamic),
                ("pe_ratio_ttm", self.pe_ratio_ttm),
                ("pb_ratio", self.pb_ratio),
                ("ps_ratio", self.ps_ratio),
                ("dividend_yield", self.dividend_yield),
            ],
            0,
        )?;
        non_negative(&[("dividend_yield", self.dividend_yield)])
    }
}

impl TechnicalData {
    fn numeric_fields(&self) -> [Field; 23] {
        [
            ("current_price", self.current_price),
            ("price_change", self.price_change),
            ("price_change_percent", self.price_change_percent),
            ("volume", self.volume),
            ("turnover", self.turnover),
            ("turnover_rate", self.turnover_rate),
            ("day_high", self.day_high),
            ("day_low", self.day_low),
            ("week_52_high", self.week_52_high),
            ("week_52_low", self.week_52_low),
            ("ma_5", self.ma_5),
            ("ma_10", self.ma_10),
            ("ma_20", self.ma_20),
            ("ma_60", self.ma_60),
            ("rsi_6", self.rsi_6),
            ("rsi_12", self.rsi_12),
            ("rsi_24", self.rsi_24),
            ("macd_dif", self.macd_dif),
            ("macd_dea", self.macd_dea),
            ("macd_histogram", self.macd_histogram),
            ("boll_upper", self.boll_upper),
            ("boll_middle", self.boll_middle),
            ("boll_lower", self.boll_lower),
        ]
    }

    fn validate(&self) -> std::result::Result<(), String> {
        check_numeric(&self.numeric_fields(), 0)?;
        non_negative(&[
            ("current_price", self.current_price),
            ("volume", self.volume),
            ("turnover", self.turnover),
            ("turnover_rate", self.turnover_rate),
            ("day_high", self.day_high),
            ("day_low", self.day_low),
            ("week_52_high", self.week_52_high),
            ("week_52_low", self.week_52_low),
            ("ma_5", self.ma_5),
            ("ma_10", self.ma_10),
            ("ma_20", self.ma_20),
            ("ma_60", self.ma_60),
        ])?;
        ordered(("day_low", self.day_low), ("day_high", self.day_high))?;
        ordered(
            ("week_52_low", self.week_52_low),
            ("week_52_high", self.week_52_high),
        )?;
        ordered(("boll_lower", self.boll_lower), ("boll_upper", self.boll_upper))?;

        for (name, value) in [
            ("rsi_6", self.rsi_6),
            ("rsi_12", self.rsi_12),
            ("rsi_24", self.rsi_24),
        ] {
            if let Some(v) = value {
                if !(0.0..=100.0).contains(&v) {
                    return Err(format!("{name} must be within 0..=100 (got {v})"));
                }
            }
        }

        Ok(())
    }
}

impl SentimentData {
    fn validate(&self) -> std::result::Result<(), String> {
        let labels = usize::from(!self.concept_labels.is_empty())
            + usize::from(self.industry_label.is_some());
        check_numeric(
            &[
                ("main_net_inflow", self.main_net_inflow),
                ("super_large_net_inflow", self.super_large_net_inflow),
                ("large_net_inflow", self.large_net_inflow),
                ("medium_net_inflow", self.medium_net_inflow),
                ("small_net_inflow", self.small_net_inflow),
            ],
            labels,
        )?;

        if self.concept_labels.len() > MAX_CONCEPT_LABELS {
            return Err(format!(
                "concept_labels holds {} entries, limit is {MAX_CONCEPT_LABELS}",
                self.concept_labels.len()
            ));
        }
        if self.concept_labels.iter().any(|l| l.trim().is_empty()) {
            return Err("concept_labels contains an empty label".to_string());
        }

        Ok(())
    }
}

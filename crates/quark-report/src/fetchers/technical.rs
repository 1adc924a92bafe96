//! Technical dimension: latest session plus indicator values over daily closes

use std::sync::Arc;

use async_trait::async_trait;
use ta::{
    Next,
    indicators::{
        BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
        SimpleMovingAverage,
    },
};

use super::DimensionFetcher;
use crate::api::{Candle, EastMoneyClient};
use crate::dimension::{Dimension, DimensionPayload, DimensionResult, TechnicalData};
use crate::error::FetchError;
use crate::identifier::Identifier;

/// Sessions in a trading year, used for the 52-week range
const YEAR_SESSIONS: usize = 250;
/// MACD needs the slow EMA plus the signal period to settle
const MACD_MIN_CLOSES: usize = 35;
const BOLL_PERIOD: usize = 20;

pub struct TechnicalFetcher {
    client: Arc<EastMoneyClient>,
    history_days: usize,
}

impl TechnicalFetcher {
    pub fn new(client: Arc<EastMoneyClient>, history_days: usize) -> Self {
        Self {
            client,
            history_days,
        }
    }
}

#[async_trait]
impl DimensionFetcher for TechnicalFetcher {
    fn dimension(&self) -> Dimension {
        Dimension::Technical
    }

    async fn fetch(&self, code: &Identifier) -> DimensionResult {
        let candles = self
            .client
            .daily_candles(code, self.history_days)
            .await
            .map_err(FetchError::from)?;

        build(&candles).map(DimensionPayload::Technical)
    }
}

fn build(candles: &[Candle]) -> Result<TechnicalData, FetchError> {
    let Some(latest) = candles.last() else {
        return Err(FetchError::not_found("no daily candles"));
    };

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let indicators = compute_indicators(&closes)?;

    let previous_close = candles.len().checked_sub(2).map(|i| candles[i].close);
    let price_change = latest
        .change
        .or_else(|| previous_close.map(|prev| latest.close - prev));
    let price_change_percent = latest.change_pct.or_else(|| {
        previous_close
            .filter(|prev| *prev != 0.0)
            .map(|prev| (latest.close - prev) / prev * 100.0)
    });

    Ok(TechnicalData {
        current_price: Some(latest.close),
        price_change,
        price_change_percent,
        volume: Some(latest.volume),
        turnover: Some(latest.amount),
        turnover_rate: latest.turnover_rate,
        day_high: Some(latest.high),
        day_low: Some(latest.low),
        ..indicators
    })
}

/// Moving averages, RSI, MACD, Bollinger bands and the 52-week range
///
/// `closes` must be oldest first. An indicator is left empty when there is
/// not enough history for it; only indicator fields are populated.
pub fn compute_indicators(closes: &[f64]) -> Result<TechnicalData, FetchError> {
    let mut data = TechnicalData::default();
    if closes.is_empty() {
        return Ok(data);
    }

    data.ma_5 = sma(closes, 5)?;
    data.ma_10 = sma(closes, 10)?;
    data.ma_20 = sma(closes, 20)?;
    data.ma_60 = sma(closes, 60)?;

    data.rsi_6 = rsi(closes, 6)?;
    data.rsi_12 = rsi(closes, 12)?;
    data.rsi_24 = rsi(closes, 24)?;

    if closes.len() >= MACD_MIN_CLOSES {
        let mut macd =
            MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(indicator_error)?;
        if let Some(out) = run(&mut macd, closes) {
            data.macd_dif = finite(out.macd);
            data.macd_dea = finite(out.signal);
            data.macd_histogram = finite(out.histogram);
        }
    }

    if closes.len() >= BOLL_PERIOD {
        let mut bands = BollingerBands::new(BOLL_PERIOD, 2.0).map_err(indicator_error)?;
        if let Some(out) = run(&mut bands, closes) {
            data.boll_upper = finite(out.upper);
            data.boll_middle = finite(out.average);
            data.boll_lower = finite(out.lower);
        }
    }

    let year = &closes[closes.len().saturating_sub(YEAR_SESSIONS)..];
    data.week_52_high = year.iter().copied().reduce(f64::max);
    data.week_52_low = year.iter().copied().reduce(f64::min);

    Ok(data)
}

fn sma(closes: &[f64], period: usize) -> Result<Option<f64>, FetchError> {
    if closes.len() < period {
        return Ok(None);
    }
    let mut indicator = SimpleMovingAverage::new(period).map_err(indicator_error)?;
    Ok(run(&mut indicator, closes).and_then(finite))
}

fn rsi(closes: &[f64], period: usize) -> Result<Option<f64>, FetchError> {
    if closes.len() <= period {
        return Ok(None);
    }
    let mut indicator = RelativeStrengthIndex::new(period).map_err(indicator_error)?;
    Ok(run(&mut indicator, closes).and_then(finite))
}

/// Feed every close, keep the final output
fn run<I: Next<f64>>(indicator: &mut I, closes: &[f64]) -> Option<I::Output> {
    let mut last = None;
    for &close in closes {
        last = Some(indicator.next(close));
    }
    last
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn indicator_error(err: ta::errors::TaError) -> FetchError {
    FetchError::malformed(format!("indicator setup failed: {err}"))
}

//! Fundamental dimension: size, profitability and balance-sheet health

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::DimensionFetcher;
use crate::api::{EastMoneyClient, FinanceIndicators, QuoteSnapshot};
use crate::dimension::{Dimension, DimensionPayload, DimensionResult, FundamentalData};
use crate::error::FetchError;
use crate::identifier::Identifier;

/// CNY → 100M CNY
pub(crate) const YI: f64 = 1e8;
/// shares → 10k shares
pub(crate) const WAN: f64 = 1e4;

pub struct FundamentalFetcher {
    client: Arc<EastMoneyClient>,
}

impl FundamentalFetcher {
    pub fn new(client: Arc<EastMoneyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DimensionFetcher for FundamentalFetcher {
    fn dimension(&self) -> Dimension {
        Dimension::Fundamental
    }

    async fn fetch(&self, code: &Identifier) -> DimensionResult {
        let (snapshot, finance) = tokio::join!(
            self.client.quote_snapshot(code),
            self.client.finance_indicators(code)
        );

        let snapshot = snapshot.map_err(FetchError::from)?;
        let finance = finance
            .inspect_err(|e| {
                warn!(%code, error = %e, "Financial indicators unavailable, using quote data only");
            })
            .ok();

        Ok(DimensionPayload::Fundamental(build(&snapshot, finance.as_ref())))
    }
}

fn build(snapshot: &QuoteSnapshot, finance: Option<&FinanceIndicators>) -> FundamentalData {
    let mut data = FundamentalData {
        name: snapshot.name.clone(),
        market_cap: snapshot.total_market_cap.map(|v| v / YI),
        circulating_market_cap: snapshot.float_market_cap.map(|v| v / YI),
        total_shares: snapshot.total_shares.map(|v| v / WAN),
        circulating_shares: snapshot.float_shares.map(|v| v / WAN),
        ..Default::default()
    };

    if let Some(f) = finance {
        data.report_period = f.report_date.clone();
        data.revenue = f.revenue.map(|v| v / YI);
        data.net_profit = f.net_profit.map(|v| v / YI);
        data.gross_profit_margin = f.gross_margin;
        data.net_profit_margin = f.net_margin;
        data.roe = f.roe;
        data.roa = f.roa;
        data.debt_to_asset_ratio = f.debt_ratio;
        data.current_ratio = f.current_ratio;
        data.quick_ratio = f.quick_ratio;
        data.revenue_growth_yoy = f.revenue_yoy;
        data.net_profit_growth_yoy = f.net_profit_yoy;
        data.inventory_turnover = f.inventory_turnover;
        data.accounts_receivable_turnover = f.receivable_turnover;
        data.total_asset_turnover = f.total_asset_turnover;
    }

    data
}

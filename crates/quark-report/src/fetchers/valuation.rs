//! Valuation dimension: price multiples from the quote snapshot

use std::sync::Arc;

use async_trait::async_trait;

use super::DimensionFetcher;
use crate::api::{EastMoneyClient, QuoteSnapshot};
use crate::dimension::{Dimension, DimensionPayload, DimensionResult, ValuationData};
use crate::error::FetchError;
use crate::identifier::Identifier;

pub struct ValuationFetcher {
    client: Arc<EastMoneyClient>,
}

impl ValuationFetcher {
    pub fn new(client: Arc<EastMoneyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DimensionFetcher for ValuationFetcher {
    fn dimension(&self) -> Dimension {
        Dimension::Valuation
    }

    async fn fetch(&self, code: &Identifier) -> DimensionResult {
        let snapshot = self
            .client
            .quote_snapshot(code)
            .await
            .map_err(FetchError::from)?;

        Ok(DimensionPayload::Valuation(build(snapshot)))
    }
}

fn build(snapshot: QuoteSnapshot) -> ValuationData {
    ValuationData {
        name: snapshot.name,
        pe_ratio_static: snapshot.pe_static,
        pe_ratio_dynamic: snapshot.pe_dynamic,
        pe_ratio_ttm: snapshot.pe_ttm,
        pb_ratio: snapshot.pb,
        ps_ratio: snapshot.ps,
        dividend_yield: snapshot.dividend_yield,
    }
}

//! Sentiment dimension: capital flows and theme labels

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::DimensionFetcher;
use super::fundamental::WAN;
use crate::api::{Board, EastMoneyClient, FundFlow};
use crate::dimension::{
    Dimension, DimensionPayload, DimensionResult, MAX_CONCEPT_LABELS, SentimentData,
};
use crate::error::FetchError;
use crate::identifier::Identifier;

pub struct SentimentFetcher {
    client: Arc<EastMoneyClient>,
}

impl SentimentFetcher {
    pub fn new(client: Arc<EastMoneyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DimensionFetcher for SentimentFetcher {
    fn dimension(&self) -> Dimension {
        Dimension::Sentiment
    }

    async fn fetch(&self, code: &Identifier) -> DimensionResult {
        let (flow, boards) = tokio::join!(
            self.client.latest_fund_flow(code),
            self.client.concept_boards(code)
        );

        let flow = flow.map_err(FetchError::from)?;
        // Labels are a nice-to-have; the flow numbers carry the dimension
        let boards = boards.unwrap_or_else(|e| {
            warn!(%code, error = %e, "Concept boards unavailable");
            Vec::new()
        });

        Ok(DimensionPayload::Sentiment(build(flow, &boards)))
    }
}

fn build(flow: FundFlow, boards: &[Board]) -> SentimentData {
    let industry_label = boards
        .iter()
        .find(|b| b.is_industry())
        .map(|b| b.name.clone());

    let mut concept_labels: Vec<String> = Vec::new();
    for board in boards.iter().filter(|b| !b.is_industry()) {
        if !concept_labels.contains(&board.name) {
            concept_labels.push(board.name.clone());
        }
    }
    concept_labels.truncate(MAX_CONCEPT_LABELS);

    SentimentData {
        flow_date: (!flow.date.is_empty()).then_some(flow.date),
        main_net_inflow: flow.main.map(|v| v / WAN),
        super_large_net_inflow: flow.super_large.map(|v| v / WAN),
        large_net_inflow: flow.large.map(|v| v / WAN),
        medium_net_inflow: flow.medium.map(|v| v / WAN),
        small_net_inflow: flow.small.map(|v| v / WAN),
        concept_labels,
        industry_label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(name: &str, kind: &str) -> Board {
        Board {
            name: name.to_string(),
            kind: Some(kind.to_string()),
        }
    }

    #[test]
    fn test_build_converts_flows() {
        let flow = FundFlow {
            date: "2024-05-17".to_string(),
            main: Some(-52_300_000.0),
            super_large: Some(-40_000_000.0),
            small: Some(31_000_000.0),
            ..Default::default()
        };

        let data = build(flow, &[]);
        assert_eq!(data.flow_date.as_deref(), Some("2024-05-17"));
        assert_eq!(data.main_net_inflow, Some(-5230.0));
        assert_eq!(data.super_large_net_inflow, Some(-4000.0));
        assert_eq!(data.small_net_inflow, Some(3100.0));
        assert!(data.large_net_inflow.is_none());
        assert!(data.concept_labels.is_empty());
    }

    #[test]
    fn test_build_splits_boards() {
        let mut boards = vec![board("酿酒行业", "行业"), board("白酒", "概念"), board("白酒", "概念")];
        boards.extend((0..12).map(|i| board(&format!("concept-{i}"), "概念")));

        let data = build(FundFlow::default(), &boards);
        assert_eq!(data.industry_label.as_deref(), Some("酿酒行业"));
        assert_eq!(data.concept_labels.len(), MAX_CONCEPT_LABELS);
        assert_eq!(data.concept_labels[0], "白酒");
        assert_eq!(data.concept_labels[1], "concept-0");
        assert!(data.flow_date.is_none());
    }
}

//! Market sizing: the entity's TAM/SAM/SOM claims checked against search evidence

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::prompts::{claimed_market_prompt, join_context, validated_market_prompt, ANALYST_SYSTEM};
use crate::domain::context::EntityProfile;
use crate::domain::evaluation::{
    claimed_market_schema, validated_market_schema, ClaimedMarket, MarketAnalysis, ValidatedMarket,
};
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::structured::ParseStage;
use crate::domain::text::truncate_chars;
use crate::infrastructure::context::ContextStore;
use crate::infrastructure::observability::record_run;

const MARKET_QUERY: &str =
    "total addressable market TAM serviceable market SAM obtainable market SOM market size growth rate";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub top_k: usize,
    pub min_context_chars: usize,
    pub evidence_chars: usize,
    pub max_tokens: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_context_chars: 50,
            evidence_chars: 3000,
            max_tokens: 500,
        }
    }
}

/// Reads market claims from documents and sizes the market from evidence.
///
/// Neither step fails a run: missing context or evidence yields zero sizes, which
/// [`MarketAnalysis::assess`] reports as unverified.
#[derive(Debug)]
pub struct MarketAnalysisService {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
    config: MarketConfig,
}

impl MarketAnalysisService {
    pub fn new(context: Arc<ContextStore>, gateway: Arc<dyn ModelGateway>, config: MarketConfig) -> Self {
        Self {
            context,
            gateway,
            config,
        }
    }

    #[instrument(skip(self, entity), fields(entity_id = %entity.id))]
    pub async fn claimed_market(&self, entity: &EntityProfile) -> ClaimedMarket {
        let chunks = match self.context.query(&entity.id, MARKET_QUERY, self.config.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Market retrieval failed");
                return ClaimedMarket::default();
            }
        };

        let context_chars: usize = chunks.iter().map(|c| c.chars().count()).sum();
        if context_chars < self.config.min_context_chars {
            debug!(context_chars, "No market context in the documents");
            return ClaimedMarket::default();
        }

        let options = GenerationOptions::structured()
            .with_system(ANALYST_SYSTEM)
            .with_max_tokens(self.config.max_tokens);
        let prompt = claimed_market_prompt(&join_context(&chunks));

        match self.gateway.generate_structured(&prompt, &claimed_market_schema(), &options).await {
            Ok(outcome) if outcome.stage == ParseStage::Fallback => {
                warn!("Market claims could not be parsed");
                ClaimedMarket::default()
            }
            Ok(outcome) => ClaimedMarket::from_record(&outcome.record),
            Err(e) => {
                warn!(error = %e, "Market claim extraction failed");
                ClaimedMarket::default()
            }
        }
    }

    /// Profile used to plan validation searches; the claimed TAM description
    /// names the market more precisely than the registered industry
    pub fn search_profile(entity: &EntityProfile, claimed: &ClaimedMarket) -> EntityProfile {
        let mut profile = entity.clone();
        if let Some(market) = &claimed.tam_description {
            profile.industry = Some(market.clone());
        }
        profile
    }

    /// Size the market from `evidence` and compare it with `claimed`
    #[instrument(skip(self, entity, claimed, evidence), fields(entity_id = %entity.id))]
    pub async fn analyze(&self, entity: &EntityProfile, claimed: ClaimedMarket, evidence: &str) -> MarketAnalysis {
        let validated = self.validate(entity, &claimed, evidence).await;
        let analysis = MarketAnalysis::assess(Uuid::new_v4().to_string(), entity.id.clone(), claimed, validated);

        record_run("market", analysis.verdict.as_str());
        info!(
            id = %analysis.id,
            verdict = analysis.verdict.as_str(),
            ratio = ?analysis.inflation_ratio,
            "Market analysis completed"
        );
        analysis
    }

    async fn validate(&self, entity: &EntityProfile, claimed: &ClaimedMarket, evidence: &str) -> ValidatedMarket {
        if evidence.trim().is_empty() {
            debug!("No search evidence, market left unvalidated");
            return ValidatedMarket::unavailable();
        }

        let market = Self::search_profile(entity, claimed)
            .industry
            .unwrap_or_else(|| entity.name.clone());
        let prompt = validated_market_prompt(&market, truncate_chars(evidence, self.config.evidence_chars));
        let options = GenerationOptions::structured().with_max_tokens(self.config.max_tokens);

        match self.gateway.generate_structured(&prompt, &validated_market_schema(), &options).await {
            Ok(outcome) if outcome.stage == ParseStage::Fallback => {
                warn!("Validated market could not be parsed");
                ValidatedMarket::unavailable()
            }
            Ok(outcome) => ValidatedMarket::from_record(&outcome.record),
            Err(e) => {
                warn!(error = %e, "Market validation failed");
                ValidatedMarket::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::DocumentMetadata;
    use crate::domain::evaluation::{ConfidenceLevel, SizingVerdict, VALIDATION_UNAVAILABLE};
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::infrastructure::services::test_support::{acme, context_store, gateway, indexed_store};

    const MARKET_DECK: &str = "Our total addressable market is 40 billion dollars across global freight. \
        The serviceable market for regional carriers is 8 billion and we expect to capture 400 million.";

    const CLAIMS: &str = r#"{"tam": 40, "sam": 8, "som": 0.4,
        "tam_description": "global freight software", "sam_description": "regional carriers",
        "som_description": "", "growth_rate": "9% CAGR"}"#;

    async fn market_store() -> Arc<ContextStore> {
        let store = indexed_store().await;
        store
            .add_document(&acme().id, MARKET_DECK, DocumentMetadata::new().with_source_id("market"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_claims_are_read_from_documents() {
        let (gateway, _) = gateway(MockLlmProvider::new("mock").with_response(CLAIMS));
        let service = MarketAnalysisService::new(market_store().await, gateway, MarketConfig::default());

        let claimed = service.claimed_market(&acme()).await;
        assert_eq!(claimed.sizes.tam, 40.0);
        assert_eq!(claimed.sizes.som, 0.4);
        assert_eq!(claimed.tam_description.as_deref(), Some("global freight software"));
        assert_eq!(claimed.som_description, None);

        let profile = MarketAnalysisService::search_profile(&acme(), &claimed);
        assert_eq!(profile.industry.as_deref(), Some("global freight software"));
    }

    #[tokio::test]
    async fn test_no_documents_skips_extraction() {
        let (gateway, provider) = gateway(MockLlmProvider::new("mock").with_response(CLAIMS));
        let service = MarketAnalysisService::new(context_store(), gateway, MarketConfig::default());

        assert_eq!(service.claimed_market(&acme()).await, ClaimedMarket::default());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_claims_checked_against_evidence() {
        let (gateway, _) = gateway(
            MockLlmProvider::new("mock")
                .with_response(CLAIMS)
                .when_prompt_contains(
                    "Using only the search results",
                    MockReply::text(r#"{"tam": 3.2, "sam": 0, "som": 0, "source": "Freight Tech Report 2024"}"#),
                ),
        );
        let service = MarketAnalysisService::new(market_store().await, gateway, MarketConfig::default());

        let claimed = service.claimed_market(&acme()).await;
        let analysis = service
            .analyze(&acme(), claimed, "=== freight software market ===\nMarket valued at $3.2B")
            .await;

        assert!((analysis.inflation_ratio.unwrap() - 12.5).abs() < 1e-9);
        assert_eq!(analysis.verdict, SizingVerdict::Exaggerated);
        assert_eq!(analysis.confidence, ConfidenceLevel::High);
        assert_eq!(analysis.validated.source, "Freight Tech Report 2024");
        assert!((analysis.validated.sizes.sam - 0.96).abs() < 1e-9);
        assert_eq!(analysis.growth_rate, "9% CAGR");
    }

    #[tokio::test]
    async fn test_without_evidence_validation_is_unavailable() {
        let (gateway, provider) = gateway(MockLlmProvider::new("mock").with_response(CLAIMS));
        let service = MarketAnalysisService::new(market_store().await, gateway, MarketConfig::default());

        let claimed = service.claimed_market(&acme()).await;
        let analysis = service.analyze(&acme(), claimed, "  ").await;

        assert_eq!(provider.call_count(), 1);
        assert_eq!(analysis.validated.source, VALIDATION_UNAVAILABLE);
        assert_eq!(analysis.verdict, SizingVerdict::Unverified);
        assert_eq!(analysis.confidence, ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn test_failed_validation_is_unavailable() {
        let (gateway, _) = gateway(
            MockLlmProvider::new("mock")
                .with_response(CLAIMS)
                .when_prompt_contains("Using only the search results", MockReply::Error("down".into())),
        );
        let service = MarketAnalysisService::new(market_store().await, gateway, MarketConfig::default());

        let claimed = service.claimed_market(&acme()).await;
        let analysis = service.analyze(&acme(), claimed, "Market valued at $3.2B").await;

        assert_eq!(analysis.validated, ValidatedMarket::unavailable());
        assert_eq!(analysis.claimed.sizes.tam, 40.0);
    }
}

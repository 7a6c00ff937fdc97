//! Weighted numeric scoring of an entity across categories, with a narrative memo

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::fan_out::{fan_out, UnitResult};
use super::prompts::{join_context, reasoning_prompt, scoring_prompt, ANALYST_SYSTEM};
use crate::domain::context::{EntityId, EntityProfile};
use crate::domain::evaluation::{
    default_scoring_categories, fallback_reasoning, score_schema, std_dev, validate_weights,
    weighted_sum, CancellationFlag, CategoryScore, CategoryStatus, ConfidenceLevel,
    EvaluationError, ScoreCard, ScoringCategory,
};
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::structured::{strip_code_fences, ParseStage};
use crate::domain::text::truncate_chars;
use crate::domain::DomainError;
use crate::infrastructure::context::ContextStore;
use crate::infrastructure::observability::{record_run, record_subtask};

/// Retrieval query used to gather the memo's supporting context
const REASONING_QUERY: &str = "company overview business model team traction market";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Chunks retrieved per category
    pub top_k: usize,
    pub min_context_chars: usize,
    pub evidence_chars: usize,
    /// Chunks retrieved for the reasoning memo
    pub reasoning_chunks: usize,
    pub max_concurrent: usize,
    pub categories: Vec<ScoringCategory>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_context_chars: 50,
            evidence_chars: 1000,
            reasoning_chunks: 8,
            max_concurrent: 6,
            categories: default_scoring_categories(),
        }
    }
}

#[derive(Debug, Clone)]
struct CategoryUnit {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
    entity_id: EntityId,
    category: ScoringCategory,
    evidence: Arc<str>,
    top_k: usize,
    min_context_chars: usize,
}

impl CategoryUnit {
    async fn run(self) -> CategoryScore {
        let id = self.category.id.clone();
        let weight = self.category.weight;

        let chunks = match self.context.query(&self.entity_id, &self.category.query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(category = %id, error = %e, "Retrieval failed");
                return CategoryScore::neutral(id, weight, CategoryStatus::Failed, 0);
            }
        };

        let context_chars: usize = chunks.iter().map(|c| c.chars().count()).sum();
        if context_chars < self.min_context_chars {
            debug!(category = %id, context_chars, "Insufficient context, neutral score");
            return CategoryScore::neutral(id, weight, CategoryStatus::InsufficientContext, context_chars);
        }

        let prompt = scoring_prompt(&self.category, &join_context(&chunks), &self.evidence);
        let options = GenerationOptions::structured().with_system(ANALYST_SYSTEM);

        match self.gateway.generate_structured(&prompt, &score_schema(), &options).await {
            Ok(outcome) if outcome.stage == ParseStage::Fallback => {
                warn!(category = %id, "Score could not be parsed, neutral score");
                CategoryScore::neutral(id, weight, CategoryStatus::Failed, context_chars)
            }
            Ok(outcome) => CategoryScore::from_record(id, weight, &outcome.record, context_chars),
            Err(e) => {
                warn!(category = %id, error = %e, "Scoring generation failed, neutral score");
                CategoryScore::neutral(id, weight, CategoryStatus::Failed, context_chars)
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Scores entities against weighted categories
#[derive(Debug)]
pub struct ScoringService {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
    config: ScoringConfig,
}

impl ScoringService {
    pub fn new(
        context: Arc<ContextStore>,
        gateway: Arc<dyn ModelGateway>,
        config: ScoringConfig,
    ) -> Result<Self, DomainError> {
        validate_weights(&config.categories)?;
        Ok(Self {
            context,
            gateway,
            config,
        })
    }

    #[instrument(skip(self, entity, evidence, cancel), fields(entity_id = %entity.id))]
    pub async fn score(
        &self,
        entity: &EntityProfile,
        evidence: &str,
        cancel: &CancellationFlag,
    ) -> Result<ScoreCard, EvaluationError> {
        let run_id = Uuid::new_v4().to_string();
        let evidence: Arc<str> = Arc::from(truncate_chars(evidence, self.config.evidence_chars));

        info!(run_id = %run_id, categories = self.config.categories.len(), "Scoring started");

        let units: Vec<CategoryUnit> = self
            .config
            .categories
            .iter()
            .map(|category| CategoryUnit {
                context: self.context.clone(),
                gateway: self.gateway.clone(),
                entity_id: entity.id.clone(),
                category: category.clone(),
                evidence: evidence.clone(),
                top_k: self.config.top_k,
                min_context_chars: self.config.min_context_chars,
            })
            .collect();

        let results = fan_out(units, self.config.max_concurrent, cancel, CategoryUnit::run).await;

        let mut attempted = 0;
        let scores: Vec<CategoryScore> = results
            .into_iter()
            .zip(&self.config.categories)
            .map(|(result, category)| match result {
                UnitResult::Done(score) => {
                    attempted += 1;
                    score
                }
                UnitResult::Crashed(reason) => {
                    attempted += 1;
                    warn!(category = %category.id, reason = %reason, "Category task crashed");
                    CategoryScore::neutral(category.id.clone(), category.weight, CategoryStatus::Failed, 0)
                }
                UnitResult::Skipped => CategoryScore::neutral(
                    category.id.clone(),
                    category.weight,
                    CategoryStatus::InsufficientContext,
                    0,
                ),
            })
            .collect();

        for score in &scores {
            record_subtask(match score.status {
                CategoryStatus::Scored => "completed",
                CategoryStatus::InsufficientContext => "insufficient_context",
                CategoryStatus::Failed => "failed",
            });
        }

        if !scores.iter().any(CategoryScore::had_context) {
            record_run("scoring", "no_context");
            warn!(run_id = %run_id, attempted, "No category had usable context");
            return Err(EvaluationError::NoContextAvailable {
                entity_id: entity.id.clone(),
                attempted,
            });
        }

        let overall = round2(weighted_sum(&scores));
        let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
        let spread = std_dev(&values);
        let reasoning = self.reasoning(entity, overall, &scores, &evidence).await;

        record_run("scoring", "complete");
        info!(run_id = %run_id, overall, std_dev = spread, "Scoring complete");

        Ok(ScoreCard {
            run_id,
            entity_id: entity.id.clone(),
            overall_score: overall,
            category_scores: scores,
            std_dev: round2(spread),
            confidence: ConfidenceLevel::from_std_dev(spread),
            reasoning,
            scored_at: Utc::now(),
        })
    }

    /// Model-written memo; the deterministic memo stands in on any failure
    async fn reasoning(
        &self,
        entity: &EntityProfile,
        overall: f64,
        scores: &[CategoryScore],
        evidence: &str,
    ) -> String {
        let chunks = match self
            .context
            .query(&entity.id, REASONING_QUERY, self.config.reasoning_chunks)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Reasoning retrieval failed");
                return fallback_reasoning(&entity.name, overall, scores);
            }
        };

        let prompt = reasoning_prompt(&entity.name, overall, scores, &join_context(&chunks), evidence);
        let options = GenerationOptions::default().with_system(ANALYST_SYSTEM);

        match self.gateway.generate_text(&prompt, &options).await {
            Ok(text) => {
                let memo = strip_code_fences(&text).trim();
                if memo.is_empty() {
                    fallback_reasoning(&entity.name, overall, scores)
                } else {
                    memo.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "Reasoning generation failed, using fallback memo");
                fallback_reasoning(&entity.name, overall, scores)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::infrastructure::services::test_support::{acme, context_store, gateway, indexed_store};

    const SCORE_80: &str =
        r#"{"score": 80, "justification": "Strong evidence in the deck.", "key_factors": ["Experienced team"]}"#;
    const MEMO: &str = "### Executive Summary\nAcme Routing scores 80/100.";

    fn service(context: Arc<ContextStore>, provider: MockLlmProvider) -> (ScoringService, Arc<MockLlmProvider>) {
        let (gateway, provider) = gateway(provider);
        (
            ScoringService::new(context, gateway, ScoringConfig::default()).unwrap(),
            provider,
        )
    }

    fn scripted() -> MockLlmProvider {
        MockLlmProvider::new("mock")
            .with_response(SCORE_80)
            .when_prompt_contains("investment memo", MockReply::text(MEMO))
    }

    #[tokio::test]
    async fn test_uniform_scores() {
        let (service, provider) = service(indexed_store().await, scripted());

        let card = service.score(&acme(), "", &CancellationFlag::new()).await.unwrap();

        assert_eq!(card.overall_score, 80.0);
        assert_eq!(card.std_dev, 0.0);
        assert_eq!(card.confidence, ConfidenceLevel::High);
        assert_eq!(card.reasoning, MEMO);
        assert_eq!(card.category_scores.len(), 6);
        assert_eq!(card.category("team").unwrap().key_factors, vec!["Experienced team"]);
        assert_eq!(provider.call_count(), 7);
    }

    #[tokio::test]
    async fn test_failed_category_scores_neutral() {
        let provider = scripted().when_prompt_contains("on the market dimension", MockReply::Error("down".into()));
        let (service, _) = service(indexed_store().await, provider);

        let card = service.score(&acme(), "", &CancellationFlag::new()).await.unwrap();

        let market = card.category("market").unwrap();
        assert_eq!(market.score, 50.0);
        assert_eq!(market.status, CategoryStatus::Failed);
        assert_eq!(card.overall_score, 74.0);
        assert_eq!(card.std_dev, 11.18);
        assert_eq!(card.confidence, ConfidenceLevel::Medium);
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let provider = MockLlmProvider::new("mock")
            .with_response(r#"{"score": 140, "justification": "Off the charts", "key_factors": []}"#)
            .when_prompt_contains("investment memo", MockReply::text(MEMO));
        let (service, _) = service(indexed_store().await, provider);

        let card = service.score(&acme(), "", &CancellationFlag::new()).await.unwrap();
        assert_eq!(card.overall_score, 100.0);
    }

    #[tokio::test]
    async fn test_reasoning_falls_back_to_memo() {
        let provider = MockLlmProvider::new("mock")
            .with_response(SCORE_80)
            .when_prompt_contains("investment memo", MockReply::Error("down".into()));
        let (service, _) = service(indexed_store().await, provider);

        let card = service.score(&acme(), "", &CancellationFlag::new()).await.unwrap();

        assert_eq!(
            card.reasoning,
            fallback_reasoning("Acme Routing", 80.0, &card.category_scores)
        );
    }

    #[tokio::test]
    async fn test_no_documents_is_no_context() {
        let (service, provider) = service(context_store(), scripted());

        let err = service.score(&acme(), "", &CancellationFlag::new()).await.unwrap_err();

        assert!(matches!(err, EvaluationError::NoContextAvailable { attempted: 6, .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_unbalanced_weights_are_rejected() {
        let config = ScoringConfig {
            categories: vec![ScoringCategory::new("team", 0.7, "team")],
            ..Default::default()
        };
        let (gateway, _) = gateway(MockLlmProvider::new("mock"));
        assert!(ScoringService::new(context_store(), gateway, config).is_err());
    }
}

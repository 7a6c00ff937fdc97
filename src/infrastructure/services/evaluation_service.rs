//! Evaluation orchestrator: one concurrent sub-task per topic, reduced into one result

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::fan_out::{fan_out, UnitResult};
use super::prompts::{analysis_prompt, join_context, ANALYST_SYSTEM};
use crate::domain::context::{EntityId, EntityProfile};
use crate::domain::evaluation::{
    default_analysis_topics, insight_schema, merge_summaries, CancellationFlag, CollectedLists,
    ConfidenceLevel, ConsolidatedResult, Deduplicator, EvaluationError, InsightRecord, ListCaps,
    RunMetadata, RunState, SubTaskOutcome, SubTaskStatus, Topic,
};
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::structured::ParseStage;
use crate::domain::text::truncate_chars;
use crate::domain::DomainError;
use crate::infrastructure::context::ContextStore;
use crate::infrastructure::observability::{record_run, record_subtask};

/// Orchestrator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Chunks retrieved per topic
    pub top_k: usize,
    /// Retrieved characters below which a topic is not sent to the model
    pub min_context_chars: usize,
    /// Evidence characters included in each topic prompt
    pub evidence_chars: usize,
    /// Topics in flight at once
    pub max_concurrent: usize,
    /// Ask the model to merge paraphrased list items
    pub semantic_dedup: bool,
    pub caps: ListCaps,
    pub topics: Vec<Topic>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_context_chars: 50,
            evidence_chars: 1000,
            max_concurrent: 9,
            semantic_dedup: false,
            caps: ListCaps::default(),
            topics: default_analysis_topics(),
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.topics.is_empty() {
            return Err(DomainError::configuration("At least one analysis topic is required"));
        }
        if self.top_k == 0 {
            return Err(DomainError::configuration("evaluation.top_k must be positive"));
        }
        Ok(())
    }
}

/// Everything a single topic needs, owned so it can move into a spawned task
#[derive(Debug, Clone)]
struct TopicUnit {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
    entity_id: EntityId,
    topic: Topic,
    evidence: Arc<str>,
    top_k: usize,
    min_context_chars: usize,
}

impl TopicUnit {
    async fn run(self) -> SubTaskOutcome {
        let topic_id = self.topic.id.clone();

        let chunks = match self.context.query(&self.entity_id, &self.topic.query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(topic = %topic_id, error = %e, "Retrieval failed");
                return SubTaskOutcome::failed(topic_id, e.to_string(), 0);
            }
        };

        let context_chars: usize = chunks.iter().map(|c| c.chars().count()).sum();
        if context_chars < self.min_context_chars {
            debug!(topic = %topic_id, context_chars, "Insufficient context");
            return SubTaskOutcome::insufficient(topic_id, context_chars);
        }

        let options = GenerationOptions::structured()
            .with_system(ANALYST_SYSTEM)
            .with_context(join_context(&chunks));
        let prompt = analysis_prompt(&self.topic, &self.evidence);

        match self
            .gateway
            .generate_structured(&prompt, &insight_schema(), &options)
            .await
        {
            Ok(outcome) if outcome.stage == ParseStage::Fallback => {
                SubTaskOutcome::failed(topic_id, "model output could not be parsed", context_chars)
            }
            Ok(outcome) => {
                debug!(topic = %topic_id, stage = outcome.stage.as_str(), "Topic analyzed");
                SubTaskOutcome::completed(
                    topic_id,
                    InsightRecord::from_record(&outcome.record),
                    context_chars,
                    outcome.stage,
                )
            }
            Err(e) => {
                warn!(topic = %topic_id, error = %e, "Topic generation failed");
                SubTaskOutcome::failed(topic_id, e.to_string(), context_chars)
            }
        }
    }
}

/// Runs full evaluations of one entity
#[derive(Debug)]
pub struct EvaluationService {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
    deduplicator: Arc<dyn Deduplicator>,
    config: EvaluationConfig,
}

impl EvaluationService {
    pub fn new(
        context: Arc<ContextStore>,
        gateway: Arc<dyn ModelGateway>,
        deduplicator: Arc<dyn Deduplicator>,
        config: EvaluationConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self {
            context,
            gateway,
            deduplicator,
            config,
        })
    }

    /// Evaluate `entity` across every configured topic.
    ///
    /// Fails only with [`EvaluationError::NoContextAvailable`] when no topic succeeded.
    #[instrument(skip(self, entity, evidence, cancel), fields(entity_id = %entity.id))]
    pub async fn evaluate(
        &self,
        entity: &EntityProfile,
        evidence: &str,
        cancel: &CancellationFlag,
    ) -> Result<ConsolidatedResult, EvaluationError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let evidence = truncate_chars(evidence, self.config.evidence_chars);
        let evidence: Arc<str> = Arc::from(evidence);

        info!(run_id = %run_id, topics = self.config.topics.len(), evidence_chars = evidence.chars().count(), "Evaluation started");

        let units: Vec<TopicUnit> = self
            .config
            .topics
            .iter()
            .map(|topic| TopicUnit {
                context: self.context.clone(),
                gateway: self.gateway.clone(),
                entity_id: entity.id.clone(),
                topic: topic.clone(),
                evidence: evidence.clone(),
                top_k: self.config.top_k,
                min_context_chars: self.config.min_context_chars,
            })
            .collect();

        let results = fan_out(units, self.config.max_concurrent, cancel, TopicUnit::run).await;

        let outcomes: Vec<SubTaskOutcome> = results
            .into_iter()
            .zip(&self.config.topics)
            .map(|(result, topic)| match result {
                UnitResult::Done(outcome) => outcome,
                UnitResult::Crashed(reason) => {
                    warn!(topic = %topic.id, reason = %reason, "Topic task crashed");
                    SubTaskOutcome::failed(topic.id.clone(), reason, 0)
                }
                UnitResult::Skipped => SubTaskOutcome::skipped(topic.id.clone()),
            })
            .collect();

        for outcome in &outcomes {
            record_subtask(match outcome.status {
                SubTaskStatus::Completed => "completed",
                SubTaskStatus::InsufficientContext => "insufficient_context",
                SubTaskStatus::Failed { .. } => "failed",
                SubTaskStatus::Skipped => "skipped",
            });
        }

        let mut metadata = Self::metadata(run_id, entity.id.clone(), &outcomes, evidence.chars().count(), started_at);

        if metadata.succeeded == 0 {
            metadata.state = RunState::Failed;
            record_run("evaluation", "no_context");
            warn!(run_id = %metadata.run_id, attempted = metadata.attempted, "No topic produced a usable result");
            return Err(EvaluationError::NoContextAvailable {
                entity_id: entity.id.clone(),
                attempted: metadata.attempted,
            });
        }

        let result = self.reduce(outcomes, metadata).await;
        record_run("evaluation", "complete");
        info!(
            run_id = %result.metadata.run_id,
            succeeded = result.metadata.succeeded,
            attempted = result.metadata.attempted,
            confidence = ?result.confidence,
            "Evaluation complete"
        );

        Ok(result)
    }

    fn metadata(
        run_id: String,
        entity_id: EntityId,
        outcomes: &[SubTaskOutcome],
        evidence_chars: usize,
        started_at: chrono::DateTime<Utc>,
    ) -> RunMetadata {
        let count = |pred: fn(&SubTaskStatus) -> bool| outcomes.iter().filter(|o| pred(&o.status)).count();
        let skipped = count(|s| matches!(s, SubTaskStatus::Skipped));

        RunMetadata {
            run_id,
            entity_id,
            state: RunState::Reducing,
            attempted: outcomes.len() - skipped,
            succeeded: count(|s| matches!(s, SubTaskStatus::Completed)),
            insufficient_context: count(|s| matches!(s, SubTaskStatus::InsufficientContext)),
            failed: count(|s| matches!(s, SubTaskStatus::Failed { .. })),
            skipped,
            context_chars: outcomes.iter().map(|o| o.context_chars).sum(),
            evidence_chars,
            started_at,
            completed_at: started_at,
        }
    }

    async fn reduce(&self, outcomes: Vec<SubTaskOutcome>, mut metadata: RunMetadata) -> ConsolidatedResult {
        let lists = CollectedLists::gather(&outcomes);
        let caps = self.config.caps;
        let dedup = &self.deduplicator;

        let (key_insights, strengths, weaknesses, opportunities, risks) = tokio::join!(
            dedup.dedup("key_insights", lists.key_insights, caps.key_insights),
            dedup.dedup("strengths", lists.strengths, caps.strengths),
            dedup.dedup("weaknesses", lists.weaknesses, caps.weaknesses),
            dedup.dedup("opportunities", lists.opportunities, caps.opportunities),
            dedup.dedup("risks", lists.risks, caps.risks),
        );

        let confidence_ratio = metadata.success_ratio();
        metadata.state = RunState::Complete;
        metadata.completed_at = Utc::now();

        ConsolidatedResult {
            summary: merge_summaries(&outcomes),
            key_insights,
            strengths,
            weaknesses,
            opportunities,
            risks,
            confidence: ConfidenceLevel::from_success_ratio(confidence_ratio),
            confidence_ratio,
            sub_tasks: outcomes,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::NormalizedDeduplicator;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::infrastructure::gateway::{GatewayConfig, RateLimitedGateway, RetryPolicy};
    use crate::infrastructure::services::test_support::{acme, context_store, gateway, indexed_store};

    const INSIGHT: &str = r#"{"summary": "Acme sells routing software to freight carriers.",
        "key_insights": ["Serves regional freight carriers"],
        "strengths": ["Founders scaled logistics operations before"],
        "weaknesses": ["Small customer base so far"],
        "opportunities": [],
        "risks": ["Concentration in a cyclical industry"]}"#;

    fn service(context: Arc<ContextStore>, provider: MockLlmProvider) -> (EvaluationService, Arc<MockLlmProvider>) {
        let (gateway, provider) = gateway(provider);
        let service = EvaluationService::new(
            context,
            gateway,
            Arc::new(NormalizedDeduplicator::default()),
            EvaluationConfig::default(),
        )
        .unwrap();
        (service, provider)
    }

    /// Topic ids paired with a phrase unique to that topic's prompt
    const TOPIC_NEEDLES: [(&str, &str); 9] = [
        ("business_model", "business model"),
        ("target_market", "target customers"),
        ("competition", "competitive landscape"),
        ("team", "team background"),
        ("traction", "traction and milestones"),
        ("financials", "financial projections"),
        ("risks", "main risks"),
        ("go_to_market", "go-to-market"),
        ("innovation", "technology or product innovation"),
    ];

    fn topic_reply(topic: &str) -> MockReply {
        MockReply::text(format!(
            r#"{{"summary": "Acme {topic} analysis from the documents.",
                "key_insights": ["First finding about the {topic} topic", "Second finding about the {topic} topic"],
                "strengths": ["Strength observed in the {topic} topic"],
                "weaknesses": [], "opportunities": [], "risks": []}}"#
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_still_consolidate() {
        let failing = ["competition", "financials"];
        let mut provider = MockLlmProvider::new("mock");
        for (topic, needle) in TOPIC_NEEDLES {
            let reply = if failing.contains(&topic) {
                MockReply::RateLimited
            } else {
                topic_reply(topic)
            };
            provider = provider.when_prompt_contains(needle, reply);
        }

        let (gateway, provider) = {
            let provider = Arc::new(provider);
            let config = GatewayConfig::default()
                .with_min_interval(0)
                .with_retry(RetryPolicy::new(2).with_initial_delay(100));
            let gateway = RateLimitedGateway::new(provider.clone(), config).unwrap();
            (Arc::new(gateway) as Arc<dyn ModelGateway>, provider)
        };
        let service = EvaluationService::new(
            indexed_store().await,
            gateway,
            Arc::new(NormalizedDeduplicator::default()),
            EvaluationConfig::default(),
        )
        .unwrap();

        let result = service
            .evaluate(&acme(), "", &CancellationFlag::new())
            .await
            .unwrap();

        // 7 answered topics plus 3 rate-limited attempts for each failing one
        assert_eq!(provider.call_count(), 7 + 2 * 3);
        assert_eq!(result.metadata.attempted, 9);
        assert_eq!(result.metadata.succeeded, 7);
        assert_eq!(result.metadata.failed, 2);
        assert_eq!(result.metadata.state, RunState::Complete);
        assert_eq!(result.confidence, ConfidenceLevel::Medium);
        assert!((result.confidence_ratio - 7.0 / 9.0).abs() < 1e-9);

        // 14 distinct insights were produced; the cap keeps 10
        assert_eq!(result.key_insights.len(), 10);
        assert_eq!(result.strengths.len(), 7);
        for item in result.key_insights.iter().chain(&result.strengths) {
            assert!(
                failing.iter().all(|topic| !item.contains(&format!("the {topic} topic"))),
                "item from a failed topic: {item}"
            );
        }
        assert_eq!(result.key_insights[0], "First finding about the business_model topic");
        assert!(result.summary.starts_with("Acme business_model analysis"));

        let competition = result
            .sub_tasks
            .iter()
            .find(|o| o.topic_id == "competition")
            .unwrap();
        assert!(matches!(competition.status, SubTaskStatus::Failed { .. }));
        assert_eq!(competition.result, InsightRecord::placeholder());
        assert_eq!(result.sub_tasks[0].topic_id, "business_model");
    }

    #[tokio::test]
    async fn test_missing_documents_fail_without_model_calls() {
        let (service, provider) = service(context_store(), MockLlmProvider::new("mock").with_response(INSIGHT));

        let err = service
            .evaluate(&acme(), "", &CancellationFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluationError::NoContextAvailable { attempted: 9, .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_all_generations_failing_reports_no_context() {
        let provider = MockLlmProvider::new("mock").with_default(MockReply::Error("down".into()));
        let (service, _) = service(indexed_store().await, provider);

        let err = service
            .evaluate(&acme(), "", &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::NoContextAvailable { attempted: 9, .. }));
    }

    #[tokio::test]
    async fn test_unparseable_output_counts_as_failure() {
        let provider = MockLlmProvider::new("mock").with_response("I would rather not say.");
        let (service, _) = service(indexed_store().await, provider);

        let result = service.evaluate(&acme(), "", &CancellationFlag::new()).await;
        assert!(matches!(result, Err(EvaluationError::NoContextAvailable { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_run_dispatches_nothing() {
        let (service, provider) =
            service(indexed_store().await, MockLlmProvider::new("mock").with_response(INSIGHT));
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let err = service.evaluate(&acme(), "", &cancel).await.unwrap_err();

        assert!(matches!(err, EvaluationError::NoContextAvailable { attempted: 0, .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_evidence_is_bounded_and_recorded() {
        let (service, _) =
            service(indexed_store().await, MockLlmProvider::new("mock").with_response(INSIGHT));
        let evidence = "e".repeat(5000);

        let result = service
            .evaluate(&acme(), &evidence, &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(result.metadata.evidence_chars, 1000);
        assert_eq!(result.confidence, ConfidenceLevel::High);
        assert!(result.metadata.context_chars > 0);
    }

    #[test]
    fn test_empty_topic_list_is_rejected() {
        let config = EvaluationConfig {
            topics: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

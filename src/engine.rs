//! Engine facade: wires every component and applies quota gating to user-facing runs

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::config::{AppConfig, EmbeddingBackend};
use crate::domain::cache::Cache;
use crate::domain::context::{DocumentMetadata, EntityId, EntityProfile};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::evaluation::{
    CancellationFlag, ConsolidatedResult, Deduplicator, EvaluationError, MarketAnalysis,
    NormalizedDeduplicator, ScoreCard,
};
use crate::domain::llm::ModelGateway;
use crate::domain::quota::{Resource, SubscriptionTier, UsageStatus, UsageWindows};
use crate::domain::search::SearchProvider;
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::cache::{InMemoryCache, InMemoryCacheConfig};
use crate::infrastructure::context::ContextStore;
use crate::infrastructure::embedding::{HashingEmbeddingProvider, OpenAiEmbeddingProvider};
use crate::infrastructure::gateway::RateLimitedGateway;
use crate::infrastructure::ingestion::RecursiveChunker;
use crate::infrastructure::llm::{HttpClient, OpenAiProvider};
use crate::infrastructure::quota::{QuotaReservation, QuotaTracker};
use crate::infrastructure::search::TavilySearchProvider;
use crate::infrastructure::services::{
    Answer, EvaluationService, MarketAnalysisService, QuestionRecord, QuestionService, ScoringService,
    SemanticDeduplicator,
};
use crate::infrastructure::storage::StorageFactory;
use crate::infrastructure::validation::{EvidenceCache, EvidenceQueryPlanner, FounderExtractor};

/// Assembles an [`EvaluationEngine`] from injected collaborators.
///
/// Only the gateway and the embedder are required; storage defaults to memory, search to
/// none and the evidence cache to a fresh in-memory cache.
#[derive(Debug)]
pub struct EngineBuilder {
    gateway: Arc<dyn ModelGateway>,
    embedder: Arc<dyn EmbeddingProvider>,
    search: Option<Arc<dyn SearchProvider>>,
    cache: Option<Arc<dyn Cache>>,
    storage: StorageFactory,
    config: AppConfig,
}

impl EngineBuilder {
    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_storage(mut self, storage: StorageFactory) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Result<EvaluationEngine, DomainError> {
        let config = self.config;

        let context = Arc::new(ContextStore::new(
            self.embedder,
            Arc::new(RecursiveChunker::new()),
            self.storage.create("indexes").await?,
            config.retrieval.clone(),
        )?);

        let deduplicator: Arc<dyn Deduplicator> = if config.evaluation.semantic_dedup {
            Arc::new(SemanticDeduplicator::new(
                self.gateway.clone(),
                NormalizedDeduplicator::default(),
            ))
        } else {
            Arc::new(NormalizedDeduplicator::default())
        };

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(InMemoryCache::with_config(
                InMemoryCacheConfig::default().with_max_ttl(config.search.evidence.ttl()),
            ))
        });

        Ok(EvaluationEngine {
            profiles: self.storage.create("profiles").await?,
            evaluations: self.storage.create("evaluations").await?,
            score_cards: self.storage.create("score_cards").await?,
            market_analyses: self.storage.create("market_analyses").await?,
            question_log: self.storage.create("questions").await?,
            planner: EvidenceQueryPlanner::new(self.gateway.clone()),
            founders: FounderExtractor::new(context.clone(), self.gateway.clone()),
            evidence: EvidenceCache::new(self.search, cache, config.search.evidence.clone()),
            evaluator: EvaluationService::new(
                context.clone(),
                self.gateway.clone(),
                deduplicator,
                config.evaluation.clone(),
            )?,
            scorer: ScoringService::new(context.clone(), self.gateway.clone(), config.scoring.clone())?,
            market: MarketAnalysisService::new(context.clone(), self.gateway.clone(), config.market.clone()),
            questions: QuestionService::new(context.clone(), self.gateway, config.questions.clone()),
            quota: QuotaTracker::new(self.storage.create::<UsageWindows>("usage").await?, config.quota.clone()),
            context,
        })
    }
}

/// Calling-layer operations over one set of wired components
#[derive(Debug)]
pub struct EvaluationEngine {
    profiles: Arc<dyn Storage<EntityProfile>>,
    evaluations: Arc<dyn Storage<ConsolidatedResult>>,
    score_cards: Arc<dyn Storage<ScoreCard>>,
    market_analyses: Arc<dyn Storage<MarketAnalysis>>,
    question_log: Arc<dyn Storage<QuestionRecord>>,
    context: Arc<ContextStore>,
    planner: EvidenceQueryPlanner,
    founders: FounderExtractor,
    evidence: EvidenceCache,
    evaluator: EvaluationService,
    scorer: ScoringService,
    market: MarketAnalysisService,
    questions: QuestionService,
    quota: QuotaTracker,
}

impl EvaluationEngine {
    pub fn builder(gateway: Arc<dyn ModelGateway>, embedder: Arc<dyn EmbeddingProvider>) -> EngineBuilder {
        EngineBuilder {
            gateway,
            embedder,
            search: None,
            cache: None,
            storage: StorageFactory::in_memory(),
            config: AppConfig::default(),
        }
    }

    /// Build the reference adapters named by `config`
    pub async fn from_config(config: &AppConfig) -> Result<Self, DomainError> {
        let http = HttpClient::with_timeout(Duration::from_secs(config.llm.timeout_secs))?;

        let api_key = config.llm.api_key.clone().unwrap_or_else(|| {
            warn!("No LLM API key configured; generation calls will fail");
            String::new()
        });
        let provider = match &config.llm.base_url {
            Some(url) => OpenAiProvider::with_base_url(http.clone(), api_key, url),
            None => OpenAiProvider::new(http.clone(), api_key),
        };
        let gateway = RateLimitedGateway::new(Arc::new(provider), config.llm.gateway.clone())?;

        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            EmbeddingBackend::Hashing => Arc::new(HashingEmbeddingProvider::new(config.embedding.dimensions)),
            EmbeddingBackend::OpenAi => {
                let key = config.embedding.api_key.clone().ok_or_else(|| {
                    DomainError::configuration("embedding.api_key is required for the openai embedder")
                })?;
                let mut embedder = match &config.embedding.base_url {
                    Some(url) => OpenAiEmbeddingProvider::with_base_url(http.clone(), key, url),
                    None => OpenAiEmbeddingProvider::new(http.clone(), key),
                };
                if let Some(model) = &config.embedding.model {
                    embedder = embedder.with_model(model);
                }
                Arc::new(embedder)
            }
        };

        let mut builder = Self::builder(Arc::new(gateway), embedder)
            .with_storage(StorageFactory::connect(&config.storage).await?)
            .with_config(config.clone());

        if let Some(key) = &config.search.api_key {
            let search = match &config.search.base_url {
                Some(url) => TavilySearchProvider::with_base_url(http, key, url),
                None => TavilySearchProvider::new(http, key),
            };
            builder = builder.with_search(Arc::new(search));
        } else {
            info!("No search API key configured; external validation disabled");
        }

        builder.build().await
    }

    pub async fn register_entity(&self, profile: &EntityProfile) -> Result<(), DomainError> {
        self.profiles.put(profile).await?;
        info!(entity_id = %profile.id, name = %profile.name, "Registered entity");
        Ok(())
    }

    pub async fn entity(&self, entity_id: &EntityId) -> Result<Option<EntityProfile>, DomainError> {
        self.profiles.get(entity_id).await
    }

    pub async fn add_document(
        &self,
        entity_id: &EntityId,
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<usize, DomainError> {
        self.context.add_document(entity_id, text, metadata).await
    }

    pub async fn query(&self, entity_id: &EntityId, query: &str, k: usize) -> Result<Arc<Vec<String>>, DomainError> {
        self.context.query(entity_id, query, k).await
    }

    pub async fn invalidate(&self, entity_id: &EntityId) -> Result<(), DomainError> {
        self.context.invalidate(entity_id).await
    }

    /// Remove the entity's index, cached queries and profile. Returns whether anything existed.
    pub async fn delete_entity(&self, entity_id: &EntityId) -> Result<bool, DomainError> {
        let indexed = self.context.delete_entity(entity_id).await?;
        let profiled = self.profiles.delete(entity_id).await?;
        Ok(indexed || profiled)
    }

    /// Evaluate an entity without quota gating
    #[instrument(skip(self, cancel))]
    pub async fn run_evaluation(
        &self,
        entity_id: &EntityId,
        cancel: &CancellationFlag,
    ) -> Result<ConsolidatedResult, EvaluationError> {
        let profile = self.require_entity(entity_id).await?;
        let evidence = self.gather_evidence(&profile, &[]).await;

        let result = self.evaluator.evaluate(&profile, &evidence, cancel).await?;
        self.evaluations.put(&result).await?;
        Ok(result)
    }

    /// Score an entity without quota gating.
    ///
    /// When search is configured, founder names read from the documents steer the
    /// evidence queries toward the team's track record.
    #[instrument(skip(self, cancel))]
    pub async fn run_scoring(
        &self,
        entity_id: &EntityId,
        cancel: &CancellationFlag,
    ) -> Result<ScoreCard, EvaluationError> {
        let profile = self.require_entity(entity_id).await?;
        let founders = if self.evidence.is_enabled() {
            self.founders.extract(entity_id).await
        } else {
            Vec::new()
        };
        let evidence = self.gather_evidence(&profile, &founders).await;

        let card = self.scorer.score(&profile, &evidence, cancel).await?;
        self.score_cards.put(&card).await?;
        Ok(card)
    }

    /// Compare the entity's claimed market size with web-validated figures
    #[instrument(skip(self))]
    pub async fn run_market_analysis(&self, entity_id: &EntityId) -> Result<MarketAnalysis, EvaluationError> {
        let profile = self.require_entity(entity_id).await?;
        let claimed = self.market.claimed_market(&profile).await;

        let search_profile = MarketAnalysisService::search_profile(&profile, &claimed);
        let evidence = self.gather_evidence(&search_profile, &[]).await;

        let analysis = self.market.analyze(&profile, claimed, &evidence).await;
        self.market_analyses.put(&analysis).await?;
        Ok(analysis)
    }

    /// Stored market analyses of an entity, newest first
    pub async fn market_analyses(&self, entity_id: &EntityId) -> Result<Vec<MarketAnalysis>, DomainError> {
        let mut analyses: Vec<MarketAnalysis> = self
            .market_analyses
            .list()
            .await?
            .into_iter()
            .filter(|a| &a.entity_id == entity_id)
            .collect();
        analyses.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        Ok(analyses)
    }

    pub async fn check_and_reserve(
        &self,
        user_id: &str,
        resource: &Resource,
    ) -> Result<QuotaReservation, EvaluationError> {
        self.quota.check_and_reserve(user_id, resource).await
    }

    /// Count a reserved operation once it has succeeded
    pub async fn commit(&self, reservation: QuotaReservation) -> Result<UsageWindows, DomainError> {
        self.quota.commit(reservation).await
    }

    pub async fn record_consumption(&self, user_id: &str, resource: &Resource) -> Result<UsageWindows, DomainError> {
        self.quota.record_consumption(user_id, resource).await
    }

    /// Quota-gated evaluation; usage is counted only when the run completes
    pub async fn evaluate_for(
        &self,
        user_id: &str,
        entity_id: &EntityId,
        cancel: &CancellationFlag,
    ) -> Result<ConsolidatedResult, EvaluationError> {
        let reservation = self.quota.check_and_reserve(user_id, &Resource::Evaluation).await?;

        let result = self.run_evaluation(entity_id, cancel).await?;
        self.quota.commit(reservation).await?;
        Ok(result)
    }

    /// Quota-gated scoring; counted against the same evaluation windows
    pub async fn score_for(
        &self,
        user_id: &str,
        entity_id: &EntityId,
        cancel: &CancellationFlag,
    ) -> Result<ScoreCard, EvaluationError> {
        let reservation = self.quota.check_and_reserve(user_id, &Resource::Evaluation).await?;

        let card = self.run_scoring(entity_id, cancel).await?;
        self.quota.commit(reservation).await?;
        Ok(card)
    }

    /// Answer a question about a stored evaluation of `entity_id`.
    ///
    /// Every answer is appended to the evaluation's history; fallback answers are
    /// not counted against the question quota.
    #[instrument(skip(self, question))]
    pub async fn ask_question(
        &self,
        user_id: &str,
        entity_id: &EntityId,
        evaluation_id: &str,
        question: &str,
    ) -> Result<Answer, EvaluationError> {
        let reservation = self
            .quota
            .check_and_reserve(user_id, &Resource::question_on(evaluation_id))
            .await?;

        let evaluation = self
            .evaluations
            .get(&evaluation_id.to_string())
            .await?
            .filter(|e| &e.metadata.entity_id == entity_id)
            .ok_or_else(|| {
                DomainError::not_found(format!("Evaluation '{}' of entity '{}'", evaluation_id, entity_id))
            })?;
        let scores = self.latest_score_card(entity_id).await?;

        let answer = self.questions.answer(&evaluation, scores.as_ref(), question).await?;
        self.question_log
            .put(&QuestionRecord::new(&evaluation, user_id, &answer))
            .await?;
        if !answer.fallback {
            self.quota.commit(reservation).await?;
        }
        Ok(answer)
    }

    /// Questions asked about an evaluation, oldest first
    pub async fn question_history(&self, evaluation_id: &str) -> Result<Vec<QuestionRecord>, DomainError> {
        let mut history: Vec<QuestionRecord> = self
            .question_log
            .list()
            .await?
            .into_iter()
            .filter(|q| q.evaluation_id == evaluation_id)
            .collect();
        history.sort_by(|a, b| a.asked_at.cmp(&b.asked_at).then_with(|| a.id.cmp(&b.id)));
        Ok(history)
    }

    pub async fn evaluation(&self, evaluation_id: &str) -> Result<Option<ConsolidatedResult>, DomainError> {
        self.evaluations.get(&evaluation_id.to_string()).await
    }

    pub async fn usage_status(&self, user_id: &str) -> Result<UsageStatus, DomainError> {
        self.quota.status(user_id).await
    }

    pub async fn set_tier(&self, user_id: &str, tier: SubscriptionTier) -> Result<UsageWindows, DomainError> {
        self.quota.set_tier(user_id, tier).await
    }

    async fn require_entity(&self, entity_id: &EntityId) -> Result<EntityProfile, EvaluationError> {
        self.profiles
            .get(entity_id)
            .await?
            .ok_or_else(|| EvaluationError::EntityNotFound(entity_id.clone()))
    }

    async fn latest_score_card(&self, entity_id: &EntityId) -> Result<Option<ScoreCard>, DomainError> {
        Ok(self
            .score_cards
            .list()
            .await?
            .into_iter()
            .filter(|card| &card.entity_id == entity_id)
            .max_by_key(|card| card.scored_at))
    }

    /// Planned web-search evidence; empty when search is not configured
    async fn gather_evidence(&self, profile: &EntityProfile, founders: &[String]) -> String {
        if !self.evidence.is_enabled() {
            return String::new();
        }

        let queries = self.planner.plan(profile, founders).await;
        self.evidence.lookup(&queries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::domain::evaluation::{ConfidenceLevel, SizingVerdict};
    use crate::domain::quota::QuotaKind;
    use crate::domain::search::{MockSearchProvider, SearchHit};
    use crate::infrastructure::gateway::{GatewayConfig, RetryPolicy};

    const PITCH: &str = "Acme builds routing software for regional freight carriers.\n\n\
        The founding team previously scaled logistics operations at two carriers and has \
        twenty years of combined experience.\n\n\
        Revenue reached 1.2 million dollars last year with forty paying customers and \
        monthly growth of eight percent.";

    const INSIGHT: &str = r#"{"summary": "Acme sells routing software to freight carriers.",
        "key_insights": ["Forty paying customers after one year"],
        "strengths": ["Founders scaled logistics operations before"],
        "weaknesses": [], "opportunities": [], "risks": []}"#;

    const ANSWER: &str = "Acme reports forty paying customers in the documents.";

    struct Fixture {
        engine: EvaluationEngine,
        provider: Arc<MockLlmProvider>,
    }

    async fn fixture(provider: MockLlmProvider, search: Option<Arc<MockSearchProvider>>) -> Fixture {
        let provider = Arc::new(provider);
        let gateway = RateLimitedGateway::new(
            provider.clone(),
            GatewayConfig::default()
                .with_min_interval(0)
                .with_retry(RetryPolicy::new(0)),
        )
        .unwrap();

        let mut builder = EvaluationEngine::builder(Arc::new(gateway), Arc::new(MockEmbeddingProvider::new(128)));
        if let Some(search) = search {
            builder = builder.with_search(search);
        }

        Fixture {
            engine: builder.build().await.unwrap(),
            provider,
        }
    }

    fn scripted() -> MockLlmProvider {
        MockLlmProvider::new("mock")
            .with_response(INSIGHT)
            .when_prompt_contains("USER'S QUESTION", MockReply::text(ANSWER))
    }

    fn acme() -> EntityId {
        EntityId::new("acme").unwrap()
    }

    async fn seeded(provider: MockLlmProvider) -> Fixture {
        let f = fixture(provider, None).await;
        f.engine
            .register_entity(&EntityProfile::new(acme(), "Acme Routing").with_industry("logistics"))
            .await
            .unwrap();
        f.engine
            .add_document(&acme(), PITCH, DocumentMetadata::new().with_source_id("deck"))
            .await
            .unwrap();
        f
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let f = fixture(scripted(), None).await;
        let err = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_evaluate_for_records_usage_and_persists() {
        let f = seeded(scripted()).await;

        let result = f
            .engine
            .evaluate_for("user-1", &acme(), &CancellationFlag::new())
            .await
            .unwrap();

        let stored = f.engine.evaluation(&result.metadata.run_id).await.unwrap();
        assert_eq!(stored.as_ref(), Some(&result));

        let status = f.engine.usage_status("user-1").await.unwrap();
        assert_eq!(status.evaluations.window(QuotaKind::Daily).unwrap().current, 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_not_counted() {
        let f = fixture(scripted(), None).await;
        f.engine
            .register_entity(&EntityProfile::new(acme(), "Acme Routing"))
            .await
            .unwrap();

        let err = f
            .engine
            .evaluate_for("user-1", &acme(), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::NoContextAvailable { .. }));

        let status = f.engine.usage_status("user-1").await.unwrap();
        assert_eq!(status.evaluations.window(QuotaKind::Daily).unwrap().current, 0);
    }

    #[tokio::test]
    async fn test_exhausted_quota_blocks_before_any_model_call() {
        let f = seeded(scripted()).await;
        for _ in 0..10 {
            f.engine
                .record_consumption("user-1", &Resource::Evaluation)
                .await
                .unwrap();
        }

        let err = f
            .engine
            .evaluate_for("user-1", &acme(), &CancellationFlag::new())
            .await
            .unwrap_err();

        match err {
            EvaluationError::QuotaExceeded(exceeded) => {
                assert_eq!(exceeded.kind, QuotaKind::Daily);
                assert_eq!(exceeded.current, 10);
                assert_eq!(exceeded.limit, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_the_daily_limit() {
        let f = seeded(scripted()).await;
        for _ in 0..9 {
            f.engine
                .record_consumption("user-1", &Resource::Evaluation)
                .await
                .unwrap();
        }

        let cancel = CancellationFlag::new();
        let acme = acme();
        let outcomes = futures::future::join_all(
            (0..3).map(|_| f.engine.evaluate_for("user-1", &acme, &cancel)),
        )
        .await;

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| matches!(e, EvaluationError::QuotaExceeded(_))));

        let status = f.engine.usage_status("user-1").await.unwrap();
        assert_eq!(status.evaluations.window(QuotaKind::Daily).unwrap().current, 10);
    }

    #[tokio::test]
    async fn test_failed_run_releases_its_reservation() {
        let f = fixture(scripted(), None).await;
        f.engine
            .register_entity(&EntityProfile::new(acme(), "Acme Routing"))
            .await
            .unwrap();
        for _ in 0..9 {
            f.engine
                .record_consumption("user-1", &Resource::Evaluation)
                .await
                .unwrap();
        }

        let err = f
            .engine
            .evaluate_for("user-1", &acme(), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::NoContextAvailable { .. }));

        let reservation = f
            .engine
            .check_and_reserve("user-1", &Resource::Evaluation)
            .await
            .unwrap();
        f.engine.commit(reservation).await.unwrap();
    }

    #[tokio::test]
    async fn test_questions_are_limited_per_evaluation() {
        let f = seeded(scripted()).await;
        let run = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap();
        let run_id = run.metadata.run_id;

        for _ in 0..3 {
            let answer = f
                .engine
                .ask_question("user-1", &acme(), &run_id, "How many customers?")
                .await
                .unwrap();
            assert_eq!(answer.answer, ANSWER);
        }

        let err = f
            .engine
            .ask_question("user-1", &acme(), &run_id, "And revenue?")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::QuotaExceeded(ref e) if e.kind == QuotaKind::PerEvaluation
        ));
    }

    #[tokio::test]
    async fn test_fallback_answers_are_free() {
        let provider = MockLlmProvider::new("mock")
            .with_response(INSIGHT)
            .when_prompt_contains("USER'S QUESTION", MockReply::Error("down".into()));
        let f = seeded(provider).await;
        let run = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap();

        let answer = f
            .engine
            .ask_question("user-1", &acme(), &run.metadata.run_id, "How many customers?")
            .await
            .unwrap();

        assert!(answer.fallback);
        let status = f.engine.usage_status("user-1").await.unwrap();
        assert_eq!(status.questions.window(QuotaKind::Daily).unwrap().current, 0);
    }

    #[tokio::test]
    async fn test_question_about_other_entity_is_not_found() {
        let f = seeded(scripted()).await;
        let run = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap();

        let other = EntityId::new("globex").unwrap();
        let err = f
            .engine
            .ask_question("user-1", &other, &run.metadata.run_id, "Who are they?")
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Domain(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_entity_removes_index_and_profile() {
        let f = seeded(scripted()).await;
        assert!(!f.engine.query(&acme(), "revenue", 3).await.unwrap().is_empty());

        assert!(f.engine.delete_entity(&acme()).await.unwrap());

        assert!(f.engine.query(&acme(), "revenue", 3).await.unwrap().is_empty());
        assert!(f.engine.entity(&acme()).await.unwrap().is_none());
        assert!(!f.engine.delete_entity(&acme()).await.unwrap());
    }

    #[tokio::test]
    async fn test_evidence_feeds_the_run() {
        let search = Arc::new(MockSearchProvider::new().with_results(
            "Acme Routing competitors",
            vec![SearchHit::new("Freight software", "https://example.com/a", "Competitors include...", 0.9)],
        ));
        let f = fixture(scripted(), Some(search.clone())).await;
        f.engine
            .register_entity(&EntityProfile::new(acme(), "Acme Routing").with_industry("logistics"))
            .await
            .unwrap();
        f.engine.add_document(&acme(), PITCH, DocumentMetadata::new()).await.unwrap();

        let result = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(result.metadata.evidence_chars > 0);
        assert_eq!(search.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scoring_evidence_checks_founders() {
        let search = Arc::new(MockSearchProvider::new());
        let provider = MockLlmProvider::new("mock")
            .with_response(INSIGHT)
            .when_prompt_contains("founder_names", MockReply::text(r#"{"founder_names": ["Jane Doe"]}"#))
            .when_prompt_contains("dimension", MockReply::text(r#"{"score": 60, "justification": "ok", "key_factors": []}"#))
            .when_prompt_contains("investment memo", MockReply::text("Reasonable company."));
        let f = fixture(provider, Some(search.clone())).await;
        f.engine
            .register_entity(&EntityProfile::new(acme(), "Acme Routing").with_industry("logistics"))
            .await
            .unwrap();
        f.engine.add_document(&acme(), PITCH, DocumentMetadata::new()).await.unwrap();

        f.engine
            .run_scoring(&acme(), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(search
            .queries_seen()
            .contains(&"Jane Doe Acme Routing founder".to_string()));
    }

    #[tokio::test]
    async fn test_market_analysis_is_validated_and_stored() {
        let search = Arc::new(MockSearchProvider::new().with_results(
            "global freight software market size",
            vec![SearchHit::new("Freight software market", "https://example.com/m", "Valued at $3.2B in 2024", 0.9)],
        ));
        let provider = MockLlmProvider::new("mock")
            .with_response(INSIGHT)
            .when_prompt_contains(
                "Extract the market size claims",
                MockReply::text(r#"{"tam": 40, "sam": 8, "som": 0.4, "tam_description": "global freight software"}"#),
            )
            .when_prompt_contains(
                "Using only the search results",
                MockReply::text(r#"{"tam": 4, "sam": 1.2, "som": 0.12, "source": "Freight Tech Report"}"#),
            );
        let f = fixture(provider, Some(search.clone())).await;
        f.engine
            .register_entity(&EntityProfile::new(acme(), "Acme Routing").with_industry("logistics"))
            .await
            .unwrap();
        f.engine.add_document(&acme(), PITCH, DocumentMetadata::new()).await.unwrap();

        let analysis = f.engine.run_market_analysis(&acme()).await.unwrap();

        assert_eq!(analysis.inflation_ratio, Some(10.0));
        assert_eq!(analysis.verdict, SizingVerdict::Overstated);
        assert_eq!(analysis.validated.source, "Freight Tech Report");
        assert!(search
            .queries_seen()
            .contains(&"global freight software market size".to_string()));

        let stored = f.engine.market_analyses(&acme()).await.unwrap();
        assert_eq!(stored, vec![analysis]);
        assert!(f
            .engine
            .market_analyses(&EntityId::new("globex").unwrap())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_market_analysis_without_search_is_unverified() {
        let f = seeded(scripted()).await;

        let analysis = f.engine.run_market_analysis(&acme()).await.unwrap();

        assert_eq!(analysis.verdict, SizingVerdict::Unverified);
        assert_eq!(analysis.confidence, ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn test_question_history_is_kept_in_order() {
        let provider = MockLlmProvider::new("mock")
            .with_response(INSIGHT)
            .when_prompt_contains("And revenue?", MockReply::Error("down".into()))
            .when_prompt_contains("USER'S QUESTION", MockReply::text(ANSWER));
        let f = seeded(provider).await;
        let run = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap();
        let run_id = run.metadata.run_id;

        f.engine
            .ask_question("user-1", &acme(), &run_id, "How many customers?")
            .await
            .unwrap();
        f.engine
            .ask_question("user-2", &acme(), &run_id, "And revenue?")
            .await
            .unwrap();

        let history = f.engine.question_history(&run_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "How many customers?");
        assert_eq!(history[0].answer, ANSWER);
        assert_eq!(history[0].user_id, "user-1");
        assert!(!history[0].fallback);
        assert_eq!(history[1].question, "And revenue?");
        assert!(history[1].fallback);
        assert!(history.iter().all(|q| q.entity_id == acme()));

        assert!(f.engine.question_history("other-run").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scoring_is_persisted_and_used_for_questions() {
        let provider = MockLlmProvider::new("mock")
            .with_response(INSIGHT)
            .when_prompt_contains("dimension", MockReply::text(r#"{"score": 70, "justification": "ok", "key_factors": []}"#))
            .when_prompt_contains("investment memo", MockReply::text("Solid company overall."))
            .when_prompt_contains("Overall: 70/100", MockReply::text(ANSWER));
        let f = seeded(provider).await;

        let card = f
            .engine
            .score_for("user-1", &acme(), &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(card.overall_score, 70.0);

        let run = f
            .engine
            .run_evaluation(&acme(), &CancellationFlag::new())
            .await
            .unwrap();
        let answer = f
            .engine
            .ask_question("user-1", &acme(), &run.metadata.run_id, "Why 70?")
            .await
            .unwrap();
        assert_eq!(answer.answer, ANSWER);
    }
}

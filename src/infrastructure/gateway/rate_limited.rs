//! Model gateway with a concurrency cap, dispatch spacing, backoff and model fallback

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::pacer::DispatchPacer;
use super::retry::RetryPolicy;
use crate::domain::llm::{GenerationOptions, LlmProvider, LlmRequest, ModelGateway};
use crate::domain::structured::{ParseOutcome, RecordSchema, StructuredParser};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_gateway_retry, record_parse_degraded};

/// Gateway settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Models tried in order; the first success wins
    pub models: Vec<String>,
    /// Calls allowed in flight at once across the process
    pub max_concurrent: usize,
    /// Minimum spacing between two dispatches
    pub min_interval_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            models: vec!["gpt-4o-mini".to_string()],
            max_concurrent: 5,
            min_interval_ms: 200,
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_min_interval(mut self, interval_ms: u64) -> Self {
        self.min_interval_ms = interval_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.models.iter().all(|m| m.trim().is_empty()) {
            return Err(DomainError::configuration(
                "Gateway needs at least one model",
            ));
        }
        if self.max_concurrent == 0 {
            return Err(DomainError::configuration(
                "Gateway max_concurrent must be positive",
            ));
        }
        Ok(())
    }
}

/// [`ModelGateway`] over a single provider with an ordered model fallback chain
#[derive(Debug)]
pub struct RateLimitedGateway {
    provider: Arc<dyn LlmProvider>,
    models: Vec<String>,
    permits: Semaphore,
    pacer: DispatchPacer,
    retry: RetryPolicy,
    parser: StructuredParser,
}

impl RateLimitedGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GatewayConfig) -> Result<Self, DomainError> {
        config.validate()?;

        Ok(Self {
            provider,
            models: config
                .models
                .into_iter()
                .filter(|m| !m.trim().is_empty())
                .collect(),
            permits: Semaphore::new(config.max_concurrent),
            pacer: DispatchPacer::new(Duration::from_millis(config.min_interval_ms)),
            retry: config.retry,
            parser: StructuredParser::default(),
        })
    }

    pub fn with_parser(mut self, parser: StructuredParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn build_request(prompt: String, options: &GenerationOptions, json: bool) -> LlmRequest {
        let mut builder = LlmRequest::builder();
        if let Some(system) = &options.system {
            builder = builder.system(system.clone());
        }
        builder = builder
            .user(prompt)
            .temperature(options.temperature)
            .max_tokens(options.max_tokens);
        if json {
            builder = builder.json_object();
        }
        builder.build()
    }

    /// Walk the model chain until one model answers with non-empty text
    async fn complete(&self, request: LlmRequest) -> Result<String, DomainError> {
        let mut attempts = 0u32;
        let mut last_error = String::from("no models configured");

        for model in &self.models {
            for attempt in 0..self.retry.max_attempts() {
                if attempt > 0 {
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    record_gateway_retry(model);
                    debug!(model = %model, attempt, delay_ms = delay.as_millis() as u64, "Backing off after rate limit");
                    tokio::time::sleep(delay).await;
                }

                attempts += 1;
                match self.dispatch(model, request.clone()).await {
                    Ok(text) if !text.trim().is_empty() => return Ok(text),
                    Ok(_) => {
                        warn!(model = %model, "Model returned an empty response");
                        last_error = format!("{}: empty response", model);
                        break;
                    }
                    Err(e) if e.is_rate_limited() => {
                        last_error = format!("{}: {}", model, e);
                    }
                    Err(e) => {
                        warn!(model = %model, error = %e, "Model call failed, trying next model");
                        last_error = format!("{}: {}", model, e);
                        break;
                    }
                }
            }
        }

        Err(DomainError::generation_failed(attempts, last_error))
    }

    async fn dispatch(&self, model: &str, request: LlmRequest) -> Result<String, DomainError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DomainError::internal("Gateway is shut down"))?;
        self.pacer.wait().await;

        let response = self.provider.chat(model, request).await?;
        Ok(response.content().to_string())
    }
}

#[async_trait]
impl ModelGateway for RateLimitedGateway {
    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, DomainError> {
        let request = Self::build_request(options.render_prompt(prompt), options, false);
        self.complete(request).await
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &RecordSchema,
        options: &GenerationOptions,
    ) -> Result<ParseOutcome, DomainError> {
        let prompt = format!(
            "{}\n\nRespond with a single JSON object in exactly this shape:\n{}",
            options.render_prompt(prompt),
            schema.json_template()
        );
        let request = Self::build_request(prompt, options, true);
        let raw = self.complete(request).await?;

        let outcome = self.parser.parse(&raw, schema);
        if outcome.is_degraded() {
            warn!(stage = outcome.stage.as_str(), "Structured output needed a degraded parse");
            record_parse_degraded(outcome.stage);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::domain::structured::{FieldSpec, ParseStage};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2)
            .with_initial_delay(100)
            .with_max_delay(1000)
            .with_jitter(0.0)
    }

    fn config(models: &[&str]) -> GatewayConfig {
        GatewayConfig::default()
            .with_models(models.iter().map(|m| m.to_string()).collect())
            .with_min_interval(0)
            .with_retry(policy())
    }

    fn gateway(provider: &Arc<MockLlmProvider>, config: GatewayConfig) -> RateLimitedGateway {
        RateLimitedGateway::new(provider.clone(), config).unwrap()
    }

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![FieldSpec::text("summary"), FieldSpec::number("score")])
    }

    #[test]
    fn test_config_validation() {
        assert!(GatewayConfig::default().validate().is_ok());
        assert!(GatewayConfig::default().with_models(vec![]).validate().is_err());
        assert!(GatewayConfig::default().with_max_concurrent(0).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_text() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_response("Hello"));
        let gateway = gateway(&provider, config(&["m1"]));

        let text = gateway
            .generate_text("Hi", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_same_model_with_backoff() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_sequence(vec![
            MockReply::RateLimited,
            MockReply::RateLimited,
            MockReply::text("finally"),
        ]));
        let gateway = gateway(&provider, config(&["m1", "m2"]));
        let start = Instant::now();

        let text = gateway
            .generate_text("Hi", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "finally");
        let log = provider.call_log();
        assert!(log.iter().all(|(model, _)| model == "m1"));
        assert_eq!(log.len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_rate_limits_fall_through_to_next_model() {
        let provider = Arc::new(
            MockLlmProvider::new("mock")
                .with_model_reply("primary", MockReply::RateLimited)
                .with_model_reply("backup", MockReply::text("from backup")),
        );
        let gateway = gateway(&provider, config(&["primary", "backup"]));

        let text = gateway
            .generate_text("Hi", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "from backup");
        let models: Vec<String> = provider.call_log().into_iter().map(|(m, _)| m).collect();
        assert_eq!(models, vec!["primary", "primary", "primary", "backup"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_moves_on_without_backoff() {
        let provider = Arc::new(
            MockLlmProvider::new("mock")
                .with_model_reply("broken", MockReply::Error("HTTP 500".into()))
                .with_model_reply("healthy", MockReply::text("ok")),
        );
        let gateway = gateway(&provider, config(&["broken", "healthy"]));
        let start = Instant::now();

        let text = gateway
            .generate_text("Hi", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "ok");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_a_failure() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_response("   "));
        let gateway = gateway(&provider, config(&["m1"]));

        let err = gateway
            .generate_text("Hi", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::GenerationFailed { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_all_attempts() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_default(MockReply::RateLimited));
        let gateway = gateway(&provider, config(&["m1", "m2"]));

        let err = gateway
            .generate_text("Hi", &GenerationOptions::default())
            .await
            .unwrap_err();

        match err {
            DomainError::GenerationFailed { attempts, message } => {
                assert_eq!(attempts, 6);
                assert!(message.starts_with("m2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_capped() {
        let provider = Arc::new(
            MockLlmProvider::new("mock")
                .with_response("done")
                .with_delay(Duration::from_millis(100)),
        );
        let gateway = Arc::new(gateway(&provider, config(&["m1"]).with_max_concurrent(2)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .generate_text(&format!("q{}", i), &GenerationOptions::default())
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert_eq!(result.unwrap().unwrap(), "done");
        }
        assert_eq!(provider.call_count(), 8);
        assert_eq!(provider.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_are_spaced() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_response("done"));
        let gateway = Arc::new(gateway(&provider, config(&["m1"]).with_min_interval(250)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway.generate_text("q", &GenerationOptions::default()).await
                })
            })
            .collect();
        futures::future::join_all(handles).await;

        let mut instants: Vec<Instant> = provider.call_log().into_iter().map(|(_, t)| t).collect();
        instants.sort();
        for pair in instants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_structured_direct() {
        let provider = Arc::new(
            MockLlmProvider::new("mock")
                .when_prompt_contains("\"score\"", MockReply::text(r#"{"summary": "Solid", "score": 72}"#)),
        );
        let gateway = gateway(&provider, config(&["m1"]));

        let outcome = gateway
            .generate_structured("Rate it", &schema(), &GenerationOptions::structured())
            .await
            .unwrap();

        assert_eq!(outcome.stage, ParseStage::Direct);
        assert_eq!(outcome.record.text("summary"), Some("Solid"));
        assert_eq!(outcome.record.number("score"), Some(72.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_structured_prose_degrades_without_error() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_response("I cannot answer that."));
        let gateway = gateway(&provider, config(&["m1"]));

        let outcome = gateway
            .generate_structured("Rate it", &schema(), &GenerationOptions::structured())
            .await
            .unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(outcome.stage, ParseStage::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_is_rendered_into_prompt() {
        let provider = Arc::new(
            MockLlmProvider::new("mock")
                .when_prompt_contains("Context:\nAcme sells rockets", MockReply::text("seen"))
                .with_response("missing"),
        );
        let gateway = gateway(&provider, config(&["m1"]));
        let options = GenerationOptions::default()
            .with_system("You are an analyst")
            .with_context("Acme sells rockets");

        let text = gateway.generate_text("Summarize", &options).await.unwrap();
        assert_eq!(text, "seen");
    }
}

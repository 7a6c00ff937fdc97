//! Model-assisted dedup layered over normalized dedup

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::prompts::dedup_prompt;
use crate::domain::evaluation::{Deduplicator, NormalizedDeduplicator};
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::structured::strip_code_fences;

/// Merges paraphrased list items with one extra model call per list.
///
/// Normalized dedup runs first; the model only picks which survivors to keep. Any
/// failure falls back to the normalized result.
#[derive(Debug)]
pub struct SemanticDeduplicator {
    gateway: Arc<dyn ModelGateway>,
    baseline: NormalizedDeduplicator,
}

impl SemanticDeduplicator {
    pub fn new(gateway: Arc<dyn ModelGateway>, baseline: NormalizedDeduplicator) -> Self {
        Self { gateway, baseline }
    }

    /// 1-based indices into `items`, in the model's order, without repeats
    fn parse_selection(raw: &str, items: &[String]) -> Option<Vec<String>> {
        let values: Vec<serde_json::Value> = serde_json::from_str(strip_code_fences(raw)).ok()?;
        let mut seen = HashSet::new();

        let kept: Vec<String> = values
            .iter()
            .filter_map(|v| v.as_u64())
            .filter_map(|n| usize::try_from(n).ok())
            .filter(|&n| n >= 1 && n <= items.len() && seen.insert(n))
            .map(|n| items[n - 1].clone())
            .collect();

        (!kept.is_empty()).then_some(kept)
    }
}

#[async_trait]
impl Deduplicator for SemanticDeduplicator {
    async fn dedup(&self, label: &str, items: Vec<String>, cap: usize) -> Vec<String> {
        let unique = self.baseline.dedup(label, items, usize::MAX).await;
        if unique.len() <= 1 {
            return unique.into_iter().take(cap).collect();
        }

        let options = GenerationOptions::structured().with_max_tokens(256);
        let selected = match self
            .gateway
            .generate_text(&dedup_prompt(label, &unique), &options)
            .await
        {
            Ok(raw) => Self::parse_selection(&raw, &unique),
            Err(e) => {
                warn!(label = %label, error = %e, "Semantic dedup failed, keeping normalized list");
                None
            }
        };

        let mut result = match selected {
            Some(kept) => {
                debug!(label = %label, before = unique.len(), after = kept.len(), "Semantic dedup applied");
                kept
            }
            None => unique,
        };
        result.truncate(cap);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::infrastructure::gateway::{GatewayConfig, RateLimitedGateway, RetryPolicy};

    fn dedup(provider: MockLlmProvider) -> (SemanticDeduplicator, Arc<MockLlmProvider>) {
        let provider = Arc::new(provider);
        let config = GatewayConfig::default()
            .with_min_interval(0)
            .with_retry(RetryPolicy::new(0));
        let gateway = RateLimitedGateway::new(provider.clone(), config).unwrap();
        (
            SemanticDeduplicator::new(Arc::new(gateway), NormalizedDeduplicator::default()),
            provider,
        )
    }

    fn items() -> Vec<String> {
        vec![
            "Experienced founding team".to_string(),
            "Founders have deep experience".to_string(),
            "Growing enterprise pipeline".to_string(),
            "experienced founding team.".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_model_selection_is_applied() {
        let (dedup, _) = dedup(MockLlmProvider::new("mock").with_response("[3, 1, 3, 9]"));
        let result = dedup.dedup("strengths", items(), 8).await;
        assert_eq!(result, vec!["Growing enterprise pipeline", "Experienced founding team"]);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_normalized() {
        let (dedup, _) =
            dedup(MockLlmProvider::new("mock").with_default(MockReply::Error("down".into())));
        let result = dedup.dedup("strengths", items(), 8).await;
        assert_eq!(
            result,
            vec![
                "Experienced founding team",
                "Founders have deep experience",
                "Growing enterprise pipeline"
            ]
        );
    }

    #[tokio::test]
    async fn test_unparseable_selection_falls_back() {
        let (dedup, _) = dedup(MockLlmProvider::new("mock").with_response("keep them all"));
        assert_eq!(dedup.dedup("strengths", items(), 2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_single_item_skips_model() {
        let (dedup, provider) = dedup(MockLlmProvider::new("mock").with_response("[1]"));
        let result = dedup
            .dedup("risks", vec!["Regulatory exposure in the EU".to_string()], 8)
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(provider.call_count(), 0);
    }
}

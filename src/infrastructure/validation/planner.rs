//! Web-search queries that corroborate an entity's claims

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::context::EntityProfile;
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::structured::strip_code_fences;

const MIN_QUERIES: usize = 2;
const MAX_QUERIES: usize = 5;

/// Asks the model for search queries, falling back to fixed templates
#[derive(Debug, Clone)]
pub struct EvidenceQueryPlanner {
    gateway: Arc<dyn ModelGateway>,
}

impl EvidenceQueryPlanner {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Queries for `profile`; `founders` adds team-reputation checks when known
    pub async fn plan(&self, profile: &EntityProfile, founders: &[String]) -> Vec<String> {
        let options = GenerationOptions::structured().with_context(Self::context(profile, founders));

        match self.gateway.generate_text(&Self::prompt(profile), &options).await {
            Ok(raw) => match Self::parse_queries(&raw) {
                Some(queries) => {
                    debug!(count = queries.len(), entity_id = %profile.id, "Planned evidence queries");
                    queries
                }
                None => {
                    warn!(entity_id = %profile.id, "Unusable query plan, using templates");
                    Self::fallback_queries(profile, founders)
                }
            },
            Err(e) => {
                warn!(entity_id = %profile.id, error = %e, "Query planning failed, using templates");
                Self::fallback_queries(profile, founders)
            }
        }
    }

    pub fn fallback_queries(profile: &EntityProfile, founders: &[String]) -> Vec<String> {
        let market = match profile.industry.as_deref().map(str::trim) {
            Some(industry) if !industry.is_empty() => format!("{} market size", industry),
            _ => format!("{} market", profile.name),
        };

        let mut queries = vec![
            format!("{} competitors", profile.name),
            market,
            format!("{} news reviews", profile.name),
        ];
        if let Some(founder) = founders.first() {
            queries.push(format!("{} {} founder", founder, profile.name));
        }
        queries
    }

    /// A JSON array of at least two non-blank strings, capped at five
    fn parse_queries(raw: &str) -> Option<Vec<String>> {
        let values: Vec<serde_json::Value> = serde_json::from_str(strip_code_fences(raw)).ok()?;
        let queries: Vec<String> = values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .take(MAX_QUERIES)
            .collect();

        (queries.len() >= MIN_QUERIES).then_some(queries)
    }

    fn context(profile: &EntityProfile, founders: &[String]) -> String {
        let founders = if founders.is_empty() {
            "Unknown".to_string()
        } else {
            founders.join(", ")
        };
        format!(
            "Name: {}\nIndustry: {}\nFounders: {}",
            profile.name,
            profile.industry.as_deref().unwrap_or("Unknown"),
            founders
        )
    }

    fn prompt(profile: &EntityProfile) -> String {
        let industry = profile.industry.as_deref().unwrap_or("industry");
        format!(
            "Generate 3-5 specific web search queries to validate this company's claims.\n\n\
             Focus on:\n\
             1. Market size verification (e.g. \"{industry} market size\")\n\
             2. Competitor discovery (e.g. \"{name} competitors\")\n\
             3. Founder reputation, if known\n\
             4. Recent news or red flags\n\n\
             Return ONLY a JSON array of strings, without markdown or explanations.",
            industry = industry,
            name = profile.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::EntityId;
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::infrastructure::gateway::{GatewayConfig, RateLimitedGateway, RetryPolicy};

    fn planner(provider: MockLlmProvider) -> EvidenceQueryPlanner {
        let config = GatewayConfig::default()
            .with_min_interval(0)
            .with_retry(RetryPolicy::new(0));
        let gateway = RateLimitedGateway::new(Arc::new(provider), config).unwrap();
        EvidenceQueryPlanner::new(Arc::new(gateway))
    }

    fn profile() -> EntityProfile {
        EntityProfile::new(EntityId::new("acme").unwrap(), "Acme").with_industry("Space launch")
    }

    #[tokio::test]
    async fn test_model_queries_are_used() {
        let planner = planner(MockLlmProvider::new("mock").with_response(
            "```json\n[\"Acme rocket competitors\", \"small launch market 2024\", \"Acme founders\"]\n```",
        ));

        let queries = planner.plan(&profile(), &[]).await;
        assert_eq!(
            queries,
            vec!["Acme rocket competitors", "small launch market 2024", "Acme founders"]
        );
    }

    #[tokio::test]
    async fn test_queries_capped_at_five() {
        let planner = planner(
            MockLlmProvider::new("mock").with_response(r#"["a1","a2","a3","a4","a5","a6","a7"]"#),
        );
        assert_eq!(planner.plan(&profile(), &[]).await.len(), 5);
    }

    #[tokio::test]
    async fn test_malformed_plan_uses_templates() {
        let planner = planner(MockLlmProvider::new("mock").with_response("Sure, here you go"));
        assert_eq!(
            planner.plan(&profile(), &[]).await,
            vec!["Acme competitors", "Space launch market size", "Acme news reviews"]
        );
    }

    #[tokio::test]
    async fn test_single_query_is_not_enough() {
        let planner = planner(MockLlmProvider::new("mock").with_response(r#"["only one"]"#));
        assert_eq!(planner.plan(&profile(), &[]).await.len(), 3);
    }

    #[tokio::test]
    async fn test_generation_failure_uses_templates() {
        let planner = planner(MockLlmProvider::new("mock").with_default(MockReply::Error("down".into())));
        let profile = EntityProfile::new(EntityId::new("beta").unwrap(), "Beta");

        assert_eq!(
            planner.plan(&profile, &[]).await,
            vec!["Beta competitors", "Beta market", "Beta news reviews"]
        );
    }

    #[tokio::test]
    async fn test_founders_reach_the_plan() {
        let planner = planner(
            MockLlmProvider::new("mock")
                .with_response("no plan")
                .when_prompt_contains("Founders: Jane Doe, Raj Patel", MockReply::text(r#"["Jane Doe Acme exit", "Acme rivals"]"#)),
        );
        let founders = vec!["Jane Doe".to_string(), "Raj Patel".to_string()];

        assert_eq!(
            planner.plan(&profile(), &founders).await,
            vec!["Jane Doe Acme exit", "Acme rivals"]
        );
    }

    #[tokio::test]
    async fn test_templates_check_the_first_founder() {
        let planner = planner(MockLlmProvider::new("mock").with_response("no plan"));
        let founders = vec!["Jane Doe".to_string()];

        assert_eq!(
            planner.plan(&profile(), &founders).await,
            vec![
                "Acme competitors",
                "Space launch market size",
                "Acme news reviews",
                "Jane Doe Acme founder"
            ]
        );
    }
}

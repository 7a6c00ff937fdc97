//! Tavily-compatible web search adapter

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::search::{SearchHit, SearchProvider};
use crate::domain::DomainError;
use crate::infrastructure::llm::HttpClientTrait;

const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

#[derive(Debug)]
pub struct TavilySearchProvider<C: HttpClientTrait> {
    client: C,
    api_key: String,
    base_url: String,
}

impl<C: HttpClientTrait> TavilySearchProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_TAVILY_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }

    fn build_request(&self, query: &str, max_results: usize) -> serde_json::Value {
        serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
            "include_raw_content": false,
            "include_images": false,
        })
    }
}

#[async_trait]
impl<C: HttpClientTrait> SearchProvider for TavilySearchProvider<C> {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, DomainError> {
        let body = self.build_request(query, max_results);
        let json = self
            .client
            .post_json(
                &self.search_url(),
                vec![("Content-Type", "application/json")],
                &body,
            )
            .await?;

        let response: TavilyResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("tavily", format!("Failed to parse search response: {}", e))
        })?;

        Ok(response
            .results
            .into_iter()
            .take(max_results)
            .map(|r| {
                SearchHit::new(
                    r.title.unwrap_or_else(|| "No title".to_string()),
                    r.url.unwrap_or_default(),
                    r.content.unwrap_or_default(),
                    r.score.unwrap_or(0.0),
                )
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "tavily"
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
    score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::llm::{HttpClient, MockHttpClient};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_maps_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(serde_json::json!({
                "query": "acme competitors",
                "max_results": 3,
                "search_depth": "basic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": "acme competitors",
                "results": [
                    {"title": "Rivals", "url": "https://a.example", "content": "Beta Corp", "score": 0.91},
                    {"url": "https://b.example", "content": "Gamma Inc"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = TavilySearchProvider::with_base_url(HttpClient::new(), "tvly-key", server.uri());
        let hits = provider.search("acme competitors", 3).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rivals");
        assert!((hits[0].relevance - 0.91).abs() < 1e-9);
        assert_eq!(hits[1].title, "No title");
        assert_eq!(hits[1].relevance, 0.0);
    }

    #[tokio::test]
    async fn test_search_error_propagates() {
        let client = MockHttpClient::new().with_error("https://api.tavily.com/search", "bad key");
        let provider = TavilySearchProvider::new(client, "k");

        assert!(provider.search("q", 3).await.is_err());
    }
}

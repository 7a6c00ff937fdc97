use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// One web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub relevance: f64,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        relevance: f64,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            relevance,
        }
    }
}

/// External web search collaborator
#[async_trait]
pub trait SearchProvider: Send + Sync + Debug {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, DomainError>;

    fn provider_name(&self) -> &'static str;
}

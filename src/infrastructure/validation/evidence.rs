//! Cached web-search evidence for evaluation prompts

use futures::future::join_all;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::cache::{Cache, CacheExt};
use crate::domain::context::normalize_query;
use crate::domain::search::{SearchHit, SearchProvider};
use crate::domain::text::truncate_chars;
use crate::infrastructure::observability::record_search_cache;

const SECTION_RULE_WIDTH: usize = 50;

/// Evidence lookup settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub ttl_secs: u64,
    /// Sources requested and rendered per query
    pub max_results: usize,
    /// Characters kept from each source's content
    pub content_chars: usize,
    /// Cap on the whole formatted text
    pub max_chars: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_results: 3,
            content_chars: 300,
            max_chars: 6000,
        }
    }
}

impl EvidenceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Cache key for a query: `search:` plus the SHA-256 of its normalized text
pub fn search_cache_key(query: &str) -> String {
    let digest = Sha256::digest(normalize_query(query).as_bytes());
    format!("search:{}", hex::encode(digest))
}

/// Search results for one query, in input order
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvidence {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// TTL-cached search lookups rendered into prompt-ready text.
///
/// `lookup` never fails: with no provider, or when every query fails, it returns an
/// empty string which callers read as "validation unavailable".
#[derive(Debug)]
pub struct EvidenceCache {
    search: Option<Arc<dyn SearchProvider>>,
    cache: Arc<dyn Cache>,
    config: EvidenceConfig,
}

impl EvidenceCache {
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        cache: Arc<dyn Cache>,
        config: EvidenceConfig,
    ) -> Self {
        Self {
            search,
            cache,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.search.is_some()
    }

    pub async fn lookup(&self, queries: &[String]) -> String {
        let Some(search) = &self.search else {
            return String::new();
        };

        let queries = Self::distinct(queries);
        if queries.is_empty() {
            return String::new();
        }

        let evidence = self.collect(search.as_ref(), &queries).await;
        self.format(queries.len(), &evidence)
    }

    /// Trimmed queries with normalized duplicates removed, first occurrence kept
    fn distinct(queries: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty() && seen.insert(normalize_query(q)))
            .map(str::to_string)
            .collect()
    }

    async fn collect(&self, search: &dyn SearchProvider, queries: &[String]) -> Vec<QueryEvidence> {
        let mut found: HashMap<usize, Vec<SearchHit>> = HashMap::new();
        let mut misses = Vec::new();

        for (position, query) in queries.iter().enumerate() {
            let key = search_cache_key(query);
            match self.cache.get::<Vec<SearchHit>>(&key).await {
                Ok(Some(hits)) => {
                    debug!(query = %query, "Search cache hit");
                    record_search_cache(true);
                    found.insert(position, hits);
                }
                Ok(None) => {
                    record_search_cache(false);
                    misses.push((position, query, key));
                }
                Err(e) => {
                    warn!(error = %e, "Search cache read failed, fetching instead");
                    record_search_cache(false);
                    misses.push((position, query, key));
                }
            }
        }

        let max_results = self.config.max_results;
        let fetched = join_all(
            misses
                .iter()
                .map(|(_, query, _)| search.search(query, max_results)),
        )
        .await;

        for ((position, query, key), result) in misses.into_iter().zip(fetched) {
            match result {
                Ok(mut hits) => {
                    hits.truncate(max_results);
                    if let Err(e) = self.cache.set(&key, &hits, self.config.ttl()).await {
                        warn!(error = %e, "Failed to cache search results");
                    }
                    found.insert(position, hits);
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Search query failed");
                }
            }
        }

        queries
            .iter()
            .enumerate()
            .filter_map(|(position, query)| {
                found.remove(&position).map(|hits| QueryEvidence {
                    query: query.clone(),
                    hits,
                })
            })
            .collect()
    }

    fn format(&self, total_queries: usize, evidence: &[QueryEvidence]) -> String {
        let total_sources: usize = evidence
            .iter()
            .map(|e| e.hits.len().min(self.config.max_results))
            .sum();
        if total_sources == 0 {
            return String::new();
        }

        let rule = "─".repeat(SECTION_RULE_WIDTH);
        let mut out = String::from("=== WEB SEARCH VALIDATION RESULTS ===\n\n");

        for item in evidence {
            out.push_str(&format!("QUERY: {}\n{}\n", item.query, rule));
            if item.hits.is_empty() {
                continue;
            }

            for (i, hit) in item.hits.iter().take(self.config.max_results).enumerate() {
                out.push_str(&format!(
                    "{}. {}\n   URL: {}\n   Content: {}...\n   Relevance: {:.2}\n\n",
                    i + 1,
                    hit.title,
                    hit.url,
                    truncate_chars(&hit.content, self.config.content_chars),
                    hit.relevance
                ));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "\n=== SUMMARY ===\nTotal queries: {}\nTotal sources: {}\n",
            total_queries, total_sources
        ));

        truncate_chars(&out, self.config.max_chars).to_string()
    }
}

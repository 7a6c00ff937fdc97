use serde::Deserialize;

use crate::infrastructure::context::ContextStoreConfig;
use crate::infrastructure::gateway::GatewayConfig;
use crate::infrastructure::quota::QuotaConfig;
use crate::infrastructure::services::{EvaluationConfig, MarketConfig, QuestionConfig, ScoringConfig};
use crate::infrastructure::storage::StorageConfig;
use crate::infrastructure::validation::EvidenceConfig;

const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
const TAVILY_API_KEY_VAR: &str = "TAVILY_API_KEY";

/// Application configuration; every section has defaults, so an empty source is valid
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub storage: StorageConfig,
    pub retrieval: ContextStoreConfig,
    pub evaluation: EvaluationConfig,
    pub scoring: ScoringConfig,
    pub questions: QuestionConfig,
    pub market: MarketConfig,
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Chat model access
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    /// OpenAI-compatible endpoint; defaults to the OpenAI API
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub gateway: GatewayConfig,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_secs: 60,
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature hashing; no network
    #[default]
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub model: Option<String>,
    /// Vector size of the hashing embedder
    pub dimensions: usize,
    /// Falls back to the chat model key
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hashing,
            model: None,
            dimensions: 384,
            api_key: None,
            base_url: None,
        }
    }
}

/// Web search used for external validation; disabled without an API key
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub evidence: EvidenceConfig,
}

impl AppConfig {
    /// Load `config/default`, `config/local` and `APP__` variables, then fill missing
    /// secrets from the conventional provider variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;
        app.apply_secret_fallbacks(|name| std::env::var(name).ok());
        Ok(app)
    }

    fn apply_secret_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        if self.llm.api_key.is_none() {
            self.llm.api_key = non_empty(lookup(OPENAI_API_KEY_VAR));
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = self.llm.api_key.clone();
        }
        if self.search.api_key.is_none() {
            self.search.api_key = non_empty(lookup(TAVILY_API_KEY_VAR));
        }
    }
}

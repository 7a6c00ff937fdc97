//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, EmbeddingBackend, EmbeddingSettings, LlmSettings, LogFormat, LoggingConfig,
    SearchSettings,
};

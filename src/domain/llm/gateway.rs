//! Narrow generation interface consumed by the evaluation services

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::structured::{ParseOutcome, RecordSchema};
use crate::domain::DomainError;

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Optional system instruction prepended to the prompt
    pub system: Option<String>,
    /// Optional retrieved context, rendered ahead of the prompt
    pub context: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            system: None,
            context: None,
        }
    }
}

impl GenerationOptions {
    /// Options used for structured (JSON) generation
    pub fn structured() -> Self {
        Self {
            temperature: 0.3,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Render the final user prompt, placing context (when present) ahead of it
    pub fn render_prompt(&self, prompt: &str) -> String {
        match self.context.as_deref() {
            Some(context) if !context.trim().is_empty() => {
                format!("Context:\n{}\n\n{}", context, prompt)
            }
            _ => prompt.to_string(),
        }
    }
}

/// Rate-limited, retrying access to text and structured generation
#[async_trait]
pub trait ModelGateway: Send + Sync + Debug {
    /// Generate free text
    async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, DomainError>;

    /// Generate a typed record; parsing never fails, only generation can
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &RecordSchema,
        options: &GenerationOptions,
    ) -> Result<ParseOutcome, DomainError>;
}

//! Founder names pulled from an entity's own documents

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::context::EntityId;
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::structured::{FieldSpec, ParseStage, RecordSchema};
use crate::infrastructure::context::ContextStore;

const FOUNDER_QUERY: &str = "Who are the founders, CEO, CTO, and key team members? List their full names.";
const FIELD_FOUNDER_NAMES: &str = "founder_names";

const TOP_K: usize = 3;
const MIN_CONTEXT_CHARS: usize = 50;
const MAX_FOUNDERS: usize = 5;

/// Reads founder and executive names out of indexed documents so evidence
/// queries can check the team's reputation
#[derive(Debug, Clone)]
pub struct FounderExtractor {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
}

impl FounderExtractor {
    pub fn new(context: Arc<ContextStore>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self { context, gateway }
    }

    /// Distinct names in document order; empty whenever anything goes wrong
    pub async fn extract(&self, entity_id: &EntityId) -> Vec<String> {
        let chunks = match self.context.query(entity_id, FOUNDER_QUERY, TOP_K).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(entity_id = %entity_id, error = %e, "Founder retrieval failed");
                return Vec::new();
            }
        };

        let context = chunks.join("\n\n");
        if context.trim().chars().count() < MIN_CONTEXT_CHARS {
            debug!(entity_id = %entity_id, "Too little context to name founders");
            return Vec::new();
        }

        let schema = RecordSchema::new(vec![FieldSpec::list(FIELD_FOUNDER_NAMES)]);
        let options = GenerationOptions::structured()
            .with_max_tokens(300)
            .with_context(context);

        match self.gateway.generate_structured(&prompt(), &schema, &options).await {
            Ok(outcome) if outcome.stage == ParseStage::Fallback => {
                warn!(entity_id = %entity_id, "Founder list could not be parsed");
                Vec::new()
            }
            Ok(outcome) => {
                let names = distinct_names(outcome.record.list_or_empty(FIELD_FOUNDER_NAMES));
                debug!(entity_id = %entity_id, count = names.len(), "Extracted founder names");
                names
            }
            Err(e) => {
                warn!(entity_id = %entity_id, error = %e, "Founder extraction failed");
                Vec::new()
            }
        }
    }
}

fn prompt() -> String {
    format!(
        "Extract the full names of the founders and key executives mentioned in the context above.\n\n\
         Return ONLY a JSON object of the form {{\"{field}\": [\"Full Name\", ...]}}.\n\
         Return an empty list when no names are mentioned.",
        field = FIELD_FOUNDER_NAMES
    )
}

fn distinct_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|name| !name.is_empty() && seen.insert(name.to_lowercase()))
        .take(MAX_FOUNDERS)
        .collect()
}

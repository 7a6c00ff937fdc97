//! Free-form questions about a completed evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::prompts::{question_prompt, QUESTION_SYSTEM};
use crate::domain::context::EntityId;
use crate::domain::evaluation::{format_score, ConsolidatedResult, ScoreCard};
use crate::domain::storage::StorageEntity;
use crate::domain::llm::{GenerationOptions, ModelGateway};
use crate::domain::text::truncate_chars;
use crate::domain::DomainError;
use crate::infrastructure::context::ContextStore;

pub const INSUFFICIENT_ANSWER: &str =
    "Sorry, I couldn't generate a sufficient answer. Please try rephrasing your question.";
pub const ANSWER_FAILED: &str =
    "Sorry, an error occurred while processing your question. Please try again.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuestionConfig {
    pub top_k: usize,
    /// Retrieved chunks quoted in the prompt
    pub chunks_in_prompt: usize,
    pub chunk_chars: usize,
    pub max_tokens: u32,
    /// Answers shorter than this are replaced by an apology
    pub min_answer_chars: usize,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            chunks_in_prompt: 3,
            chunk_chars: 500,
            max_tokens: 1000,
            min_answer_chars: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    /// Retrieved chunks the answer was grounded on
    pub context_chunks: usize,
    /// The answer is a canned apology rather than model output
    pub fallback: bool,
    pub answered_at: DateTime<Utc>,
}

/// One answered question, kept as the evaluation's conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    pub evaluation_id: String,
    pub entity_id: EntityId,
    pub user_id: String,
    pub question: String,
    pub answer: String,
    pub context_chunks: usize,
    pub fallback: bool,
    pub asked_at: DateTime<Utc>,
}

impl QuestionRecord {
    pub fn new(evaluation: &ConsolidatedResult, user_id: impl Into<String>, answer: &Answer) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            evaluation_id: evaluation.metadata.run_id.clone(),
            entity_id: evaluation.metadata.entity_id.clone(),
            user_id: user_id.into(),
            question: answer.question.clone(),
            answer: answer.answer.clone(),
            context_chunks: answer.context_chunks,
            fallback: answer.fallback,
            asked_at: answer.answered_at,
        }
    }
}

impl StorageEntity for QuestionRecord {
    type Key = String;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[derive(Debug)]
pub struct QuestionService {
    context: Arc<ContextStore>,
    gateway: Arc<dyn ModelGateway>,
    config: QuestionConfig,
}

impl QuestionService {
    pub fn new(context: Arc<ContextStore>, gateway: Arc<dyn ModelGateway>, config: QuestionConfig) -> Self {
        Self {
            context,
            gateway,
            config,
        }
    }

    /// Answer `question` from the evaluation, its score card and freshly retrieved chunks.
    ///
    /// Only an empty question is an error; generation problems yield a fallback answer.
    #[instrument(skip(self, evaluation, scores, question), fields(run_id = %evaluation.metadata.run_id))]
    pub async fn answer(
        &self,
        evaluation: &ConsolidatedResult,
        scores: Option<&ScoreCard>,
        question: &str,
    ) -> Result<Answer, DomainError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DomainError::validation("Question must not be empty"));
        }

        let entity_id = &evaluation.metadata.entity_id;
        let chunks = match self.context.query(entity_id, question, self.config.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Retrieval for question failed, answering from the evaluation only");
                Arc::new(Vec::new())
            }
        };

        let context = self.build_context(evaluation, scores, &chunks);
        let options = GenerationOptions::default()
            .with_system(QUESTION_SYSTEM)
            .with_max_tokens(self.config.max_tokens);

        let (answer, fallback) = match self
            .gateway
            .generate_text(&question_prompt(question, &context), &options)
            .await
        {
            Ok(text) if text.trim().chars().count() >= self.config.min_answer_chars => {
                (text.trim().to_string(), false)
            }
            Ok(_) => {
                debug!("Answer too short, using fallback");
                (INSUFFICIENT_ANSWER.to_string(), true)
            }
            Err(e) => {
                warn!(error = %e, "Answer generation failed");
                (ANSWER_FAILED.to_string(), true)
            }
        };

        Ok(Answer {
            question: question.to_string(),
            answer,
            context_chunks: chunks.len(),
            fallback,
            answered_at: Utc::now(),
        })
    }

    fn build_context(&self, evaluation: &ConsolidatedResult, scores: Option<&ScoreCard>, chunks: &[String]) -> String {
        let mut parts = vec![format!("Evaluation summary:\n{}", evaluation.summary)];

        if !evaluation.key_insights.is_empty() {
            parts.push(format!("Key insights:\n{}", bullets(&evaluation.key_insights)));
        }

        if let Some(card) = scores {
            let mut section = format!("Scores:\n- Overall: {}/100", format_score(card.overall_score));
            for category in &card.category_scores {
                section.push_str(&format!("\n- {}: {}/100", category.category, format_score(category.score)));
            }
            section.push_str(&format!("\n\nScore reasoning:\n{}", card.reasoning));
            parts.push(section);
        }

        if !evaluation.strengths.is_empty() {
            parts.push(format!("Strengths:\n{}", bullets(&evaluation.strengths)));
        }
        if !evaluation.weaknesses.is_empty() {
            parts.push(format!("Weaknesses:\n{}", bullets(&evaluation.weaknesses)));
        }

        if !chunks.is_empty() {
            let excerpts = chunks
                .iter()
                .take(self.config.chunks_in_prompt)
                .enumerate()
                .map(|(i, chunk)| format!("{}. {}", i + 1, truncate_chars(chunk, self.config.chunk_chars)))
                .collect::<Vec<_>>()
                .join("\n\n");
            parts.push(format!("Relevant document excerpts:\n{}", excerpts));
        }

        parts.join("\n\n")
    }
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::{
        ConfidenceLevel, InsightRecord, RunMetadata, RunState, SubTaskOutcome,
    };
    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::domain::structured::ParseStage;
    use crate::infrastructure::services::test_support::{acme, gateway, indexed_store};

    fn evaluation() -> ConsolidatedResult {
        let now = Utc::now();
        ConsolidatedResult {
            summary: "Acme sells routing software to freight carriers".to_string(),
            key_insights: vec!["Forty paying customers".to_string()],
            strengths: vec!["Founders scaled logistics operations".to_string()],
            weaknesses: Vec::new(),
            opportunities: Vec::new(),
            risks: Vec::new(),
            confidence: ConfidenceLevel::High,
            confidence_ratio: 1.0,
            sub_tasks: vec![SubTaskOutcome::completed(
                "team",
                InsightRecord::default(),
                300,
                ParseStage::Direct,
            )],
            metadata: RunMetadata {
                run_id: "run-1".to_string(),
                entity_id: acme().id,
                state: RunState::Complete,
                attempted: 1,
                succeeded: 1,
                insufficient_context: 0,
                failed: 0,
                skipped: 0,
                context_chars: 300,
                evidence_chars: 0,
                started_at: now,
                completed_at: now,
            },
        }
    }

    async fn service(provider: MockLlmProvider) -> QuestionService {
        let (gateway, _) = gateway(provider);
        QuestionService::new(indexed_store().await, gateway, QuestionConfig::default())
    }

    #[tokio::test]
    async fn test_answer_uses_evaluation_and_retrieval() {
        let provider = MockLlmProvider::new("mock")
            .when_prompt_contains(
                "Forty paying customers",
                MockReply::text("Acme has forty paying customers and grows eight percent monthly."),
            )
            .with_response("context was missing");
        let service = service(provider).await;

        let answer = service
            .answer(&evaluation(), None, "How many customers does Acme have?")
            .await
            .unwrap();

        assert!(!answer.fallback);
        assert!(answer.answer.starts_with("Acme has forty paying customers"));
        assert_eq!(answer.context_chunks, 3);
    }

    #[tokio::test]
    async fn test_short_answer_is_replaced() {
        let service = service(MockLlmProvider::new("mock").with_response("Yes.")).await;

        let answer = service.answer(&evaluation(), None, "Is it good?").await.unwrap();
        assert!(answer.fallback);
        assert_eq!(answer.answer, INSUFFICIENT_ANSWER);
    }

    #[tokio::test]
    async fn test_generation_failure_is_absorbed() {
        let service =
            service(MockLlmProvider::new("mock").with_default(MockReply::Error("down".into()))).await;

        let answer = service.answer(&evaluation(), None, "What are the risks?").await.unwrap();
        assert!(answer.fallback);
        assert_eq!(answer.answer, ANSWER_FAILED);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let service = service(MockLlmProvider::new("mock").with_response("unused answer")).await;
        let err = service.answer(&evaluation(), None, "   ").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_context_includes_scores() {
        let service = service(MockLlmProvider::new("mock")).await;
        let card = ScoreCard {
            run_id: "score-1".to_string(),
            entity_id: acme().id,
            overall_score: 72.5,
            category_scores: Vec::new(),
            std_dev: 0.0,
            confidence: ConfidenceLevel::High,
            reasoning: "Strong team, small market.".to_string(),
            scored_at: Utc::now(),
        };

        let context = service.build_context(&evaluation(), Some(&card), &["chunk".to_string()]);

        assert!(context.contains("- Overall: 72.5/100"));
        assert!(context.contains("Strong team, small market."));
        assert!(context.contains("1. chunk"));
        assert!(!context.contains("Weaknesses"));
    }

    #[tokio::test]
    async fn test_record_keeps_answer_and_evaluation() {
        let service = service(
            MockLlmProvider::new("mock").with_response("Acme has forty paying customers today."),
        )
        .await;
        let evaluation = evaluation();

        let answer = service.answer(&evaluation, None, "  Customers?  ").await.unwrap();
        let record = QuestionRecord::new(&evaluation, "user-7", &answer);

        assert_eq!(record.evaluation_id, "run-1");
        assert_eq!(record.entity_id, acme().id);
        assert_eq!(record.user_id, "user-7");
        assert_eq!(record.question, "Customers?");
        assert_eq!(record.answer, answer.answer);
        assert_eq!(record.asked_at, answer.answered_at);
        assert_eq!(record.key(), &record.id);
    }
}

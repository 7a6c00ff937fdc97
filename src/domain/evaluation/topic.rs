//! Evaluation topics and scoring categories

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// One analysis sub-task: a retrieval query plus the question put to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub query: String,
}

impl Topic {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
        }
    }
}

/// The nine analysis topics every full evaluation covers by default
pub fn default_analysis_topics() -> Vec<Topic> {
    vec![
        Topic::new("business_model", "What is the business model and value proposition?"),
        Topic::new("target_market", "Who are the target customers and what is the target market?"),
        Topic::new("competition", "What is the competitive landscape and who are the main competitors?"),
        Topic::new("team", "What is the team background and expertise?"),
        Topic::new("traction", "What traction and milestones have been achieved?"),
        Topic::new("financials", "What are the financial projections and unit economics?"),
        Topic::new("risks", "What are the main risks and challenges?"),
        Topic::new("go_to_market", "What is the go-to-market strategy?"),
        Topic::new("innovation", "What is the technology or product innovation?"),
    ]
}

/// A weighted scoring dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringCategory {
    pub id: String,
    pub weight: f64,
    pub query: String,
    #[serde(default)]
    pub criteria: Vec<String>,
}

impl ScoringCategory {
    pub fn new(id: impl Into<String>, weight: f64, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            weight,
            query: query.into(),
            criteria: Vec::new(),
        }
    }

    pub fn with_criteria(mut self, criteria: &[&str]) -> Self {
        self.criteria = criteria.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Default categories; weights sum to 1.0
pub fn default_scoring_categories() -> Vec<ScoringCategory> {
    vec![
        ScoringCategory::new("team", 0.25, "founders team experience background expertise")
            .with_criteria(&[
                "Relevant domain experience",
                "Complementary skills across the founding team",
                "Track record of execution",
            ]),
        ScoringCategory::new("product", 0.20, "product features technology solution value proposition")
            .with_criteria(&[
                "Clarity of the problem being solved",
                "Differentiation of the solution",
                "Product maturity",
            ]),
        ScoringCategory::new("market", 0.20, "market size TAM SAM SOM target customers growth")
            .with_criteria(&[
                "Market size backed by credible sources",
                "Market growth rate",
                "Claims consistent with external evidence",
            ]),
        ScoringCategory::new("traction", 0.15, "traction customers revenue users growth milestones")
            .with_criteria(&[
                "Paying customers or active users",
                "Growth trajectory",
                "Partnerships and milestones",
            ]),
        ScoringCategory::new("financials", 0.10, "revenue projections unit economics burn rate funding")
            .with_criteria(&[
                "Realistic projections",
                "Healthy unit economics",
                "Sensible use of funds",
            ]),
        ScoringCategory::new("innovation", 0.10, "innovation technology patents intellectual property")
            .with_criteria(&[
                "Novelty of the approach",
                "Defensibility",
                "Technical depth",
            ]),
    ]
}

/// Reject category sets whose weights do not sum to 1.0
pub fn validate_weights(categories: &[ScoringCategory]) -> Result<(), DomainError> {
    if categories.is_empty() {
        return Err(DomainError::validation("At least one scoring category is required"));
    }

    if let Some(bad) = categories.iter().find(|c| c.weight < 0.0 || !c.weight.is_finite()) {
        return Err(DomainError::validation(format!(
            "Category '{}' has an invalid weight {}",
            bad.id, bad.weight
        )));
    }

    let total: f64 = categories.iter().map(|c| c.weight).sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(DomainError::validation(format!(
            "Scoring weights must sum to 1.0, got {:.4}",
            total
        )));
    }

    Ok(())
}

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Category of a quota-gated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Question,
    Evaluation,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Evaluation => "evaluation",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quota-gated operation, optionally scoped to one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Evaluation,
    Question { evaluation_id: Option<String> },
}

impl Resource {
    pub fn question() -> Self {
        Self::Question {
            evaluation_id: None,
        }
    }

    pub fn question_on(evaluation_id: impl Into<String>) -> Self {
        Self::Question {
            evaluation_id: Some(evaluation_id.into()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Evaluation => ResourceKind::Evaluation,
            Self::Question { .. } => ResourceKind::Question,
        }
    }

    /// Key of the per-resource counter, if this resource has one
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Question { evaluation_id } => evaluation_id.as_deref(),
            Self::Evaluation => None,
        }
    }
}

impl std::str::FromStr for Resource {
    type Err = DomainError;

    /// Accepts `evaluation`, `question` and `question:<evaluation-id>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("question", id)) if !id.is_empty() => Ok(Self::question_on(id)),
            None if s == "question" => Ok(Self::question()),
            None if s == "evaluation" => Ok(Self::Evaluation),
            _ => Err(DomainError::validation(format!("Unknown resource '{}'", s))),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Evaluation => f.write_str("evaluation"),
            Self::Question {
                evaluation_id: Some(id),
            } => write!(f, "question:{}", id),
            Self::Question { evaluation_id: None } => f.write_str("question"),
        }
    }
}

/// Usage window a limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    PerEvaluation,
    Daily,
    Weekly,
    Monthly,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerEvaluation => "per_evaluation",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_parsing() {
        assert_eq!("evaluation".parse::<Resource>().unwrap(), Resource::Evaluation);
        assert_eq!("question".parse::<Resource>().unwrap(), Resource::question());
        assert_eq!(
            "question:run-1".parse::<Resource>().unwrap(),
            Resource::question_on("run-1")
        );
        assert!("question:".parse::<Resource>().is_err());
        assert!("upload".parse::<Resource>().is_err());
    }

    #[test]
    fn test_resource_display_round_trips() {
        let resource = Resource::question_on("abc");
        assert_eq!(resource.to_string().parse::<Resource>().unwrap(), resource);
        assert_eq!(resource.scope(), Some("abc"));
        assert_eq!(Resource::Evaluation.scope(), None);
    }
}

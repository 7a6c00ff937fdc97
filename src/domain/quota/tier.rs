//! Subscription tiers and their limits

use serde::{Deserialize, Serialize};

use super::resource::ResourceKind;
use crate::domain::DomainError;

/// Subscription tier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Lenient lookup used for stored rows; unknown names are treated as free
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(DomainError::validation(format!(
                "Unknown subscription tier '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits per window for one resource; `None` means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    #[serde(default)]
    pub per_evaluation: Option<u32>,
    #[serde(default)]
    pub daily: Option<u32>,
    #[serde(default)]
    pub weekly: Option<u32>,
    #[serde(default)]
    pub monthly: Option<u32>,
}

impl WindowLimits {
    pub const UNLIMITED: Self = Self {
        per_evaluation: None,
        daily: None,
        weekly: None,
        monthly: None,
    };
}

/// Question and evaluation limits of one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub questions: WindowLimits,
    pub evaluations: WindowLimits,
}

impl TierLimits {
    pub fn for_resource(&self, kind: ResourceKind) -> &WindowLimits {
        match kind {
            ResourceKind::Question => &self.questions,
            ResourceKind::Evaluation => &self.evaluations,
        }
    }
}

/// Limits for every tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    pub free: TierLimits,
    pub pro: TierLimits,
    pub enterprise: TierLimits,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            free: TierLimits {
                questions: WindowLimits {
                    per_evaluation: Some(3),
                    daily: Some(7),
                    weekly: Some(20),
                    monthly: Some(50),
                },
                evaluations: WindowLimits {
                    daily: Some(10),
                    ..WindowLimits::UNLIMITED
                },
            },
            pro: TierLimits {
                questions: WindowLimits {
                    per_evaluation: Some(10),
                    daily: Some(30),
                    weekly: Some(100),
                    monthly: Some(250),
                },
                evaluations: WindowLimits::UNLIMITED,
            },
            enterprise: TierLimits {
                questions: WindowLimits::UNLIMITED,
                evaluations: WindowLimits::UNLIMITED,
            },
        }
    }
}

impl TierTable {
    pub fn limits(&self, tier: SubscriptionTier) -> &TierLimits {
        match tier {
            SubscriptionTier::Free => &self.free,
            SubscriptionTier::Pro => &self.pro,
            SubscriptionTier::Enterprise => &self.enterprise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tier_falls_back_to_free() {
        assert_eq!(SubscriptionTier::from_name("platinum"), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::from_name("PRO"), SubscriptionTier::Pro);
        assert!("platinum".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn test_default_table() {
        let table = TierTable::default();
        let free = table.limits(SubscriptionTier::Free);
        assert_eq!(free.questions.daily, Some(7));
        assert_eq!(free.questions.per_evaluation, Some(3));
        assert_eq!(free.evaluations.daily, Some(10));
        assert_eq!(free.evaluations.weekly, None);

        let enterprise = table.limits(SubscriptionTier::Enterprise);
        assert_eq!(*enterprise.for_resource(ResourceKind::Question), WindowLimits::UNLIMITED);
    }
}

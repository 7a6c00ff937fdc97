//! Read-only view of a user's quota usage

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::resource::{QuotaKind, ResourceKind};
use super::tier::{SubscriptionTier, TierLimits, WindowLimits};
use super::window::{Period, UsageWindows};

/// Usage of one window against its limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    pub kind: QuotaKind,
    pub current: u32,
    /// `None` means unlimited
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: DateTime<Utc>,
}

/// Daily, weekly and monthly usage of one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub resource: ResourceKind,
    pub windows: Vec<WindowStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_evaluation_limit: Option<u32>,
}

impl ResourceStatus {
    pub fn window(&self, kind: QuotaKind) -> Option<&WindowStatus> {
        self.windows.iter().find(|w| w.kind == kind)
    }
}

/// Snapshot returned by the quota tracker's `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStatus {
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub evaluations: ResourceStatus,
    pub questions: ResourceStatus,
}

impl UsageStatus {
    /// Build from windows that have already been rolled over
    pub fn from_windows(windows: &UsageWindows, limits: &TierLimits) -> Self {
        Self {
            user_id: windows.user_id.clone(),
            tier: windows.tier,
            evaluations: resource_status(windows, ResourceKind::Evaluation, &limits.evaluations),
            questions: resource_status(windows, ResourceKind::Question, &limits.questions),
        }
    }
}

fn resource_status(windows: &UsageWindows, kind: ResourceKind, limits: &WindowLimits) -> ResourceStatus {
    let counters = windows.counters(kind);

    let windows = Period::ALL
        .iter()
        .map(|&period| {
            let limit = match period {
                Period::Daily => limits.daily,
                Period::Weekly => limits.weekly,
                Period::Monthly => limits.monthly,
            };
            let current = counters.get(period);

            WindowStatus {
                kind: period.quota_kind(),
                current,
                limit,
                remaining: limit.map(|l| l.saturating_sub(current)),
                reset_at: windows.reset_at(period),
            }
        })
        .collect();

    ResourceStatus {
        resource: kind,
        windows,
        per_evaluation_limit: limits.per_evaluation,
    }
}

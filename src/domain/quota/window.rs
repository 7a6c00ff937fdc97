//! Per-user rolling usage windows

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::QuotaExceeded;
use super::resource::{QuotaKind, Resource, ResourceKind};
use super::tier::{SubscriptionTier, WindowLimits};
use crate::domain::storage::StorageEntity;

/// Calendar period of a resetting window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Daily, Period::Weekly, Period::Monthly];

    pub fn quota_kind(self) -> QuotaKind {
        match self {
            Self::Daily => QuotaKind::Daily,
            Self::Weekly => QuotaKind::Weekly,
            Self::Monthly => QuotaKind::Monthly,
        }
    }

    /// First period boundary strictly after `now`, at 00:00 UTC.
    ///
    /// Daily: next midnight. Weekly: next Sunday. Monthly: the 1st of next month.
    pub fn next_boundary(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();

        let date = match self {
            Self::Daily => today + Duration::days(1),
            Self::Weekly => {
                let days_until_sunday = 7 - i64::from(today.weekday().num_days_from_sunday());
                today + Duration::days(days_until_sunday)
            }
            Self::Monthly => {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                today
                    .with_day(1)
                    .and_then(|d| d.with_month(month))
                    .and_then(|d| d.with_year(year))
                    .unwrap_or(today + Duration::days(31))
            }
        };

        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }
}

/// Daily, weekly and monthly counts of one resource kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounters {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
}

impl WindowCounters {
    pub fn get(&self, period: Period) -> u32 {
        match period {
            Period::Daily => self.daily,
            Period::Weekly => self.weekly,
            Period::Monthly => self.monthly,
        }
    }

    fn reset(&mut self, period: Period) {
        match period {
            Period::Daily => self.daily = 0,
            Period::Weekly => self.weekly = 0,
            Period::Monthly => self.monthly = 0,
        }
    }

    fn increment(&mut self) {
        self.daily = self.daily.saturating_add(1);
        self.weekly = self.weekly.saturating_add(1);
        self.monthly = self.monthly.saturating_add(1);
    }
}

/// Operations reserved against a user's quota but not yet recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlight {
    /// Reservations of the same resource kind
    pub total: u32,
    /// Reservations scoped to the same evaluation
    pub scoped: u32,
}

/// Durable usage row of one user.
///
/// Callers must [`roll_over`](Self::roll_over) before reading counters so that a window
/// whose reset time has passed is never compared against a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageWindows {
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient_tier")]
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub questions: WindowCounters,
    #[serde(default)]
    pub evaluations: WindowCounters,
    /// Questions asked per evaluation id; these never reset
    #[serde(default)]
    pub questions_per_evaluation: BTreeMap<String, u32>,
    pub daily_reset_at: DateTime<Utc>,
    pub weekly_reset_at: DateTime<Utc>,
    pub monthly_reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn lenient_tier<'de, D>(deserializer: D) -> Result<SubscriptionTier, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(SubscriptionTier::from_name(&name))
}

impl UsageWindows {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: SubscriptionTier::default(),
            questions: WindowCounters::default(),
            evaluations: WindowCounters::default(),
            questions_per_evaluation: BTreeMap::new(),
            daily_reset_at: Period::Daily.next_boundary(now),
            weekly_reset_at: Period::Weekly.next_boundary(now),
            monthly_reset_at: Period::Monthly.next_boundary(now),
            updated_at: now,
        }
    }

    pub fn reset_at(&self, period: Period) -> DateTime<Utc> {
        match period {
            Period::Daily => self.daily_reset_at,
            Period::Weekly => self.weekly_reset_at,
            Period::Monthly => self.monthly_reset_at,
        }
    }

    fn set_reset_at(&mut self, period: Period, at: DateTime<Utc>) {
        match period {
            Period::Daily => self.daily_reset_at = at,
            Period::Weekly => self.weekly_reset_at = at,
            Period::Monthly => self.monthly_reset_at = at,
        }
    }

    pub fn counters(&self, kind: ResourceKind) -> &WindowCounters {
        match kind {
            ResourceKind::Question => &self.questions,
            ResourceKind::Evaluation => &self.evaluations,
        }
    }

    fn counters_mut(&mut self, kind: ResourceKind) -> &mut WindowCounters {
        match kind {
            ResourceKind::Question => &mut self.questions,
            ResourceKind::Evaluation => &mut self.evaluations,
        }
    }

    /// Zero every window whose reset time has passed and advance it to the next
    /// boundary after `now`. Returns the periods that were reset.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> Vec<Period> {
        let mut reset = Vec::new();

        for period in Period::ALL {
            if self.reset_at(period) <= now {
                self.questions.reset(period);
                self.evaluations.reset(period);
                self.set_reset_at(period, period.next_boundary(now));
                reset.push(period);
            }
        }

        if !reset.is_empty() {
            self.updated_at = now;
        }

        reset
    }

    /// Current per-evaluation question count for `resource`, when scoped
    pub fn scoped_count(&self, resource: &Resource) -> Option<u32> {
        resource
            .scope()
            .map(|id| self.questions_per_evaluation.get(id).copied().unwrap_or(0))
    }

    /// Compare counters against `limits` in order per-evaluation, daily, weekly, monthly
    pub fn check(&self, resource: &Resource, limits: &WindowLimits) -> Result<(), QuotaExceeded> {
        self.check_with_in_flight(resource, limits, InFlight::default())
    }

    /// Like [`check`](Self::check), counting reserved but unrecorded operations as used
    pub fn check_with_in_flight(
        &self,
        resource: &Resource,
        limits: &WindowLimits,
        in_flight: InFlight,
    ) -> Result<(), QuotaExceeded> {
        let kind = resource.kind();

        if let (Some(limit), Some(recorded)) = (limits.per_evaluation, self.scoped_count(resource))
        {
            let current = recorded.saturating_add(in_flight.scoped);
            if current >= limit {
                return Err(QuotaExceeded {
                    resource: kind,
                    kind: QuotaKind::PerEvaluation,
                    current,
                    limit,
                    reset_at: None,
                });
            }
        }

        let counters = self.counters(kind);

        for period in Period::ALL {
            let limit = match period {
                Period::Daily => limits.daily,
                Period::Weekly => limits.weekly,
                Period::Monthly => limits.monthly,
            };

            if let Some(limit) = limit {
                let current = counters.get(period).saturating_add(in_flight.total);
                if current >= limit {
                    return Err(QuotaExceeded {
                        resource: kind,
                        kind: period.quota_kind(),
                        current,
                        limit,
                        reset_at: Some(self.reset_at(period)),
                    });
                }
            }
        }

        Ok(())
    }

    /// Count one completed operation against every window
    pub fn record(&mut self, resource: &Resource, now: DateTime<Utc>) {
        self.counters_mut(resource.kind()).increment();

        if let Some(id) = resource.scope() {
            let count = self
                .questions_per_evaluation
                .entry(id.to_string())
                .or_insert(0);
            *count = count.saturating_add(1);
        }

        self.updated_at = now;
    }
}

impl StorageEntity for UsageWindows {
    type Key = String;

    fn key(&self) -> &Self::Key {
        &self.user_id
    }
}

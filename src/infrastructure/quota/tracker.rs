//! Per-user quota enforcement over durable usage windows

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::domain::evaluation::EvaluationError;
use crate::domain::quota::{
    InFlight, Resource, ResourceKind, SubscriptionTier, TierTable, UsageStatus, UsageWindows,
};
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_quota_denial;
use crate::infrastructure::sync::KeyedLocks;

/// Daily evaluation count logged as unusually high
const HIGH_DAILY_EVALUATIONS: u32 = 5;

/// Quota settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub tiers: TierTable,
    /// Weekly evaluation count that triggers a soft-monitoring warning
    pub weekly_evaluation_alert: u32,
    /// Monthly evaluation count that triggers a soft-monitoring warning
    pub monthly_evaluation_alert: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            weekly_evaluation_alert: 50,
            monthly_evaluation_alert: 100,
        }
    }
}

#[derive(Debug, Default)]
struct PendingCounts {
    by_kind: HashMap<ResourceKind, u32>,
    by_scope: HashMap<String, u32>,
}

impl PendingCounts {
    fn is_empty(&self) -> bool {
        self.by_kind.is_empty() && self.by_scope.is_empty()
    }
}

/// Reservations handed out but not yet committed or dropped, per user
#[derive(Debug, Default)]
struct ReservationBook {
    users: Mutex<HashMap<String, PendingCounts>>,
}

impl ReservationBook {
    fn in_flight(&self, user_id: &str, resource: &Resource) -> InFlight {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pending) = users.get(user_id) else {
            return InFlight::default();
        };

        InFlight {
            total: pending.by_kind.get(&resource.kind()).copied().unwrap_or(0),
            scoped: resource
                .scope()
                .and_then(|id| pending.by_scope.get(id).copied())
                .unwrap_or(0),
        }
    }

    fn hold(&self, user_id: &str, resource: &Resource) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let pending = users.entry(user_id.to_string()).or_default();

        *pending.by_kind.entry(resource.kind()).or_insert(0) += 1;
        if let Some(id) = resource.scope() {
            *pending.by_scope.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    fn release(&self, user_id: &str, resource: &Resource) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pending) = users.get_mut(user_id) else {
            return;
        };

        decrement(&mut pending.by_kind, resource.kind());
        if let Some(id) = resource.scope() {
            decrement(&mut pending.by_scope, id.to_string());
        }
        if pending.is_empty() {
            users.remove(user_id);
        }
    }
}

fn decrement<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, u32>, key: K) {
    if let Some(count) = counts.get_mut(&key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(&key);
        }
    }
}

/// A slot held against a user's quota while the gated operation runs.
///
/// Pass it to [`QuotaTracker::commit`] once the operation succeeds. Dropping it
/// uncommitted frees the slot without counting anything.
#[must_use = "dropping a reservation releases it without recording usage"]
#[derive(Debug)]
pub struct QuotaReservation {
    book: Arc<ReservationBook>,
    user_id: String,
    resource: Resource,
    held: bool,
}

impl QuotaReservation {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.held) {
            self.book.release(&self.user_id, &self.resource);
        }
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        self.release();
    }
}

/// Checks and records usage against tiered daily, weekly, monthly and per-evaluation limits.
///
/// Every read-modify-write of a user's row happens under that user's lock, so concurrent
/// requests for one user see each other's increments. Outstanding reservations count as
/// usage in every check, so concurrent requests cannot jointly overshoot a limit. Expired
/// windows are rolled over before any comparison.
#[derive(Debug)]
pub struct QuotaTracker {
    storage: Arc<dyn Storage<UsageWindows>>,
    locks: KeyedLocks,
    reservations: Arc<ReservationBook>,
    config: QuotaConfig,
}

impl QuotaTracker {
    pub fn new(storage: Arc<dyn Storage<UsageWindows>>, config: QuotaConfig) -> Self {
        Self {
            storage,
            locks: KeyedLocks::new(),
            reservations: Arc::new(ReservationBook::default()),
            config,
        }
    }

    /// Reserve one operation or report the first exceeded window.
    ///
    /// Nothing is recorded yet; hand the reservation to [`commit`](Self::commit) once the
    /// operation succeeds.
    pub async fn check_and_reserve(
        &self,
        user_id: &str,
        resource: &Resource,
    ) -> Result<QuotaReservation, EvaluationError> {
        let _guard = self.locks.lock(user_id).await;
        let windows = self.load_current(user_id).await?;
        let limits = self.config.tiers.limits(windows.tier).for_resource(resource.kind());
        let in_flight = self.reservations.in_flight(user_id, resource);

        if let Err(exceeded) = windows.check_with_in_flight(resource, limits, in_flight) {
            record_quota_denial(exceeded.kind);
            info!(
                user_id = %user_id,
                resource = %resource,
                kind = %exceeded.kind,
                current = exceeded.current,
                limit = exceeded.limit,
                "Quota exceeded"
            );
            return Err(exceeded.into());
        }

        if resource.kind() == ResourceKind::Evaluation && windows.evaluations.daily >= HIGH_DAILY_EVALUATIONS {
            warn!(user_id = %user_id, daily = windows.evaluations.daily, "High evaluation rate");
        }

        self.reservations.hold(user_id, resource);
        Ok(QuotaReservation {
            book: self.reservations.clone(),
            user_id: user_id.to_string(),
            resource: resource.clone(),
            held: true,
        })
    }

    /// Record the reserved operation and free its slot in the same critical section
    pub async fn commit(&self, mut reservation: QuotaReservation) -> Result<UsageWindows, DomainError> {
        let _guard = self.locks.lock(&reservation.user_id).await;
        let recorded = self.record_locked(&reservation.user_id, &reservation.resource).await;
        reservation.release();
        recorded
    }

    /// Count one successful operation against every window, without a reservation
    pub async fn record_consumption(
        &self,
        user_id: &str,
        resource: &Resource,
    ) -> Result<UsageWindows, DomainError> {
        let _guard = self.locks.lock(user_id).await;
        self.record_locked(user_id, resource).await
    }

    async fn record_locked(
        &self,
        user_id: &str,
        resource: &Resource,
    ) -> Result<UsageWindows, DomainError> {
        let now = Utc::now();
        let mut windows = self.load_current(user_id).await?;

        windows.record(resource, now);
        self.storage.put(&windows).await?;

        debug!(user_id = %user_id, resource = %resource, "Recorded usage");

        if resource.kind() == ResourceKind::Evaluation {
            if windows.evaluations.weekly >= self.config.weekly_evaluation_alert {
                warn!(user_id = %user_id, weekly = windows.evaluations.weekly, "Weekly evaluation volume alert");
            }
            if windows.evaluations.monthly >= self.config.monthly_evaluation_alert {
                warn!(user_id = %user_id, monthly = windows.evaluations.monthly, "Monthly evaluation volume alert");
            }
        }

        Ok(windows)
    }

    pub async fn status(&self, user_id: &str) -> Result<UsageStatus, DomainError> {
        let _guard = self.locks.lock(user_id).await;
        let windows = self.load_current(user_id).await?;

        Ok(UsageStatus::from_windows(
            &windows,
            self.config.tiers.limits(windows.tier),
        ))
    }

    pub async fn set_tier(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
    ) -> Result<UsageWindows, DomainError> {
        let _guard = self.locks.lock(user_id).await;
        let mut windows = self.load_current(user_id).await?;

        if windows.tier != tier {
            info!(user_id = %user_id, from = %windows.tier, to = %tier, "Changed subscription tier");
            windows.tier = tier;
            windows.updated_at = Utc::now();
            self.storage.put(&windows).await?;
        }

        Ok(windows)
    }

    /// Load (or create) the user's row and roll expired windows over, persisting the
    /// result when anything changed. Callers hold the user's lock.
    async fn load_current(&self, user_id: &str) -> Result<UsageWindows, DomainError> {
        if user_id.trim().is_empty() {
            return Err(DomainError::validation("User id cannot be empty"));
        }

        let now = Utc::now();
        let key = user_id.to_string();

        match self.storage.get(&key).await? {
            Some(mut windows) => {
                let reset = windows.roll_over(now);
                if !reset.is_empty() {
                    debug!(user_id = %user_id, periods = ?reset, "Reset expired usage windows");
                    self.storage.put(&windows).await?;
                }
                Ok(windows)
            }
            None => {
                let windows = UsageWindows::new(user_id, now);
                self.storage.put(&windows).await?;
                Ok(windows)
            }
        }
    }
}

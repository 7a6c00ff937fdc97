//! Tiered, multi-window usage quotas

mod error;
mod resource;
mod status;
mod tier;
mod window;

pub use error::QuotaExceeded;
pub use resource::{QuotaKind, Resource, ResourceKind};
pub use status::{ResourceStatus, UsageStatus, WindowStatus};
pub use tier::{SubscriptionTier, TierLimits, TierTable, WindowLimits};
pub use window::{InFlight, Period, UsageWindows, WindowCounters};

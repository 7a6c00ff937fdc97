use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::resource::{QuotaKind, ResourceKind};

/// A limit would be exceeded by the requested operation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{resource} quota exceeded ({kind}): {current}/{limit}")]
pub struct QuotaExceeded {
    pub resource: ResourceKind,
    pub kind: QuotaKind,
    pub current: u32,
    pub limit: u32,
    /// When the window resets; `None` for per-evaluation counters, which never reset
    pub reset_at: Option<DateTime<Utc>>,
}

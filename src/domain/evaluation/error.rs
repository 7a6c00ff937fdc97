use thiserror::Error;

use crate::domain::context::EntityId;
use crate::domain::quota::QuotaExceeded;
use crate::domain::DomainError;

/// Failures surfaced to callers of evaluation runs
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// No sub-task produced a usable result
    #[error("No usable context for entity '{entity_id}' ({attempted} sub-task(s) attempted)")]
    NoContextAvailable { entity_id: EntityId, attempted: usize },

    #[error("Entity '{0}' not found")]
    EntityNotFound(EntityId),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

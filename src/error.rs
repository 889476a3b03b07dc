use crate::conflict::ConflictType;

/// Errors raised by reservation, schedule and equipment-request operations.
///
/// Storage failures are wrapped as [`ReservationError::Storage`] and are safe
/// to retry; every other variant describes a request that will keep failing
/// until the caller changes it.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("End time must be after start time")]
    InvalidTimeRange,

    #[error("Invalid recurrence pattern: {0} (expected daily, weekly or monthly)")]
    InvalidRecurrencePattern(String),

    #[error("Invalid recurrence range: {0}")]
    InvalidRecurrenceRange(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{}", .0.message())]
    Conflict(ConflictType),

    #[error("Cannot {action} a {status} {entity}")]
    InvalidTransition {
        entity: &'static str,
        action: &'static str,
        status: &'static str,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ReservationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

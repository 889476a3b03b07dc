use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::interval::BookingInterval;
use crate::conflict::{ConflictResult, ConflictType, DatedConflict};

/// Body of a single-date conflict check.
///
/// Times are `HH:MM` strings and are validated by the handler so a bad
/// range is reported the same way as any other validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConflictRequest {
    pub resource_id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConflictResponse {
    pub has_conflict: bool,
    pub conflict_type: ConflictType,
    pub message: String,
    pub conflicting_interval: Option<BookingInterval>,
}

impl From<ConflictResult> for CheckConflictResponse {
    fn from(result: ConflictResult) -> Self {
        Self {
            has_conflict: result.has_conflict,
            conflict_type: result.conflict_type,
            message: result.conflict_type.message().to_string(),
            conflicting_interval: result.conflicting_interval,
        }
    }
}

/// Body of a conflict check for a reservation that would repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecurringConflictsRequest {
    pub resource_id: Uuid,
    pub start_time: String,
    pub end_time: String,
    /// `daily`, `weekly` or `monthly`.
    pub recurrence_pattern: String,
    /// First date of the recurrence; weekly and monthly repeats follow it.
    pub anchor_date: NaiveDate,
    /// Last date of the recurrence, inclusive.
    pub recurrence_end_date: NaiveDate,
    /// Report every conflicting date instead of stopping at the first.
    #[serde(default = "default_exhaustive")]
    pub exhaustive: bool,
}

fn default_exhaustive() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringConflict {
    pub date: NaiveDate,
    pub conflict_type: ConflictType,
    pub message: String,
}

impl From<DatedConflict> for RecurringConflict {
    fn from(conflict: DatedConflict) -> Self {
        Self {
            date: conflict.date,
            conflict_type: conflict.conflict_type,
            message: conflict.conflict_type.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecurringConflictsResponse {
    pub has_conflicts: bool,
    pub conflict_count: usize,
    pub first_conflict: Option<RecurringConflict>,
    pub conflicts: Vec<RecurringConflict>,
}

impl From<Vec<DatedConflict>> for CheckRecurringConflictsResponse {
    fn from(conflicts: Vec<DatedConflict>) -> Self {
        let conflicts: Vec<RecurringConflict> = conflicts.into_iter().map(Into::into).collect();
        Self {
            has_conflicts: !conflicts.is_empty(),
            conflict_count: conflicts.len(),
            first_conflict: conflicts.first().cloned(),
            conflicts,
        }
    }
}

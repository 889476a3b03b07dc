//! Booking conflict detection for laboratories.
//!
//! [`ConflictChecker`] answers one question: does a requested time range on
//! a given date collide with anything already committed for that resource?
//! Three sources are consulted in priority order and the first collision
//! wins:
//!
//! 1. single reservations on that date,
//! 2. occurrences of recurring reservations,
//! 3. weekly class schedules.
//!
//! Only reservations in an active status (pending or approved) take part.
//! The checker is stateless and only reads through a [`BookingSource`]; it
//! makes no atomicity promise between a check and a later insert.

pub mod recurrence;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;
use crate::models::{BookingInterval, ClassSchedule, LaboratoryReservation, TimeRange};

pub use recurrence::{Recurrence, RecurrencePattern, RecurringRule, MAX_RECURRENCE_SPAN_DAYS};

/// Read access to the commitments of a resource.
///
/// Implementations return records regardless of status; filtering on status
/// and active windows happens in the checker. An unknown resource simply has
/// no records.
pub trait BookingSource {
    /// Non-recurring reservations of `resource_id` dated `date`.
    fn reservations_on(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<LaboratoryReservation>>;

    /// Recurring reservations of `resource_id` whose date range contains `date`.
    fn recurring_reservations_covering(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<LaboratoryReservation>>;

    /// Class schedules of `resource_id` held on `day_of_week` (Sunday = 0).
    fn class_schedules_on(
        &self,
        resource_id: Uuid,
        day_of_week: u8,
    ) -> anyhow::Result<Vec<ClassSchedule>>;
}

/// Which kind of existing commitment collided with a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    None,
    SingleReservation,
    RecurringReservation,
    ClassSchedule,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SingleReservation => "single_reservation",
            Self::RecurringReservation => "recurring_reservation",
            Self::ClassSchedule => "class_schedule",
        }
    }

    /// User-facing explanation, as shown next to the booking form.
    pub fn message(&self) -> &'static str {
        match self {
            Self::None => "The selected time slot is available.",
            Self::SingleReservation => "The selected time conflicts with an existing reservation.",
            Self::RecurringReservation => "The selected time conflicts with a recurring reservation.",
            Self::ClassSchedule => "The selected time conflicts with a scheduled class.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResult {
    pub has_conflict: bool,
    pub conflict_type: ConflictType,
    pub conflicting_interval: Option<BookingInterval>,
}

impl ConflictResult {
    pub fn none() -> Self {
        Self {
            has_conflict: false,
            conflict_type: ConflictType::None,
            conflicting_interval: None,
        }
    }

    fn found(conflict_type: ConflictType, interval: BookingInterval) -> Self {
        Self {
            has_conflict: true,
            conflict_type,
            conflicting_interval: Some(interval),
        }
    }
}

/// A conflict found on one date of a recurring request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedConflict {
    pub date: NaiveDate,
    pub conflict_type: ConflictType,
    pub conflicting_interval: Option<BookingInterval>,
}

/// How far [`ConflictChecker::check_recurring_conflicts`] scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Stop at the first conflicting date.
    FirstOnly,
    /// Report every conflicting date.
    #[default]
    Exhaustive,
}

pub struct ConflictChecker<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: BookingSource + ?Sized> ConflictChecker<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn check_conflicts(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
        range: &TimeRange,
    ) -> Result<ConflictResult, ReservationError> {
        let singles = self.source.reservations_on(resource_id, date)?;
        for reservation in singles.iter().filter(|r| r.status.is_active() && !r.is_recurring) {
            let Some(interval) = single_interval(reservation) else {
                continue;
            };
            if interval.overlaps(range) {
                return Ok(self.report(ConflictType::SingleReservation, interval));
            }
        }

        let recurring = self.source.recurring_reservations_covering(resource_id, date)?;
        for reservation in recurring.iter().filter(|r| r.status.is_active()) {
            let Some(rule) = recurring_rule(reservation) else {
                continue;
            };
            if let Some(interval) = rule.occurrence_on(date).filter(|i| i.overlaps(range)) {
                return Ok(self.report(ConflictType::RecurringReservation, interval));
            }
        }

        let day_of_week = date.weekday().num_days_from_sunday() as u8;
        let schedules = self.source.class_schedules_on(resource_id, day_of_week)?;
        for schedule in schedules.iter().filter(|s| s.is_active) {
            let Some(rule) = schedule_rule(schedule) else {
                continue;
            };
            if let Some(interval) = rule.occurrence_on(date).filter(|i| i.overlaps(range)) {
                return Ok(self.report(ConflictType::ClassSchedule, interval));
            }
        }

        Ok(ConflictResult::none())
    }

    /// Run [`check_conflicts`](Self::check_conflicts) on every date `rule`
    /// selects, in date order.
    pub fn check_recurring_conflicts(
        &self,
        rule: &RecurringRule,
        mode: ScanMode,
    ) -> Result<Vec<DatedConflict>, ReservationError> {
        let mut conflicts = Vec::new();
        for date in rule.dates()? {
            let result = self.check_conflicts(rule.resource_id, date, &rule.range)?;
            if !result.has_conflict {
                continue;
            }
            conflicts.push(DatedConflict {
                date,
                conflict_type: result.conflict_type,
                conflicting_interval: result.conflicting_interval,
            });
            if mode == ScanMode::FirstOnly {
                break;
            }
        }
        tracing::debug!(
            resource_id = %rule.resource_id,
            conflicts = conflicts.len(),
            "checked recurring request"
        );
        Ok(conflicts)
    }

    fn report(&self, conflict_type: ConflictType, interval: BookingInterval) -> ConflictResult {
        tracing::debug!(
            resource_id = %interval.resource_id,
            date = %interval.date,
            conflict = conflict_type.as_str(),
            source_id = ?interval.source_id,
            "booking conflict"
        );
        ConflictResult::found(conflict_type, interval)
    }
}

fn single_interval(reservation: &LaboratoryReservation) -> Option<BookingInterval> {
    match reservation.booking_interval() {
        Ok(interval) => Some(interval),
        Err(e) => {
            tracing::warn!(reservation_id = %reservation.id, "skipping reservation: {}", e);
            None
        }
    }
}

fn recurring_rule(reservation: &LaboratoryReservation) -> Option<RecurringRule> {
    match reservation.recurring_rule() {
        Ok(rule) => rule,
        Err(e) => {
            tracing::warn!(reservation_id = %reservation.id, "skipping recurring reservation: {}", e);
            None
        }
    }
}

fn schedule_rule(schedule: &ClassSchedule) -> Option<RecurringRule> {
    match schedule.recurring_rule() {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::warn!(schedule_id = %schedule.id, "skipping class schedule: {}", e);
            None
        }
    }
}

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::interval::{hhmm, BookingInterval, BookingKind, TimeRange};
use crate::conflict::{RecurrencePattern, RecurringRule};
use crate::error::ReservationError;

/// A request to use a computer laboratory for a time slot.
///
/// A reservation either occupies a single date, or, when `is_recurring` is
/// set, repeats from `reservation_date` through `recurrence_end_date`
/// according to `recurrence_pattern`.
///
/// # Lifecycle
/// `Pending` → `Approved` | `Rejected`. The owner may cancel a pending
/// reservation at any time, and an approved one until its date begins.
/// Only `Pending` and `Approved` reservations block the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaboratoryReservation {
    pub id: Uuid,
    /// The requester who owns this reservation.
    pub user_id: Uuid,
    pub laboratory_id: Uuid,
    pub reservation_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub purpose: String,
    pub num_students: u32,
    pub course_code: Option<String>,
    pub subject: Option<String>,
    pub section: Option<String>,
    pub status: ReservationStatus,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    /// Last date of the recurrence, inclusive.
    pub recurrence_end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LaboratoryReservation {
    pub fn time_range(&self) -> Result<TimeRange, ReservationError> {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// The slot occupied on `reservation_date`.
    pub fn booking_interval(&self) -> Result<BookingInterval, ReservationError> {
        Ok(BookingInterval {
            resource_id: self.laboratory_id,
            date: self.reservation_date,
            range: self.time_range()?,
            kind: if self.is_recurring {
                BookingKind::Recurring
            } else {
                BookingKind::Single
            },
            source_id: Some(self.id),
        })
    }

    /// The repeating template for a recurring reservation, `None` for a
    /// single one.
    pub fn recurring_rule(&self) -> Result<Option<RecurringRule>, ReservationError> {
        if !self.is_recurring {
            return Ok(None);
        }
        let (Some(pattern), Some(until)) = (self.recurrence_pattern, self.recurrence_end_date)
        else {
            return Err(ReservationError::InvalidRecurrenceRange(
                "recurring reservation without pattern or end date".to_string(),
            ));
        };
        let rule = RecurringRule::pattern(
            self.laboratory_id,
            self.time_range()?,
            pattern,
            self.reservation_date,
            until,
        )
        .with_source(self.id);
        Ok(Some(rule))
    }

    /// Check that `requester` may cancel this reservation at `now`.
    pub fn ensure_cancellable(
        &self,
        requester: Uuid,
        now: NaiveDateTime,
    ) -> Result<(), ReservationError> {
        if self.user_id != requester {
            return Err(ReservationError::Forbidden(
                "You can only cancel your own reservations.".to_string(),
            ));
        }
        match self.status {
            ReservationStatus::Pending => Ok(()),
            ReservationStatus::Approved if now < self.reservation_date.and_time(NaiveTime::MIN) => {
                Ok(())
            }
            ReservationStatus::Approved => Err(ReservationError::Validation(
                "Approved reservations can only be cancelled before the reservation date."
                    .to_string(),
            )),
            status => Err(ReservationError::InvalidTransition {
                entity: "reservation",
                action: "cancel",
                status: status.as_str(),
            }),
        }
    }
}

/// The review status of a laboratory reservation.
///
/// - `Pending`: Submitted, waiting for an administrator
/// - `Approved`: Confirmed by an administrator
/// - `Rejected`: Declined by an administrator
/// - `Cancelled`: Withdrawn by the requester
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a reservation in this status occupies its slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Administrator review moves: approve or reject a pending request.
    pub fn review(self, next: ReservationStatus) -> Result<Self, ReservationError> {
        match (self, next) {
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected) => Ok(next),
            (from, to) => Err(ReservationError::InvalidTransition {
                entity: "reservation",
                action: if to == Self::Approved { "approve" } else { "reject" },
                status: from.as_str(),
            }),
        }
    }

    /// Color used for calendar events.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Pending => "#FCD34D",
            Self::Approved => "#10B981",
            Self::Rejected => "#EF4444",
            Self::Cancelled => "#6B7280",
        }
    }
}

/// Input for submitting a reservation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservationInput {
    pub user_id: Uuid,
    pub reservation_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub purpose: String,
    pub num_students: u32,
    pub course_code: Option<String>,
    pub subject: Option<String>,
    pub section: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    /// Required when `is_recurring` is set: `daily`, `weekly` or `monthly`.
    pub recurrence_pattern: Option<String>,
    /// Required when `is_recurring` is set; must be after `reservation_date`.
    pub recurrence_end_date: Option<NaiveDate>,
}

/// A [`CreateReservationInput`] that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedReservation {
    pub input: CreateReservationInput,
    pub range: TimeRange,
    pub recurrence: Option<(RecurrencePattern, NaiveDate)>,
}

pub const MAX_PURPOSE_LEN: usize = 500;
pub const MAX_STUDENTS: u32 = 100;

impl CreateReservationInput {
    /// Validate the request against the booking rules as of `today`.
    pub fn validate(self, today: NaiveDate) -> Result<ValidatedReservation, ReservationError> {
        let range = TimeRange::new(self.start_time, self.end_time)?;

        if self.reservation_date < today {
            return Err(ReservationError::Validation(
                "reservation_date must be today or later".to_string(),
            ));
        }
        let purpose = self.purpose.trim();
        if purpose.is_empty() || purpose.chars().count() > MAX_PURPOSE_LEN {
            return Err(ReservationError::Validation(format!(
                "purpose must be between 1 and {MAX_PURPOSE_LEN} characters"
            )));
        }
        if !(1..=MAX_STUDENTS).contains(&self.num_students) {
            return Err(ReservationError::Validation(format!(
                "num_students must be between 1 and {MAX_STUDENTS}"
            )));
        }
        check_max_len("course_code", self.course_code.as_deref(), 20)?;
        check_max_len("subject", self.subject.as_deref(), 100)?;
        check_max_len("section", self.section.as_deref(), 20)?;

        let recurrence = if self.is_recurring {
            let pattern = self
                .recurrence_pattern
                .as_deref()
                .ok_or_else(|| {
                    ReservationError::Validation("recurrence_pattern is required".to_string())
                })?
                .parse::<RecurrencePattern>()?;
            let until = self.recurrence_end_date.ok_or_else(|| {
                ReservationError::Validation("recurrence_end_date is required".to_string())
            })?;
            if until <= self.reservation_date {
                return Err(ReservationError::InvalidRecurrenceRange(
                    "recurrence_end_date must be after reservation_date".to_string(),
                ));
            }
            RecurringRule::candidate(Uuid::nil(), range, pattern, self.reservation_date, until)?;
            Some((pattern, until))
        } else {
            None
        };

        Ok(ValidatedReservation {
            input: self,
            range,
            recurrence,
        })
    }
}

fn check_max_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ReservationError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ReservationError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// Filters for listing reservations. All fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub user_id: Option<Uuid>,
    pub laboratory_id: Option<Uuid>,
    pub status: Option<ReservationStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Input for cancelling a reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReservationInput {
    /// The requester asking for the cancellation.
    pub user_id: Uuid,
}

/// A reservation rendered for a month calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    /// `YYYY-MM-DDTHH:MM`
    pub start: String,
    /// `YYYY-MM-DDTHH:MM`
    pub end: String,
    pub status: ReservationStatus,
    pub color: String,
}

impl CalendarEvent {
    pub fn new(reservation: &LaboratoryReservation, laboratory_name: &str) -> Self {
        let date = reservation.reservation_date.format("%Y-%m-%d");
        Self {
            id: reservation.id,
            title: format!("{} - {}", laboratory_name, reservation.purpose),
            start: format!("{}T{}", date, hhmm::format(&reservation.start_time)),
            end: format!("{}T{}", date, hhmm::format(&reservation.end_time)),
            status: reservation.status,
            color: reservation.status.color().to_string(),
        }
    }
}

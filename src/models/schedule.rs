use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::academic::AcademicTerm;
use super::interval::{hhmm, TimeRange};
use crate::conflict::RecurringRule;
use crate::error::ReservationError;

/// A class that occupies a laboratory every week on one day.
///
/// The optional `effective_from`/`effective_until` window bounds the weeks
/// the class runs. When the schedule is linked to an academic term the
/// window is copied from the term's dates. Inactive schedules are kept for
/// reference but never block reservations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSchedule {
    pub id: Uuid,
    pub laboratory_id: Uuid,
    pub subject_code: String,
    pub subject_name: String,
    pub instructor_name: String,
    pub section: String,
    /// Sunday = 0 through Saturday = 6.
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub schedule_type: ScheduleType,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
    pub academic_term_id: Option<Uuid>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ClassSchedule {
    /// Check day, times and window; returns the normalised time range.
    pub fn validate(&self) -> Result<TimeRange, ReservationError> {
        if self.day_of_week > 6 {
            return Err(ReservationError::Validation(
                "day_of_week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if let (Some(from), Some(until)) = (self.effective_from, self.effective_until) {
            if until < from {
                return Err(ReservationError::Validation(
                    "effective_until must not be before effective_from".to_string(),
                ));
            }
        }
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Link the schedule to `term` and take its window from the term.
    pub fn attach_term(&mut self, term: &AcademicTerm) {
        self.academic_term_id = Some(term.id);
        self.effective_from = Some(term.start_date);
        self.effective_until = Some(term.end_date);
    }

    /// Apply the fields set in `input`. An explicit window detaches the
    /// schedule from its term; linking a new term goes through
    /// [`ClassSchedule::attach_term`].
    pub fn apply(&mut self, input: UpdateScheduleInput) {
        if let Some(v) = input.subject_code {
            self.subject_code = v;
        }
        if let Some(v) = input.subject_name {
            self.subject_name = v;
        }
        if let Some(v) = input.instructor_name {
            self.instructor_name = v;
        }
        if let Some(v) = input.section {
            self.section = v;
        }
        if let Some(v) = input.day_of_week {
            self.day_of_week = v;
        }
        if let Some(v) = input.start_time {
            self.start_time = v;
        }
        if let Some(v) = input.end_time {
            self.end_time = v;
        }
        if let Some(v) = input.schedule_type {
            self.schedule_type = v;
        }
        if input.effective_from.is_some() || input.effective_until.is_some() {
            self.academic_term_id = None;
            if input.effective_from.is_some() {
                self.effective_from = input.effective_from;
            }
            if input.effective_until.is_some() {
                self.effective_until = input.effective_until;
            }
        }
        if let Some(v) = input.is_active {
            self.is_active = v;
        }
        if input.notes.is_some() {
            self.notes = input.notes;
        }
    }

    pub fn recurring_rule(&self) -> Result<RecurringRule, ReservationError> {
        let range = TimeRange::new(self.start_time, self.end_time)?;
        Ok(RecurringRule::day_of_week(
            self.laboratory_id,
            range,
            self.day_of_week,
            self.effective_from,
            self.effective_until,
        )
        .with_source(self.id))
    }
}

/// - `Regular`: Part of the term's standing timetable
/// - `Special`: Make-up or one-off sessions, usually with a short window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Regular,
    Special,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Special => "special",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(Self::Regular),
            "special" => Some(Self::Special),
            _ => None,
        }
    }
}

/// Input for adding a class to a laboratory's timetable.
///
/// Give either `academic_term_id` or an explicit window, not both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleInput {
    pub subject_code: String,
    pub subject_name: String,
    pub instructor_name: String,
    pub section: String,
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    /// Defaults to `Regular` if not specified.
    pub schedule_type: Option<ScheduleType>,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
    #[serde(default)]
    pub academic_term_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl CreateScheduleInput {
    /// Build the schedule this input describes. `term` must be the term
    /// named by `academic_term_id`, if any.
    pub fn into_schedule(
        self,
        laboratory_id: Uuid,
        term: Option<&AcademicTerm>,
        now: DateTime<Utc>,
    ) -> Result<ClassSchedule, ReservationError> {
        if self.academic_term_id.is_some()
            && (self.effective_from.is_some() || self.effective_until.is_some())
        {
            return Err(ReservationError::Validation(
                "give either academic_term_id or effective_from/effective_until".to_string(),
            ));
        }

        let mut schedule = ClassSchedule {
            id: Uuid::new_v4(),
            laboratory_id,
            subject_code: self.subject_code,
            subject_name: self.subject_name,
            instructor_name: self.instructor_name,
            section: self.section,
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            schedule_type: self.schedule_type.unwrap_or(ScheduleType::Regular),
            effective_from: self.effective_from,
            effective_until: self.effective_until,
            academic_term_id: None,
            is_active: true,
            notes: self.notes,
            created_at: now,
        };
        if let Some(term) = term {
            schedule.attach_term(term);
        }
        let range = schedule.validate()?;
        schedule.start_time = range.start();
        schedule.end_time = range.end();
        Ok(schedule)
    }
}

/// Partial update of a class schedule. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleInput {
    pub subject_code: Option<String>,
    pub subject_name: Option<String>,
    pub instructor_name: Option<String>,
    pub section: Option<String>,
    pub day_of_week: Option<u8>,
    #[serde(default, with = "hhmm::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm::option")]
    pub end_time: Option<NaiveTime>,
    pub schedule_type: Option<ScheduleType>,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
    /// Link to this term and take its window.
    pub academic_term_id: Option<Uuid>,
    /// Activate or deactivate without deleting.
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

impl UpdateScheduleInput {
    pub fn check_window_source(&self) -> Result<(), ReservationError> {
        if self.academic_term_id.is_some()
            && (self.effective_from.is_some() || self.effective_until.is_some())
        {
            return Err(ReservationError::Validation(
                "give either academic_term_id or effective_from/effective_until".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(s: &str) -> NaiveTime {
        hhmm::parse(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn input() -> CreateScheduleInput {
        CreateScheduleInput {
            subject_code: "CS 101".to_string(),
            subject_name: "Introduction to Computing".to_string(),
            instructor_name: "R. Santos".to_string(),
            section: "BSCS 1-A".to_string(),
            day_of_week: 1,
            start_time: time("08:00"),
            end_time: time("10:00"),
            schedule_type: None,
            effective_from: None,
            effective_until: None,
            academic_term_id: None,
            notes: None,
        }
    }

    fn term() -> AcademicTerm {
        AcademicTerm {
            id: Uuid::new_v4(),
            academic_year_id: Uuid::new_v4(),
            name: "First Semester".to_string(),
            start_date: date("2025-08-11"),
            end_date: date("2025-12-19"),
            is_current: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn takes_its_window_from_a_term() {
        let term = term();
        let schedule = CreateScheduleInput {
            academic_term_id: Some(term.id),
            ..input()
        }
        .into_schedule(Uuid::new_v4(), Some(&term), Utc::now())
        .unwrap();

        assert_eq!(schedule.academic_term_id, Some(term.id));
        assert_eq!(schedule.effective_from, Some(term.start_date));
        assert_eq!(schedule.effective_until, Some(term.end_date));
    }

    #[test]
    fn rejects_a_term_and_an_explicit_window_together() {
        let term = term();
        let result = CreateScheduleInput {
            academic_term_id: Some(term.id),
            effective_from: Some(date("2025-09-01")),
            ..input()
        }
        .into_schedule(Uuid::new_v4(), Some(&term), Utc::now());

        assert!(matches!(result, Err(ReservationError::Validation(_))));
    }

    #[test]
    fn rejects_a_day_outside_the_week() {
        let result = CreateScheduleInput {
            day_of_week: 7,
            ..input()
        }
        .into_schedule(Uuid::new_v4(), None, Utc::now());

        assert!(matches!(result, Err(ReservationError::Validation(_))));
    }

    #[test]
    fn update_keeps_absent_fields_and_detaches_on_explicit_window() {
        let term = term();
        let mut schedule = CreateScheduleInput {
            academic_term_id: Some(term.id),
            ..input()
        }
        .into_schedule(Uuid::new_v4(), Some(&term), Utc::now())
        .unwrap();

        schedule.apply(UpdateScheduleInput {
            end_time: Some(time("11:00")),
            effective_until: Some(date("2025-10-31")),
            is_active: Some(false),
            ..Default::default()
        });

        assert_eq!(schedule.subject_code, "CS 101");
        assert_eq!(schedule.end_time, time("11:00"));
        assert_eq!(schedule.effective_from, Some(term.start_date));
        assert_eq!(schedule.effective_until, Some(date("2025-10-31")));
        assert_eq!(schedule.academic_term_id, None);
        assert!(!schedule.is_active);
    }

    #[test]
    fn update_accepts_hhmm_times() {
        let update: UpdateScheduleInput =
            serde_json::from_str(r#"{"start_time":"13:00","is_active":true}"#).unwrap();
        assert_eq!(update.start_time, Some(time("13:00")));
        assert_eq!(update.end_time, None);
        assert_eq!(update.is_active, Some(true));
    }
}

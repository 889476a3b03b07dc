//! Expansion of recurring templates into concrete per-date intervals.
//!
//! A [`RecurringRule`] is either a recurring reservation (daily, weekly or
//! monthly, measured from an anchor date) or a class schedule pinned to a
//! day of the week. Expansion is a pure function of the rule and the target
//! date; overlap testing happens elsewhere on the produced intervals.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;
use crate::models::{BookingInterval, BookingKind, TimeRange};

/// Longest span a candidate recurring reservation may cover, inclusive.
pub const MAX_RECURRENCE_SPAN_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl FromStr for RecurrencePattern {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(ReservationError::InvalidRecurrencePattern(other.to_string())),
        }
    }
}

/// How a rule picks its dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Repeats relative to `anchor`: every day, the anchor's weekday, or the
    /// anchor's day of the month.
    Pattern {
        pattern: RecurrencePattern,
        anchor: NaiveDate,
    },
    /// Every week on the given day, Sunday = 0 through Saturday = 6.
    DayOfWeek(u8),
}

impl Recurrence {
    fn matches(&self, date: NaiveDate) -> bool {
        match *self {
            Recurrence::Pattern { pattern, anchor } => match pattern {
                RecurrencePattern::Daily => true,
                RecurrencePattern::Weekly => date.weekday() == anchor.weekday(),
                // Anchors on the 29th-31st skip months that lack that day.
                RecurrencePattern::Monthly => date.day() == anchor.day(),
            },
            Recurrence::DayOfWeek(day) => date.weekday().num_days_from_sunday() == u32::from(day),
        }
    }
}

/// A template that yields at most one [`BookingInterval`] per date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringRule {
    pub resource_id: Uuid,
    pub range: TimeRange,
    pub recurrence: Recurrence,
    /// First date the rule may select. `None` means no lower bound.
    pub effective_from: Option<NaiveDate>,
    /// Last date the rule may select, inclusive. `None` means no upper bound.
    pub effective_until: Option<NaiveDate>,
    pub kind: BookingKind,
    pub source_id: Option<Uuid>,
}

impl RecurringRule {
    /// A recurring reservation anchored on `anchor` and running through `until`.
    pub fn pattern(
        resource_id: Uuid,
        range: TimeRange,
        pattern: RecurrencePattern,
        anchor: NaiveDate,
        until: NaiveDate,
    ) -> Self {
        Self {
            resource_id,
            range,
            recurrence: Recurrence::Pattern { pattern, anchor },
            effective_from: Some(anchor),
            effective_until: Some(until),
            kind: BookingKind::Recurring,
            source_id: None,
        }
    }

    /// Like [`RecurringRule::pattern`], for a rule that has not been booked
    /// yet. Rejects ranges that end before they start or run longer than
    /// [`MAX_RECURRENCE_SPAN_DAYS`].
    pub fn candidate(
        resource_id: Uuid,
        range: TimeRange,
        pattern: RecurrencePattern,
        anchor: NaiveDate,
        until: NaiveDate,
    ) -> Result<Self, ReservationError> {
        if until < anchor {
            return Err(ReservationError::InvalidRecurrenceRange(format!(
                "end date {until} is before anchor date {anchor}"
            )));
        }
        let span = (until - anchor).num_days() + 1;
        if span > MAX_RECURRENCE_SPAN_DAYS {
            return Err(ReservationError::InvalidRecurrenceRange(format!(
                "{span} days exceeds the {MAX_RECURRENCE_SPAN_DAYS} day limit"
            )));
        }
        Ok(Self::pattern(resource_id, range, pattern, anchor, until))
    }

    /// A weekly class slot, optionally bounded by an active window.
    pub fn day_of_week(
        resource_id: Uuid,
        range: TimeRange,
        day_of_week: u8,
        effective_from: Option<NaiveDate>,
        effective_until: Option<NaiveDate>,
    ) -> Self {
        Self {
            resource_id,
            range,
            recurrence: Recurrence::DayOfWeek(day_of_week),
            effective_from,
            effective_until,
            kind: BookingKind::ClassSchedule,
            source_id: None,
        }
    }

    pub fn with_source(mut self, source_id: Uuid) -> Self {
        self.source_id = Some(source_id);
        self
    }

    /// Whether `date` falls inside the effective window, ignoring the pattern.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| date >= from)
            && self.effective_until.map_or(true, |until| date <= until)
    }

    pub fn selects(&self, date: NaiveDate) -> bool {
        self.covers(date) && self.recurrence.matches(date)
    }

    /// The concrete interval this rule occupies on `date`, if any.
    pub fn occurrence_on(&self, date: NaiveDate) -> Option<BookingInterval> {
        self.selects(date).then(|| BookingInterval {
            resource_id: self.resource_id,
            date,
            range: self.range,
            kind: self.kind,
            source_id: self.source_id,
        })
    }

    /// Every date the rule selects, in ascending order.
    ///
    /// Fails for rules without both bounds, since those never terminate.
    pub fn dates(&self) -> Result<impl Iterator<Item = NaiveDate> + '_, ReservationError> {
        let (Some(from), Some(until)) = (self.effective_from, self.effective_until) else {
            return Err(ReservationError::InvalidRecurrenceRange(
                "rule has no bounded effective range".to_string(),
            ));
        };
        Ok(from
            .iter_days()
            .take_while(move |d| *d <= until)
            .filter(move |d| self.recurrence.matches(*d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn nine_to_ten() -> TimeRange {
        TimeRange::parse("09:00", "10:00").unwrap()
    }

    fn rule(pattern: RecurrencePattern, anchor: &str, until: &str) -> RecurringRule {
        RecurringRule::pattern(Uuid::nil(), nine_to_ten(), pattern, date(anchor), date(until))
    }

    #[test]
    fn parses_known_patterns_only() {
        assert_eq!("weekly".parse::<RecurrencePattern>().unwrap(), RecurrencePattern::Weekly);
        assert!(matches!(
            "yearly".parse::<RecurrencePattern>(),
            Err(ReservationError::InvalidRecurrencePattern(p)) if p == "yearly"
        ));
    }

    #[test]
    fn daily_selects_every_date_in_range() {
        let r = rule(RecurrencePattern::Daily, "2025-03-03", "2025-03-07");
        assert_eq!(r.dates().unwrap().count(), 5);
        assert!(!r.selects(date("2025-03-02")));
        assert!(!r.selects(date("2025-03-08")));
    }

    #[test]
    fn weekly_follows_anchor_weekday() {
        // 2025-03-03 is a Monday.
        let r = rule(RecurrencePattern::Weekly, "2025-03-03", "2025-03-31");
        let dates: Vec<_> = r.dates().unwrap().collect();
        assert_eq!(
            dates,
            vec![
                date("2025-03-03"),
                date("2025-03-10"),
                date("2025-03-17"),
                date("2025-03-24"),
                date("2025-03-31"),
            ]
        );
        assert!(r.occurrence_on(date("2025-03-11")).is_none());
    }

    #[test]
    fn monthly_skips_months_without_the_anchor_day() {
        let r = rule(RecurrencePattern::Monthly, "2025-01-31", "2025-05-31");
        let dates: Vec<_> = r.dates().unwrap().collect();
        assert_eq!(
            dates,
            vec![date("2025-01-31"), date("2025-03-31"), date("2025-05-31")]
        );
    }

    #[test]
    fn occurrence_carries_rule_range_and_kind() {
        let r = rule(RecurrencePattern::Daily, "2025-03-03", "2025-03-07");
        let occ = r.occurrence_on(date("2025-03-05")).unwrap();
        assert_eq!(occ.date, date("2025-03-05"));
        assert_eq!(occ.range, nine_to_ten());
        assert_eq!(occ.kind, BookingKind::Recurring);
    }

    #[test]
    fn day_of_week_uses_sunday_zero() {
        // 2025-03-09 is a Sunday, 2025-03-12 a Wednesday.
        let sunday = RecurringRule::day_of_week(Uuid::nil(), nine_to_ten(), 0, None, None);
        assert!(sunday.selects(date("2025-03-09")));
        assert!(!sunday.selects(date("2025-03-12")));

        let wednesday = RecurringRule::day_of_week(
            Uuid::nil(),
            nine_to_ten(),
            3,
            Some(date("2025-03-01")),
            Some(date("2025-03-31")),
        );
        assert!(wednesday.selects(date("2025-03-12")));
        assert!(!wednesday.selects(date("2025-04-02")));
        assert_eq!(
            wednesday.occurrence_on(date("2025-03-12")).unwrap().kind,
            BookingKind::ClassSchedule
        );
    }

    #[test]
    fn unbounded_rules_cannot_be_enumerated() {
        let r = RecurringRule::day_of_week(Uuid::nil(), nine_to_ten(), 1, None, None);
        assert!(r.dates().is_err());
    }

    #[test]
    fn candidate_validates_span() {
        let range = nine_to_ten();
        assert!(RecurringRule::candidate(
            Uuid::nil(),
            range,
            RecurrencePattern::Daily,
            date("2025-03-10"),
            date("2025-03-09"),
        )
        .is_err());
        assert!(RecurringRule::candidate(
            Uuid::nil(),
            range,
            RecurrencePattern::Weekly,
            date("2025-01-01"),
            date("2026-06-01"),
        )
        .is_err());
        assert!(RecurringRule::candidate(
            Uuid::nil(),
            range,
            RecurrencePattern::Weekly,
            date("2025-01-01"),
            date("2025-12-31"),
        )
        .is_ok());
    }
}

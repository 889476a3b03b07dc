use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;

/// A same-day wall-clock range, half-open: `[start, end)`, at minute
/// precision.
///
/// The only way to build one is [`TimeRange::new`], which drops seconds and
/// then rejects empty and inverted ranges. Everything downstream can rely on
/// `start < end` surviving a round trip through storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    start: NaiveTime,
    #[serde(with = "hhmm")]
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ReservationError> {
        let (start, end) = (hhmm::truncate(start), hhmm::truncate(end));
        if start >= end {
            return Err(ReservationError::InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two `HH:MM` (or `HH:MM:SS`) strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ReservationError> {
        let start = hhmm::parse(start)
            .map_err(|_| ReservationError::Validation(format!("invalid start time: {start}")))?;
        let end = hhmm::parse(end)
            .map_err(|_| ReservationError::Validation(format!("invalid end time: {end}")))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Half-open overlap. Back-to-back ranges do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(with = "hhmm")]
            start: NaiveTime,
            #[serde(with = "hhmm")]
            end: NaiveTime,
        }

        let raw = Raw::deserialize(deserializer)?;
        TimeRange::new(raw.start, raw.end).map_err(serde::de::Error::custom)
    }
}

/// Which kind of commitment produced a [`BookingInterval`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Single,
    Recurring,
    ClassSchedule,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Recurring => "recurring",
            Self::ClassSchedule => "class_schedule",
        }
    }
}

/// A concrete occupied slot of a resource on one calendar date.
///
/// Intervals are projections built at query time from reservations and
/// class schedules. `source_id` points back at the record that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingInterval {
    pub resource_id: Uuid,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub range: TimeRange,
    pub kind: BookingKind,
    pub source_id: Option<Uuid>,
}

impl BookingInterval {
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.range.overlaps(range)
    }
}

/// Serde helpers for wall-clock times rendered as `HH:MM`.
///
/// Deserialization also accepts `HH:MM:SS`, which is what HTML time inputs
/// send when a step below one minute is configured.
pub mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn format(time: &NaiveTime) -> String {
        time.format(FORMAT).to_string()
    }

    /// Parse `HH:MM` or `HH:MM:SS`. Seconds are dropped.
    pub fn parse(s: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(s, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(truncate)
    }

    /// The start of the minute containing `time`.
    pub fn truncate(time: NaiveTime) -> NaiveTime {
        NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
    }

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Same format for `Option<NaiveTime>` fields. Pair with `#[serde(default)]`.
    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match time {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

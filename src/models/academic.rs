use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;

/// A school year, e.g. "2025-2026", split into terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicYear {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A semester or trimester inside an [`AcademicYear`].
///
/// At most one term is current at a time. Class schedules linked to a term
/// run only between its start and end dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicTerm {
    pub id: Uuid,
    pub academic_year_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

impl AcademicTerm {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// An academic year with its terms, ordered by start date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicYearWithTerms {
    #[serde(flatten)]
    pub year: AcademicYear,
    pub terms: Vec<AcademicTerm>,
}

impl AcademicYearWithTerms {
    pub fn has_current_term(&self) -> bool {
        self.terms.iter().any(|t| t.is_current)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAcademicYearInput {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CreateAcademicYearInput {
    pub fn validate(&self) -> Result<(), ReservationError> {
        if self.name.trim().is_empty() {
            return Err(ReservationError::Validation("name is required".to_string()));
        }
        if self.end_date <= self.start_date {
            return Err(ReservationError::Validation(
                "end_date must be after start_date".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAcademicTermInput {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Make this the current term, replacing any other.
    #[serde(default)]
    pub is_current: bool,
}

impl CreateAcademicTermInput {
    /// Check the term against the year it is being added to.
    pub fn validate(&self, year: &AcademicYear) -> Result<(), ReservationError> {
        if self.name.trim().is_empty() {
            return Err(ReservationError::Validation("name is required".to_string()));
        }
        if self.end_date <= self.start_date {
            return Err(ReservationError::Validation(
                "end_date must be after start_date".to_string(),
            ));
        }
        if self.start_date < year.start_date || self.end_date > year.end_date {
            return Err(ReservationError::Validation(format!(
                "term must fall within academic year {} ({} to {})",
                year.name, year.start_date, year.end_date
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn year() -> AcademicYear {
        AcademicYear {
            id: Uuid::new_v4(),
            name: "2025-2026".to_string(),
            start_date: date("2025-08-01"),
            end_date: date("2026-05-31"),
            created_at: Utc::now(),
        }
    }

    fn term(start: &str, end: &str) -> CreateAcademicTermInput {
        CreateAcademicTermInput {
            name: "First Semester".to_string(),
            start_date: date(start),
            end_date: date(end),
            is_current: false,
        }
    }

    #[test]
    fn term_must_fit_inside_its_year() {
        assert!(term("2025-08-11", "2025-12-19").validate(&year()).is_ok());
        assert!(matches!(
            term("2025-07-28", "2025-12-19").validate(&year()),
            Err(ReservationError::Validation(_))
        ));
        assert!(matches!(
            term("2026-01-05", "2026-06-15").validate(&year()),
            Err(ReservationError::Validation(_))
        ));
    }

    #[test]
    fn term_dates_must_be_ordered() {
        assert!(term("2025-12-19", "2025-08-11").validate(&year()).is_err());
    }

    #[test]
    fn year_requires_a_name() {
        let input = CreateAcademicYearInput {
            name: " ".to_string(),
            start_date: date("2025-08-01"),
            end_date: date("2026-05-31"),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn contains_is_inclusive() {
        let t = AcademicTerm {
            id: Uuid::new_v4(),
            academic_year_id: Uuid::new_v4(),
            name: "First Semester".to_string(),
            start_date: date("2025-08-11"),
            end_date: date("2025-12-19"),
            is_current: true,
            created_at: Utc::now(),
        };
        assert!(t.contains(date("2025-08-11")));
        assert!(t.contains(date("2025-12-19")));
        assert!(!t.contains(date("2025-12-20")));
    }
}

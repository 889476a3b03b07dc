use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;

/// A request to borrow a piece of equipment for a period.
///
/// # Lifecycle
/// `Pending` → `Approved` → `Returned`, or `Pending` → `Rejected`.
/// "Overdue" is never stored: it is derived from the approval, the missing
/// return and the current time, see [`EquipmentRequest::is_overdue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub equipment_name: String,
    pub purpose: String,
    pub requested_from: NaiveDateTime,
    pub requested_until: NaiveDateTime,
    pub status: EquipmentRequestStatus,
    pub returned_at: Option<NaiveDateTime>,
    pub return_condition: Option<String>,
    pub return_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EquipmentRequest {
    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }

    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.status == EquipmentRequestStatus::Approved
            && !self.is_returned()
            && now > self.requested_until
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentRequestStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl EquipmentRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }

    pub fn transition(self, next: Self) -> Result<Self, ReservationError> {
        match (self, next) {
            (Self::Pending, Self::Approved)
            | (Self::Pending, Self::Rejected)
            | (Self::Approved, Self::Returned) => Ok(next),
            (from, to) => Err(ReservationError::InvalidTransition {
                entity: "equipment request",
                action: match to {
                    Self::Approved => "approve",
                    Self::Rejected => "reject",
                    Self::Returned => "return",
                    Self::Pending => "reopen",
                },
                status: from.as_str(),
            }),
        }
    }
}

/// Input for requesting equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEquipmentRequestInput {
    pub user_id: Uuid,
    pub equipment_name: String,
    pub purpose: String,
    pub requested_from: NaiveDateTime,
    pub requested_until: NaiveDateTime,
}

impl CreateEquipmentRequestInput {
    pub fn validate(&self) -> Result<(), ReservationError> {
        if self.equipment_name.trim().is_empty() {
            return Err(ReservationError::Validation(
                "equipment_name is required".to_string(),
            ));
        }
        if self.requested_until <= self.requested_from {
            return Err(ReservationError::Validation(
                "requested_until must be after requested_from".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input for recording the return of borrowed equipment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnEquipmentInput {
    pub return_condition: Option<String>,
    pub return_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn request(status: EquipmentRequestStatus) -> EquipmentRequest {
        EquipmentRequest {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            equipment_name: "Projector".to_string(),
            purpose: "Thesis defense".to_string(),
            requested_from: at(3, 8),
            requested_until: at(3, 17),
            status,
            returned_at: None,
            return_condition: None,
            return_notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn overdue_requires_approval_and_missing_return() {
        let approved = request(EquipmentRequestStatus::Approved);
        assert!(!approved.is_overdue(at(3, 16)));
        assert!(!approved.is_overdue(at(3, 17)));
        assert!(approved.is_overdue(at(3, 18)));

        assert!(!request(EquipmentRequestStatus::Pending).is_overdue(at(4, 9)));

        let mut returned = request(EquipmentRequestStatus::Approved);
        returned.returned_at = Some(at(3, 18));
        assert!(!returned.is_overdue(at(4, 9)));
    }

    #[test]
    fn transitions_follow_the_borrowing_flow() {
        use EquipmentRequestStatus::*;
        assert_eq!(Pending.transition(Approved).unwrap(), Approved);
        assert_eq!(Pending.transition(Rejected).unwrap(), Rejected);
        assert_eq!(Approved.transition(Returned).unwrap(), Returned);
        assert!(Pending.transition(Returned).is_err());
        assert!(Rejected.transition(Approved).is_err());
        assert!(Returned.transition(Returned).is_err());
    }
}

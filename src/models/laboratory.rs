use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable computer laboratory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Laboratory {
    pub id: Uuid,
    pub name: String,
    /// Number of workstations.
    pub capacity: u32,
    pub status: LaboratoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a laboratory is open for reservations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaboratoryStatus {
    Active,
    Maintenance,
    Inactive,
}

impl LaboratoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "maintenance" => Some(Self::Maintenance),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Input for registering a laboratory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLaboratoryInput {
    pub name: String,
    pub capacity: u32,
    /// Defaults to `Active` if not specified.
    pub status: Option<LaboratoryStatus>,
}

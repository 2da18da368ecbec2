//! Technician models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Availability of a technician
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TechnicianStatus {
    #[default]
    Available,
    Busy,
    Inactive,
}

impl TechnicianStatus {
    /// Inactive technicians cannot receive new jobs
    pub fn can_take_jobs(&self) -> bool {
        !matches!(self, TechnicianStatus::Inactive)
    }
}

/// A field technician
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Technician {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub status: TechnicianStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reduced technician view handed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicianSummary {
    pub id: Uuid,
    pub name: String,
    pub specialty: Option<String>,
}

impl From<Technician> for TechnicianSummary {
    fn from(t: Technician) -> Self {
        Self {
            id: t.id,
            name: t.name,
            specialty: t.specialty,
        }
    }
}

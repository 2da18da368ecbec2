//! Service job models and status rules

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a service job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Scheduled => "scheduled",
            ServiceStatus::InProgress => "in_progress",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Cancelled)
    }

    /// Pending, scheduled and in-progress jobs still need work
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Pending, InProgress)
                | (Pending, Cancelled)
                | (Scheduled, Pending)
                | (Scheduled, InProgress)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work requested
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Installation,
    Repair,
    Maintenance,
    Inspection,
}

/// Urgency of a job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ServicePriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A service job performed for a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ServiceJob {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub service_type: ServiceType,
    pub priority: ServicePriority,
    pub status: ServiceStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub diagnosis: Option<String>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Timestamps and hours to write when a job moves to a new status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusStamps {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_hours: Option<Decimal>,
}

impl ServiceJob {
    /// Work out the timestamps for a move to `next` at `now`.
    ///
    /// Existing values are kept; `actual_hours` is derived from the start time
    /// on completion unless one was supplied.
    pub fn stamps_for(
        &self,
        next: ServiceStatus,
        now: DateTime<Utc>,
        actual_hours: Option<Decimal>,
    ) -> StatusStamps {
        let mut started_at = self.started_at;
        let mut completed_at = self.completed_at;
        let mut hours = actual_hours.or(self.actual_hours);

        match next {
            ServiceStatus::InProgress => {
                started_at = started_at.or(Some(now));
            }
            ServiceStatus::Completed => {
                completed_at = Some(now);
                if hours.is_none() {
                    hours = started_at.map(|start| elapsed_hours(start, now));
                }
            }
            _ => {}
        }

        StatusStamps {
            started_at,
            completed_at,
            actual_hours: hours,
        }
    }
}

/// Hours between two instants, rounded to 2 dp, never negative
pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let seconds = (to - from).num_seconds().max(0);
    (Decimal::from(seconds) / Decimal::from(3600))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

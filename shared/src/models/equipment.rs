//! Client equipment models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operating condition of a piece of equipment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    #[default]
    Operational,
    NeedsRepair,
    OutOfService,
    Retired,
}

/// Equipment installed at a client site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Equipment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub equipment_type: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_expiry: Option<NaiveDate>,
    pub status: EquipmentStatus,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchase and warranty dates must be in order when both are given
pub fn validate_warranty_dates(
    purchase_date: Option<NaiveDate>,
    warranty_expiry: Option<NaiveDate>,
) -> Result<(), &'static str> {
    match (purchase_date, warranty_expiry) {
        (Some(purchased), Some(expiry)) if expiry < purchased => {
            Err("Warranty expiry cannot be before the purchase date")
        }
        _ => Ok(()),
    }
}

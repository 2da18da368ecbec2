//! Equipment service for client-owned machines and their service history

use chrono::NaiveDate;
use serde::Deserialize;
use shared::{
    search_pattern, validate_warranty_dates, Actor, Equipment, EquipmentStatus, ServiceJob,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::service_job::SERVICE_COLUMNS;

pub(crate) const EQUIPMENT_COLUMNS: &str = "e.id, e.client_id, e.name, e.equipment_type, e.brand, \
     e.model, e.serial_number, e.location, e.purchase_date, e.warranty_expiry, e.status, \
     e.image_url, e.notes, e.created_at, e.updated_at";

/// $1 restricts to one owner, $2 to owners a technician has worked for
const VISIBLE: &str = "($1::uuid IS NULL OR e.client_id = $1) \
     AND ($2::uuid IS NULL OR EXISTS \
         (SELECT 1 FROM services s WHERE s.client_id = e.client_id AND s.technician_id = $2))";

#[derive(Clone)]
pub struct EquipmentService {
    db: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<EquipmentStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEquipmentInput {
    /// Required for admins; clients always register for themselves
    pub client_id: Option<Uuid>,
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: String,
    #[validate(custom = "shared::not_blank", length(max = 120))]
    pub equipment_type: String,
    #[validate(length(max = 120))]
    pub brand: Option<String>,
    #[validate(length(max = 120))]
    pub model: Option<String>,
    #[validate(custom = "shared::serial_number")]
    pub serial_number: Option<String>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_expiry: Option<NaiveDate>,
    pub status: Option<EquipmentStatus>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEquipmentInput {
    /// Only admins may move equipment to another client
    pub client_id: Option<Uuid>,
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: Option<String>,
    #[validate(custom = "shared::not_blank", length(max = 120))]
    pub equipment_type: Option<String>,
    #[validate(length(max = 120))]
    pub brand: Option<String>,
    #[validate(length(max = 120))]
    pub model: Option<String>,
    #[validate(custom = "shared::serial_number")]
    pub serial_number: Option<String>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_expiry: Option<NaiveDate>,
    pub status: Option<EquipmentStatus>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub notes: Option<String>,
}

/// Owner of new equipment: clients register for themselves, admins must name the client
fn owner_for_create(actor: &Actor, requested: Option<Uuid>) -> AppResult<Uuid> {
    if let Some(own) = actor.client_id() {
        return Ok(own);
    }
    actor.require_admin()?;
    requested.ok_or_else(|| AppError::validation("client_id", "client_id is required"))
}

/// Equipment with service history keeps its owner and its row
fn check_unreferenced(services: i64, action: &str) -> AppResult<()> {
    if services > 0 {
        return Err(AppError::validation(
            "equipment_id",
            format!(
                "Equipment is referenced by {} service(s) and cannot be {}",
                services, action
            ),
        ));
    }
    Ok(())
}

fn check_dates(purchase: Option<NaiveDate>, expiry: Option<NaiveDate>) -> AppResult<()> {
    validate_warranty_dates(purchase, expiry).map_err(|m| AppError::validation("warranty_expiry", m))
}

impl EquipmentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, actor: &Actor, filter: EquipmentFilter) -> AppResult<Vec<Equipment>> {
        let scope = actor.scope()?;
        let search = search_pattern(filter.search.as_deref());

        let equipment = sqlx::query_as::<_, Equipment>(&format!(
            r#"
            SELECT {} FROM equipment e
            WHERE {}
              AND ($3::uuid IS NULL OR e.client_id = $3)
              AND ($4::varchar IS NULL OR e.status = $4)
              AND ($5::text IS NULL OR e.name ILIKE $5 OR e.serial_number ILIKE $5
                   OR e.brand ILIKE $5 OR e.model ILIKE $5)
            ORDER BY e.name ASC
            "#,
            EQUIPMENT_COLUMNS, VISIBLE
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(&search)
        .fetch_all(&self.db)
        .await?;

        Ok(equipment)
    }

    pub async fn get(&self, actor: &Actor, equipment_id: Uuid) -> AppResult<Equipment> {
        let scope = actor.scope()?;

        sqlx::query_as::<_, Equipment>(&format!(
            "SELECT {} FROM equipment e WHERE {} AND e.id = $3",
            EQUIPMENT_COLUMNS, VISIBLE
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(equipment_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Equipment"))
    }

    pub async fn create(&self, actor: &Actor, input: CreateEquipmentInput) -> AppResult<Equipment> {
        input.validate()?;
        let client_id = owner_for_create(actor, input.client_id)?;
        check_dates(input.purchase_date, input.warranty_expiry)?;
        self.ensure_client_exists(client_id).await?;

        let serial = input.serial_number.as_deref().map(str::trim);
        if let Some(serial) = serial {
            self.ensure_serial_free(serial, None).await?;
        }

        let equipment = sqlx::query_as::<_, Equipment>(&format!(
            r#"
            INSERT INTO equipment AS e (client_id, name, equipment_type, brand, model, serial_number,
                                        location, purchase_date, warranty_expiry, status, image_url, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            EQUIPMENT_COLUMNS
        ))
        .bind(client_id)
        .bind(input.name.trim())
        .bind(input.equipment_type.trim())
        .bind(&input.brand)
        .bind(&input.model)
        .bind(serial)
        .bind(&input.location)
        .bind(input.purchase_date)
        .bind(input.warranty_expiry)
        .bind(input.status.unwrap_or_default())
        .bind(&input.image_url)
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(equipment_id = %equipment.id, %client_id, "Registered equipment");
        Ok(equipment)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        equipment_id: Uuid,
        input: UpdateEquipmentInput,
    ) -> AppResult<Equipment> {
        input.validate()?;
        let existing = self.get(actor, equipment_id).await?;

        if !actor.can_manage_equipment(existing.client_id) {
            return Err(AppError::Forbidden(
                "Only an admin or the owning client can edit this equipment".to_string(),
            ));
        }

        let client_id = match input.client_id {
            Some(new_owner) if new_owner != existing.client_id => {
                if !actor.is_admin() {
                    return Err(AppError::Forbidden(
                        "Equipment cannot be moved to another client".to_string(),
                    ));
                }
                self.ensure_client_exists(new_owner).await?;
                let services = self.service_count(equipment_id).await?;
                check_unreferenced(services, "moved to another client")?;
                new_owner
            }
            _ => existing.client_id,
        };

        let purchase_date = input.purchase_date.or(existing.purchase_date);
        let warranty_expiry = input.warranty_expiry.or(existing.warranty_expiry);
        check_dates(purchase_date, warranty_expiry)?;

        let serial = input.serial_number.as_deref().map(str::trim);
        if let Some(serial) = serial {
            if existing.serial_number.as_deref() != Some(serial) {
                self.ensure_serial_free(serial, Some(equipment_id)).await?;
            }
        }

        let equipment = sqlx::query_as::<_, Equipment>(&format!(
            r#"
            UPDATE equipment e
            SET client_id = $2, name = $3, equipment_type = $4, brand = $5, model = $6,
                serial_number = $7, location = $8, purchase_date = $9, warranty_expiry = $10,
                status = $11, image_url = $12, notes = $13
            WHERE e.id = $1
            RETURNING {}
            "#,
            EQUIPMENT_COLUMNS
        ))
        .bind(equipment_id)
        .bind(client_id)
        .bind(input.name.as_deref().map(str::trim).unwrap_or(existing.name.as_str()))
        .bind(
            input
                .equipment_type
                .as_deref()
                .map(str::trim)
                .unwrap_or(existing.equipment_type.as_str()),
        )
        .bind(input.brand.or(existing.brand))
        .bind(input.model.or(existing.model))
        .bind(serial.or(existing.serial_number.as_deref()))
        .bind(input.location.or(existing.location))
        .bind(purchase_date)
        .bind(warranty_expiry)
        .bind(input.status.unwrap_or(existing.status))
        .bind(input.image_url.or(existing.image_url))
        .bind(input.notes.or(existing.notes))
        .fetch_one(&self.db)
        .await?;

        Ok(equipment)
    }

    /// Delete equipment that no service refers to
    pub async fn delete(&self, actor: &Actor, equipment_id: Uuid) -> AppResult<()> {
        let existing = self.get(actor, equipment_id).await?;
        if !actor.can_manage_equipment(existing.client_id) {
            return Err(AppError::Forbidden(
                "Only an admin or the owning client can delete this equipment".to_string(),
            ));
        }

        let services = self.service_count(equipment_id).await?;
        check_unreferenced(services, "deleted")?;

        sqlx::query("DELETE FROM equipment WHERE id = $1")
            .bind(equipment_id)
            .execute(&self.db)
            .await?;

        tracing::info!(%equipment_id, "Deleted equipment");
        Ok(())
    }

    /// Services performed on a piece of equipment, newest first
    pub async fn history(&self, actor: &Actor, equipment_id: Uuid) -> AppResult<Vec<ServiceJob>> {
        self.get(actor, equipment_id).await?;
        let technician_id = actor.scope()?.technician_filter();

        let services = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            SELECT {} FROM services s
            WHERE s.equipment_id = $1 AND ($2::uuid IS NULL OR s.technician_id = $2)
            ORDER BY s.created_at DESC
            "#,
            SERVICE_COLUMNS
        ))
        .bind(equipment_id)
        .bind(technician_id)
        .fetch_all(&self.db)
        .await?;

        Ok(services)
    }

    async fn service_count(&self, equipment_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM services WHERE equipment_id = $1",
        )
        .bind(equipment_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    async fn ensure_client_exists(&self, client_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_one(&self.db)
            .await?;
        if exists == 0 {
            return Err(AppError::validation("client_id", "Client does not exist"));
        }
        Ok(())
    }

    async fn ensure_serial_free(&self, serial: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM equipment WHERE serial_number = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(serial)
        .bind(except)
        .fetch_one(&self.db)
        .await?;

        if taken > 0 {
            return Err(AppError::Conflict {
                resource: "serial_number".to_string(),
                message: format!("Equipment with serial number {} already exists", serial),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::UserRole;

    fn actor(role: UserRole, profile_id: Option<Uuid>) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
            profile_id,
        }
    }

    #[test]
    fn clients_always_own_what_they_register() {
        let own = Uuid::new_v4();
        let client = actor(UserRole::Client, Some(own));
        assert_eq!(owner_for_create(&client, Some(Uuid::new_v4())).unwrap(), own);
        assert_eq!(owner_for_create(&client, None).unwrap(), own);
    }

    #[test]
    fn admins_must_name_the_owner() {
        let admin = actor(UserRole::Admin, None);
        let target = Uuid::new_v4();
        assert_eq!(owner_for_create(&admin, Some(target)).unwrap(), target);
        assert!(matches!(
            owner_for_create(&admin, None),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn technicians_cannot_register_equipment() {
        let tech = actor(UserRole::Technician, Some(Uuid::new_v4()));
        assert!(matches!(
            owner_for_create(&tech, Some(Uuid::new_v4())),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn warranty_before_purchase_is_rejected() {
        let purchase = NaiveDate::from_ymd_opt(2024, 5, 1);
        let expiry = NaiveDate::from_ymd_opt(2023, 5, 1);
        assert!(check_dates(purchase, expiry).is_err());
        assert!(check_dates(purchase, None).is_ok());
    }

    #[test]
    fn serviced_equipment_stays_put() {
        assert!(check_unreferenced(0, "moved to another client").is_ok());
        match check_unreferenced(3, "moved to another client") {
            Err(AppError::Validation { field, message }) => {
                assert_eq!(field, "equipment_id");
                assert!(message.contains("3 service(s)"));
                assert!(message.ends_with("moved to another client"));
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }
}

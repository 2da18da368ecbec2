//! Technician service

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    normalize_email, search_pattern, validate_non_negative, Actor, ServiceJob, Technician,
    TechnicianStatus, TechnicianSummary, UserRole,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::auth::insert_user;
use crate::services::service_job::SERVICE_COLUMNS;

pub(crate) const TECHNICIAN_COLUMNS: &str = "t.id, t.user_id, t.name, t.email, t.phone, \
     t.specialty, t.hourly_rate, t.status, t.created_at, t.updated_at";

/// Technician service
#[derive(Clone)]
pub struct TechnicianService {
    db: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TechnicianFilter {
    pub status: Option<TechnicianStatus>,
    pub specialty: Option<String>,
    pub search: Option<String>,
}

/// Technician listing: full rows for staff, summaries for clients
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TechnicianListing {
    Full(Vec<Technician>),
    Summary(Vec<TechnicianSummary>),
}

/// A single technician as the caller may see it
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TechnicianView {
    Full(Technician),
    Summary(TechnicianSummary),
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTechnicianInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "shared::phone")]
    pub phone: Option<String>,
    #[validate(length(max = 120))]
    pub specialty: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub status: Option<TechnicianStatus>,
    /// Creates a technician login when present
    #[validate(custom = "shared::password")]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTechnicianInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(custom = "shared::phone")]
    pub phone: Option<String>,
    #[validate(length(max = 120))]
    pub specialty: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub status: Option<TechnicianStatus>,
}

impl UpdateTechnicianInput {
    /// Status and rate are reserved for admins
    pub fn touches_admin_fields(&self) -> bool {
        self.status.is_some() || self.hourly_rate.is_some()
    }
}

/// Clients see the same technicians in detail as in the listing: available
/// ones as summaries, everyone else as not found
fn view_for(actor: &Actor, technician: Technician) -> AppResult<TechnicianView> {
    match actor.role {
        UserRole::Client if technician.status == TechnicianStatus::Available => {
            Ok(TechnicianView::Summary(TechnicianSummary::from(technician)))
        }
        UserRole::Client => Err(AppError::not_found("Technician")),
        UserRole::Admin | UserRole::Technician => Ok(TechnicianView::Full(technician)),
    }
}

fn check_rate(rate: Option<Decimal>) -> AppResult<()> {
    match rate {
        Some(rate) => validate_non_negative(rate).map_err(|m| AppError::validation("hourly_rate", m)),
        None => Ok(()),
    }
}

impl TechnicianService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List technicians; clients only see available ones, without contact details
    pub async fn list(&self, actor: &Actor, filter: TechnicianFilter) -> AppResult<TechnicianListing> {
        let for_client = actor.role == UserRole::Client;
        let status = if for_client {
            Some(TechnicianStatus::Available)
        } else {
            filter.status
        };
        let search = search_pattern(filter.search.as_deref());
        let specialty = search_pattern(filter.specialty.as_deref());

        let technicians = sqlx::query_as::<_, Technician>(&format!(
            r#"
            SELECT {} FROM technicians t
            WHERE ($1::varchar IS NULL OR t.status = $1)
              AND ($2::text IS NULL OR t.specialty ILIKE $2)
              AND ($3::text IS NULL OR t.name ILIKE $3 OR t.email ILIKE $3)
            ORDER BY t.name ASC
            "#,
            TECHNICIAN_COLUMNS
        ))
        .bind(status)
        .bind(&specialty)
        .bind(&search)
        .fetch_all(&self.db)
        .await?;

        if for_client {
            Ok(TechnicianListing::Summary(
                technicians.into_iter().map(TechnicianSummary::from).collect(),
            ))
        } else {
            Ok(TechnicianListing::Full(technicians))
        }
    }

    pub async fn get(&self, actor: &Actor, technician_id: Uuid) -> AppResult<TechnicianView> {
        let technician = self.find(technician_id).await?;
        view_for(actor, technician)
    }

    pub async fn create(&self, actor: &Actor, input: CreateTechnicianInput) -> AppResult<Technician> {
        actor.require_admin()?;
        input.validate()?;
        check_rate(input.hourly_rate)?;

        let email = normalize_email(&input.email);
        self.ensure_email_free(&email, None).await?;

        let mut tx = self.db.begin().await?;

        let user_id = match &input.password {
            Some(password) => Some(
                insert_user(&mut *tx, &email, password, &input.name, UserRole::Technician).await?,
            ),
            None => None,
        };

        let technician = sqlx::query_as::<_, Technician>(&format!(
            r#"
            INSERT INTO technicians AS t (user_id, name, email, phone, specialty, hourly_rate, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TECHNICIAN_COLUMNS
        ))
        .bind(user_id)
        .bind(input.name.trim())
        .bind(&email)
        .bind(&input.phone)
        .bind(&input.specialty)
        .bind(input.hourly_rate)
        .bind(input.status.unwrap_or_default())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(technician_id = %technician.id, with_login = user_id.is_some(), "Created technician");
        Ok(technician)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        technician_id: Uuid,
        input: UpdateTechnicianInput,
    ) -> AppResult<Technician> {
        input.validate()?;
        actor.check_technician_edit(technician_id, input.touches_admin_fields())?;
        check_rate(input.hourly_rate)?;

        let existing = self.find(technician_id).await?;

        let email = input.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            if *email != existing.email {
                self.ensure_email_free(email, Some(technician_id)).await?;
            }
        }

        let mut tx = self.db.begin().await?;

        let technician = sqlx::query_as::<_, Technician>(&format!(
            r#"
            UPDATE technicians t
            SET name = $2, email = $3, phone = $4, specialty = $5, hourly_rate = $6, status = $7
            WHERE t.id = $1
            RETURNING {}
            "#,
            TECHNICIAN_COLUMNS
        ))
        .bind(technician_id)
        .bind(input.name.as_deref().map(str::trim).unwrap_or(existing.name.as_str()))
        .bind(email.as_ref().unwrap_or(&existing.email))
        .bind(input.phone.or(existing.phone))
        .bind(input.specialty.or(existing.specialty))
        .bind(input.hourly_rate.or(existing.hourly_rate))
        .bind(input.status.unwrap_or(existing.status))
        .fetch_one(&mut *tx)
        .await?;

        if let Some(user_id) = technician.user_id {
            if technician.email != existing.email {
                sqlx::query("UPDATE users SET email = $1 WHERE id = $2")
                    .bind(&technician.email)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            // An inactive technician cannot sign in
            sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
                .bind(technician.status != TechnicianStatus::Inactive)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(technician)
    }

    /// Delete a technician without open jobs
    pub async fn delete(&self, actor: &Actor, technician_id: Uuid) -> AppResult<()> {
        actor.require_admin()?;
        let technician = self.find(technician_id).await?;

        let open_jobs = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM services
            WHERE technician_id = $1 AND status IN ('pending', 'scheduled', 'in_progress')
            "#,
        )
        .bind(technician_id)
        .fetch_one(&self.db)
        .await?;

        if open_jobs > 0 {
            return Err(AppError::validation(
                "technician_id",
                format!("Technician has {} open service(s) and cannot be deleted", open_jobs),
            ));
        }

        let mut tx = self.db.begin().await?;
        // Closed jobs keep their history without the technician
        sqlx::query("UPDATE services SET technician_id = NULL WHERE technician_id = $1")
            .bind(technician_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM technicians WHERE id = $1")
            .bind(technician_id)
            .execute(&mut *tx)
            .await?;
        if let Some(user_id) = technician.user_id {
            sqlx::query("UPDATE users SET is_active = false WHERE id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(%technician_id, "Deleted technician");
        Ok(())
    }

    /// Jobs assigned to a technician; admins or the technician only
    pub async fn services(&self, actor: &Actor, technician_id: Uuid) -> AppResult<Vec<ServiceJob>> {
        if !actor.is_admin() && actor.technician_id() != Some(technician_id) {
            return Err(AppError::Forbidden(
                "Only an admin or the technician can list these services".to_string(),
            ));
        }
        self.find(technician_id).await?;

        let services = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            SELECT {} FROM services s
            WHERE s.technician_id = $1
            ORDER BY s.scheduled_at ASC NULLS LAST, s.created_at DESC
            "#,
            SERVICE_COLUMNS
        ))
        .bind(technician_id)
        .fetch_all(&self.db)
        .await?;

        Ok(services)
    }

    pub(crate) async fn find(&self, technician_id: Uuid) -> AppResult<Technician> {
        sqlx::query_as::<_, Technician>(&format!(
            "SELECT {} FROM technicians t WHERE t.id = $1",
            TECHNICIAN_COLUMNS
        ))
        .bind(technician_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Technician"))
    }

    async fn ensure_email_free(&self, email: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM technicians WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await?;

        if taken > 0 {
            return Err(AppError::Conflict {
                resource: "email".to_string(),
                message: "A technician with this email already exists".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_fields_detected() {
        let input = UpdateTechnicianInput {
            name: Some("Sam".to_string()),
            email: None,
            phone: None,
            specialty: Some("HVAC".to_string()),
            hourly_rate: None,
            status: None,
        };
        assert!(!input.touches_admin_fields());

        let input = UpdateTechnicianInput {
            status: Some(TechnicianStatus::Busy),
            ..input
        };
        assert!(input.touches_admin_fields());
    }

    #[test]
    fn negative_rate_rejected() {
        assert!(check_rate(Some(Decimal::from(-10))).is_err());
        assert!(check_rate(Some(Decimal::from(45))).is_ok());
        assert!(check_rate(None).is_ok());
    }

    #[test]
    fn summaries_serialize_without_contact_fields() {
        let listing = TechnicianListing::Summary(vec![TechnicianSummary {
            id: Uuid::nil(),
            name: "Sam".to_string(),
            specialty: None,
        }]);
        let json = serde_json::to_value(&listing).unwrap();
        assert!(json[0].get("email").is_none());
        assert_eq!(json[0]["name"], "Sam");
    }

    fn technician(status: TechnicianStatus) -> Technician {
        let now = chrono::Utc::now();
        Technician {
            id: Uuid::new_v4(),
            user_id: None,
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            phone: Some("555 0100".to_string()),
            specialty: Some("HVAC".to_string()),
            hourly_rate: Some(Decimal::from(45)),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn clients_see_available_technicians_as_summaries() {
        let client = Actor {
            user_id: Uuid::new_v4(),
            role: UserRole::Client,
            profile_id: Some(Uuid::new_v4()),
        };
        let view = view_for(&client, technician(TechnicianStatus::Available)).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Sam");
        assert!(json.get("email").is_none());
        assert!(json.get("hourly_rate").is_none());

        for status in [TechnicianStatus::Busy, TechnicianStatus::Inactive] {
            assert!(matches!(
                view_for(&client, technician(status)),
                Err(AppError::NotFound(_))
            ));
        }
    }

    #[test]
    fn staff_see_full_technicians() {
        let tech = Actor {
            user_id: Uuid::new_v4(),
            role: UserRole::Technician,
            profile_id: Some(Uuid::new_v4()),
        };
        let view = view_for(&tech, technician(TechnicianStatus::Inactive)).unwrap();
        assert!(matches!(view, TechnicianView::Full(_)));
    }
}

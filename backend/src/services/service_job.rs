//! Service job management: requests, assignment and the status workflow

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    validate_hours, validate_non_negative, Actor, PaginatedResponse, Pagination, ServiceEdit,
    ServiceJob, ServicePriority, ServiceStatus, ServiceType, UserRole,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::technician::TechnicianService;

pub(crate) const SERVICE_COLUMNS: &str = "s.id, s.client_id, s.technician_id, s.equipment_id, \
     s.title, s.description, s.service_type, s.priority, s.status, s.scheduled_at, s.started_at, \
     s.completed_at, s.estimated_hours, s.actual_hours, s.cost, s.diagnosis, s.resolution, \
     s.created_at, s.updated_at";

/// $1 restricts to a client's jobs, $2 to a technician's
const VISIBLE: &str =
    "($1::uuid IS NULL OR s.client_id = $1) AND ($2::uuid IS NULL OR s.technician_id = $2)";

/// Service job service
#[derive(Clone)]
pub struct ServiceJobService {
    db: PgPool,
}

/// Query parameters for listing services
#[derive(Debug, Default, Deserialize)]
pub struct ServiceFilter {
    pub status: Option<ServiceStatus>,
    pub priority: Option<ServicePriority>,
    pub service_type: Option<ServiceType>,
    pub client_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    /// Created on or after this day
    pub from: Option<NaiveDate>,
    /// Created on or before this day
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceInput {
    /// Required for admins; clients always request for themselves
    pub client_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub service_type: ServiceType,
    pub priority: Option<ServicePriority>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub estimated_hours: Option<Decimal>,
    pub cost: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateServiceInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub service_type: Option<ServiceType>,
    pub priority: Option<ServicePriority>,
    pub equipment_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub diagnosis: Option<String>,
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignInput {
    pub technician_id: Uuid,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusInput {
    pub status: ServiceStatus,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub actual_hours: Option<Decimal>,
}

/// A job ready to insert, after role rules are applied
#[derive(Debug, PartialEq)]
struct NewService {
    client_id: Uuid,
    technician_id: Option<Uuid>,
    status: ServiceStatus,
    scheduled_at: Option<DateTime<Utc>>,
    cost: Option<Decimal>,
}

/// Apply role rules to a create request.
///
/// Clients create pending requests for themselves; admins may assign and price.
fn resolve_new_service(actor: &Actor, input: &CreateServiceInput) -> AppResult<NewService> {
    match actor.role {
        UserRole::Client => {
            let own = actor.scope()?.client_filter().ok_or_else(|| {
                AppError::Forbidden("account is not linked to a client profile".to_string())
            })?;
            if input.client_id.is_some_and(|id| id != own) {
                return Err(AppError::Forbidden(
                    "Clients can only request services for themselves".to_string(),
                ));
            }
            Ok(NewService {
                client_id: own,
                technician_id: None,
                status: ServiceStatus::Pending,
                scheduled_at: None,
                cost: None,
            })
        }
        UserRole::Admin => {
            let client_id = input
                .client_id
                .ok_or_else(|| AppError::validation("client_id", "client_id is required"))?;
            let status = if input.technician_id.is_some() {
                ServiceStatus::Scheduled
            } else {
                ServiceStatus::Pending
            };
            Ok(NewService {
                client_id,
                technician_id: input.technician_id,
                status,
                scheduled_at: input.scheduled_at,
                cost: input.cost,
            })
        }
        UserRole::Technician => Err(AppError::Forbidden(
            "Technicians cannot create service requests".to_string(),
        )),
    }
}

/// Reject fields outside what the edit level allows
fn check_edit_fields(level: ServiceEdit, input: &UpdateServiceInput) -> AppResult<()> {
    let scheduling = input.service_type.is_some()
        || input.priority.is_some()
        || input.equipment_id.is_some()
        || input.scheduled_at.is_some()
        || input.estimated_hours.is_some();
    let work = input.actual_hours.is_some()
        || input.cost.is_some()
        || input.diagnosis.is_some()
        || input.resolution.is_some();
    let request = input.title.is_some() || input.description.is_some();

    match level {
        ServiceEdit::Full => Ok(()),
        ServiceEdit::Work if scheduling || request => Err(AppError::Forbidden(
            "Technicians can only record diagnosis, resolution, hours and cost".to_string(),
        )),
        ServiceEdit::Request if scheduling || work => Err(AppError::Forbidden(
            "Clients can only change the title and description of a pending request".to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_amounts(
    estimated_hours: Option<Decimal>,
    actual_hours: Option<Decimal>,
    cost: Option<Decimal>,
) -> AppResult<()> {
    if let Some(hours) = estimated_hours {
        validate_hours(hours).map_err(|m| AppError::validation("estimated_hours", m))?;
    }
    if let Some(hours) = actual_hours {
        validate_hours(hours).map_err(|m| AppError::validation("actual_hours", m))?;
    }
    if let Some(cost) = cost {
        validate_non_negative(cost).map_err(|m| AppError::validation("cost", m))?;
    }
    Ok(())
}

/// A guarded write found the job in a different status than it was read in
fn stale_status(expected: ServiceStatus) -> AppError {
    AppError::InvalidStateTransition(format!(
        "Service changed while updating and is no longer {}",
        expected
    ))
}

/// Status notes are kept on the resolution, one line per change
fn append_note(
    resolution: Option<&str>,
    status: ServiceStatus,
    note: Option<&str>,
) -> Option<String> {
    let note = note.map(str::trim).filter(|n| !n.is_empty());
    match (resolution, note) {
        (existing, None) => existing.map(str::to_string),
        (None, Some(note)) => Some(format!("[{}] {}", status, note)),
        (Some(existing), Some(note)) => Some(format!("{}\n[{}] {}", existing, status, note)),
    }
}

impl ServiceJobService {
    /// Create a new ServiceJobService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List services visible to the caller, newest first
    pub async fn list(&self, actor: &Actor, filter: ServiceFilter) -> AppResult<PaginatedResponse<ServiceJob>> {
        let scope = actor.scope()?;
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::validation("from", "from must not be after to"));
            }
        }

        let conditions = format!(
            r#"{}
              AND ($3::varchar IS NULL OR s.status = $3)
              AND ($4::varchar IS NULL OR s.priority = $4)
              AND ($5::varchar IS NULL OR s.service_type = $5)
              AND ($6::uuid IS NULL OR s.client_id = $6)
              AND ($7::uuid IS NULL OR s.technician_id = $7)
              AND ($8::date IS NULL OR s.created_at >= $8::date)
              AND ($9::date IS NULL OR s.created_at < $9::date + 1)"#,
            VISIBLE
        );

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM services s WHERE {}",
            conditions
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(filter.status)
        .bind(filter.priority)
        .bind(filter.service_type)
        .bind(filter.client_id)
        .bind(filter.technician_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let services = sqlx::query_as::<_, ServiceJob>(&format!(
            "SELECT {} FROM services s WHERE {} ORDER BY s.created_at DESC LIMIT $10 OFFSET $11",
            SERVICE_COLUMNS, conditions
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(filter.status)
        .bind(filter.priority)
        .bind(filter.service_type)
        .bind(filter.client_id)
        .bind(filter.technician_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(services, pagination, total))
    }

    /// Get a service; jobs outside the caller's scope are reported as missing
    pub async fn get(&self, actor: &Actor, service_id: Uuid) -> AppResult<ServiceJob> {
        let scope = actor.scope()?;

        sqlx::query_as::<_, ServiceJob>(&format!(
            "SELECT {} FROM services s WHERE {} AND s.id = $3",
            SERVICE_COLUMNS, VISIBLE
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(service_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Service"))
    }

    pub async fn create(&self, actor: &Actor, input: CreateServiceInput) -> AppResult<ServiceJob> {
        input.validate()?;
        let new = resolve_new_service(actor, &input)?;
        check_amounts(input.estimated_hours, None, new.cost)?;

        let client_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE id = $1")
            .bind(new.client_id)
            .fetch_one(&self.db)
            .await?;
        if client_exists == 0 {
            return Err(AppError::validation("client_id", "Client does not exist"));
        }

        if let Some(equipment_id) = input.equipment_id {
            self.ensure_equipment_of(equipment_id, new.client_id).await?;
        }
        if let Some(technician_id) = new.technician_id {
            self.ensure_assignable(technician_id).await?;
        }

        let service = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            INSERT INTO services AS s (client_id, technician_id, equipment_id, title, description,
                                       service_type, priority, status, scheduled_at, estimated_hours, cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(new.client_id)
        .bind(new.technician_id)
        .bind(input.equipment_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.service_type)
        .bind(input.priority.unwrap_or_default())
        .bind(new.status)
        .bind(new.scheduled_at)
        .bind(input.estimated_hours)
        .bind(new.cost)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            service_id = %service.id,
            client_id = %service.client_id,
            status = %service.status,
            "Created service"
        );
        Ok(service)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        service_id: Uuid,
        input: UpdateServiceInput,
    ) -> AppResult<ServiceJob> {
        input.validate()?;
        let existing = self.get(actor, service_id).await?;

        if existing.status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} service can no longer be edited",
                existing.status
            )));
        }

        let level = actor.service_edit(existing.client_id, existing.technician_id, existing.status)?;
        check_edit_fields(level, &input)?;
        check_amounts(input.estimated_hours, input.actual_hours, input.cost)?;

        if let Some(equipment_id) = input.equipment_id {
            self.ensure_equipment_of(equipment_id, existing.client_id).await?;
        }

        let service = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            UPDATE services s
            SET title = $2, description = $3, service_type = $4, priority = $5, equipment_id = $6,
                scheduled_at = $7, estimated_hours = $8, actual_hours = $9, cost = $10,
                diagnosis = $11, resolution = $12
            WHERE s.id = $1 AND s.status = $13
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(service_id)
        .bind(input.title.as_deref().map(str::trim).unwrap_or(existing.title.as_str()))
        .bind(input.description.or(existing.description))
        .bind(input.service_type.unwrap_or(existing.service_type))
        .bind(input.priority.unwrap_or(existing.priority))
        .bind(input.equipment_id.or(existing.equipment_id))
        .bind(input.scheduled_at.or(existing.scheduled_at))
        .bind(input.estimated_hours.or(existing.estimated_hours))
        .bind(input.actual_hours.or(existing.actual_hours))
        .bind(input.cost.or(existing.cost))
        .bind(input.diagnosis.or(existing.diagnosis))
        .bind(input.resolution.or(existing.resolution))
        .bind(existing.status)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| stale_status(existing.status))?;

        Ok(service)
    }

    /// Assign a technician; a pending job becomes scheduled
    pub async fn assign(&self, actor: &Actor, service_id: Uuid, input: AssignInput) -> AppResult<ServiceJob> {
        actor.require_admin()?;
        let existing = self.get(actor, service_id).await?;

        if existing.status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} service cannot be reassigned",
                existing.status
            )));
        }
        self.ensure_assignable(input.technician_id).await?;

        let status = match existing.status {
            ServiceStatus::Pending => ServiceStatus::Scheduled,
            other => other,
        };

        let service = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            UPDATE services s
            SET technician_id = $2, status = $3, scheduled_at = $4
            WHERE s.id = $1 AND s.status = $5
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(service_id)
        .bind(input.technician_id)
        .bind(status)
        .bind(input.scheduled_at.or(existing.scheduled_at))
        .bind(existing.status)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| stale_status(existing.status))?;

        tracing::info!(%service_id, technician_id = %input.technician_id, "Assigned technician");
        Ok(service)
    }

    /// Move a job through its workflow
    pub async fn update_status(
        &self,
        actor: &Actor,
        service_id: Uuid,
        input: StatusInput,
    ) -> AppResult<ServiceJob> {
        input.validate()?;
        let existing = self.get(actor, service_id).await?;
        let next = input.status;

        actor.check_service_status_change(
            existing.client_id,
            existing.technician_id,
            existing.status,
            next,
        )?;

        if !existing.status.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot move a service from {} to {}",
                existing.status, next
            )));
        }
        check_amounts(None, input.actual_hours, None)?;

        let stamps = existing.stamps_for(next, Utc::now(), input.actual_hours);
        let resolution = append_note(existing.resolution.as_deref(), next, input.notes.as_deref());

        let service = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            UPDATE services s
            SET status = $2, started_at = $3, completed_at = $4, actual_hours = $5, resolution = $6
            WHERE s.id = $1 AND s.status = $7
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(service_id)
        .bind(next)
        .bind(stamps.started_at)
        .bind(stamps.completed_at)
        .bind(stamps.actual_hours)
        .bind(&resolution)
        .bind(existing.status)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| stale_status(existing.status))?;

        tracing::info!(%service_id, from = %existing.status, to = %next, "Service status changed");
        Ok(service)
    }

    /// Delete a service; quotes that pointed at it are kept and detached
    pub async fn delete(&self, actor: &Actor, service_id: Uuid) -> AppResult<()> {
        actor.require_admin()?;
        self.get(actor, service_id).await?;

        let mut tx = self.db.begin().await?;
        let detached = sqlx::query("UPDATE quotes SET service_id = NULL WHERE service_id = $1")
            .bind(service_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(service_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(%service_id, detached_quotes = detached, "Deleted service");
        Ok(())
    }

    async fn ensure_equipment_of(&self, equipment_id: Uuid, client_id: Uuid) -> AppResult<()> {
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT client_id FROM equipment WHERE id = $1")
            .bind(equipment_id)
            .fetch_optional(&self.db)
            .await?;

        match owner {
            Some(owner) if owner == client_id => Ok(()),
            Some(_) => Err(AppError::validation(
                "equipment_id",
                "Equipment belongs to a different client",
            )),
            None => Err(AppError::validation("equipment_id", "Equipment does not exist")),
        }
    }

    async fn ensure_assignable(&self, technician_id: Uuid) -> AppResult<()> {
        let technician = TechnicianService::new(self.db.clone())
            .find(technician_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::validation("technician_id", "Technician does not exist"),
                other => other,
            })?;

        if !technician.status.can_take_jobs() {
            return Err(AppError::validation(
                "technician_id",
                format!("Technician {} is inactive", technician.name),
            ));
        }
        Ok(())
    }
}

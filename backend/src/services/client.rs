//! Client management service

use serde::Deserialize;
use shared::{
    normalize_email, search_pattern, Actor, Client, Equipment, PaginatedResponse, Pagination,
    Scope, ServiceJob, UserRole,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::auth::insert_user;
use crate::services::equipment::EQUIPMENT_COLUMNS;
use crate::services::service_job::SERVICE_COLUMNS;

pub(crate) const CLIENT_COLUMNS: &str = "c.id, c.user_id, c.name, c.email, c.phone, c.company, \
     c.address, c.city, c.notes, c.created_at, c.updated_at";

/// Rows a caller may see: $1 restricts to one client, $2 to the clients a
/// technician has worked for
const VISIBLE: &str = "($1::uuid IS NULL OR c.id = $1) \
     AND ($2::uuid IS NULL OR EXISTS \
         (SELECT 1 FROM services s WHERE s.client_id = c.id AND s.technician_id = $2))";

/// Client service
#[derive(Clone)]
pub struct ClientService {
    db: PgPool,
}

/// Query parameters for listing clients
#[derive(Debug, Default, Deserialize)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub city: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for creating a client
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "shared::phone")]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub company: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    pub notes: Option<String>,
    /// Creates a client login when present
    #[validate(custom = "shared::password")]
    pub password: Option<String>,
}

/// Input for updating a client
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(custom = "shared::phone")]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub company: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    pub notes: Option<String>,
}

fn scope_filters(scope: Scope) -> (Option<Uuid>, Option<Uuid>) {
    (scope.client_filter(), scope.technician_filter())
}

impl ClientService {
    /// Create a new ClientService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List clients visible to the caller
    pub async fn list(&self, actor: &Actor, filter: ClientFilter) -> AppResult<PaginatedResponse<Client>> {
        let (client_id, technician_id) = scope_filters(actor.scope()?);
        let pagination = Pagination::from_query(filter.page, filter.per_page);
        let search = search_pattern(filter.search.as_deref());
        let city = filter.city.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let conditions = format!(
            "{} AND ($3::text IS NULL OR c.name ILIKE $3 OR c.email ILIKE $3 OR c.company ILIKE $3) \
             AND ($4::text IS NULL OR LOWER(c.city) = LOWER($4))",
            VISIBLE
        );

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM clients c WHERE {}",
            conditions
        ))
        .bind(client_id)
        .bind(technician_id)
        .bind(&search)
        .bind(city)
        .fetch_one(&self.db)
        .await?;

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients c WHERE {} ORDER BY c.name ASC LIMIT $5 OFFSET $6",
            CLIENT_COLUMNS, conditions
        ))
        .bind(client_id)
        .bind(technician_id)
        .bind(&search)
        .bind(city)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(clients, pagination, total))
    }

    /// Get a client; rows outside the caller's scope are reported as missing
    pub async fn get(&self, actor: &Actor, client_id: Uuid) -> AppResult<Client> {
        let (own_client, technician_id) = scope_filters(actor.scope()?);

        sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients c WHERE {} AND c.id = $3",
            CLIENT_COLUMNS, VISIBLE
        ))
        .bind(own_client)
        .bind(technician_id)
        .bind(client_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Client"))
    }

    /// Create a client, with an optional login
    pub async fn create(&self, actor: &Actor, input: CreateClientInput) -> AppResult<Client> {
        actor.require_admin()?;
        input.validate()?;

        let email = normalize_email(&input.email);
        self.ensure_email_free(&email, None).await?;

        let mut tx = self.db.begin().await?;

        let user_id = match &input.password {
            Some(password) => {
                Some(insert_user(&mut *tx, &email, password, &input.name, UserRole::Client).await?)
            }
            None => None,
        };

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients AS c (user_id, name, email, phone, company, address, city, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(user_id)
        .bind(input.name.trim())
        .bind(&email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(client_id = %client.id, with_login = user_id.is_some(), "Created client");
        Ok(client)
    }

    /// Update a client; admins and the client itself only
    pub async fn update(&self, actor: &Actor, client_id: Uuid, input: UpdateClientInput) -> AppResult<Client> {
        input.validate()?;
        let existing = self.get(actor, client_id).await?;

        if !actor.can_edit_client(client_id) {
            return Err(AppError::Forbidden(
                "Only an admin or the client can edit this profile".to_string(),
            ));
        }

        let email = input.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            if *email != existing.email {
                self.ensure_email_free(email, Some(client_id)).await?;
            }
        }

        let mut tx = self.db.begin().await?;

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients c
            SET name = $2, email = $3, phone = $4, company = $5,
                address = $6, city = $7, notes = $8
            WHERE c.id = $1
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .bind(input.name.as_deref().map(str::trim).unwrap_or(existing.name.as_str()))
        .bind(email.as_ref().unwrap_or(&existing.email))
        .bind(input.phone.or(existing.phone))
        .bind(input.company.or(existing.company))
        .bind(input.address.or(existing.address))
        .bind(input.city.or(existing.city))
        .bind(input.notes.or(existing.notes))
        .fetch_one(&mut *tx)
        .await?;

        // Keep the login email in step with the profile
        if let Some(user_id) = client.user_id {
            if client.email != existing.email {
                sqlx::query("UPDATE users SET email = $1 WHERE id = $2")
                    .bind(&client.email)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(client)
    }

    /// Delete a client that has no services or quotes; its equipment goes with it
    pub async fn delete(&self, actor: &Actor, client_id: Uuid) -> AppResult<()> {
        actor.require_admin()?;
        let client = self.get(actor, client_id).await?;

        let (services, quotes) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (SELECT COUNT(*) FROM services WHERE client_id = $1),
                   (SELECT COUNT(*) FROM quotes WHERE client_id = $1)
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.db)
        .await?;

        if services > 0 || quotes > 0 {
            return Err(AppError::validation(
                "client_id",
                format!(
                    "Client has {} service(s) and {} quote(s) and cannot be deleted",
                    services, quotes
                ),
            ));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        if let Some(user_id) = client.user_id {
            sqlx::query("UPDATE users SET is_active = false WHERE id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(%client_id, "Deleted client");
        Ok(())
    }

    /// Equipment owned by a client
    pub async fn equipment(&self, actor: &Actor, client_id: Uuid) -> AppResult<Vec<Equipment>> {
        self.get(actor, client_id).await?;

        let equipment = sqlx::query_as::<_, Equipment>(&format!(
            "SELECT {} FROM equipment e WHERE e.client_id = $1 ORDER BY e.name ASC",
            EQUIPMENT_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        Ok(equipment)
    }

    /// Services requested by a client; technicians only see their own jobs
    pub async fn services(&self, actor: &Actor, client_id: Uuid) -> AppResult<Vec<ServiceJob>> {
        self.get(actor, client_id).await?;
        let technician_id = actor.scope()?.technician_filter();

        let services = sqlx::query_as::<_, ServiceJob>(&format!(
            r#"
            SELECT {} FROM services s
            WHERE s.client_id = $1 AND ($2::uuid IS NULL OR s.technician_id = $2)
            ORDER BY s.created_at DESC
            "#,
            SERVICE_COLUMNS
        ))
        .bind(client_id)
        .bind(technician_id)
        .fetch_all(&self.db)
        .await?;

        Ok(services)
    }

    async fn ensure_email_free(&self, email: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM clients WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await?;

        if taken > 0 {
            return Err(AppError::Conflict {
                resource: "email".to_string(),
                message: "A client with this email already exists".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_input_requires_valid_fields() {
        let input = CreateClientInput {
            name: "Acme Bakery".to_string(),
            email: "orders@acme.test".to_string(),
            phone: Some("555-0100-22".to_string()),
            company: None,
            address: None,
            city: Some("Lyon".to_string()),
            notes: None,
            password: None,
        };
        assert!(input.validate().is_ok());

        let input = CreateClientInput {
            email: "not-an-email".to_string(),
            password: Some("short".to_string()),
            ..input
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn scope_maps_to_sql_filters() {
        let id = Uuid::new_v4();
        assert_eq!(scope_filters(Scope::All), (None, None));
        assert_eq!(scope_filters(Scope::Client(id)), (Some(id), None));
        assert_eq!(scope_filters(Scope::Technician(id)), (None, Some(id)));
    }
}

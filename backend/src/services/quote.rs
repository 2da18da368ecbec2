//! Quote service: pricing, numbering and the client answer workflow

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    format_quote_number, quote_number_prefix, validate_quote_items, validate_tax_rate, Actor,
    PaginatedResponse, Pagination, Quote, QuoteItem, QuoteStatus, QuoteTotals, UserRole,
};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

const QUOTE_COLUMNS: &str = "q.id, q.quote_number, q.client_id, q.service_id, q.created_by, \
     q.title, q.description, q.items, q.subtotal, q.tax_rate, q.tax_amount, q.total, q.status, \
     q.valid_until, q.sent_at, q.responded_at, q.notes, q.created_at, q.updated_at";

/// $1 limits a client to their own non-draft quotes; $2/$3 limit a technician
/// to quotes on their services or written by them
const VISIBLE: &str = "($1::uuid IS NULL OR (q.client_id = $1 AND q.status <> 'draft')) \
     AND ($2::uuid IS NULL OR q.created_by = $3 OR EXISTS \
         (SELECT 1 FROM services s WHERE s.id = q.service_id AND s.technician_id = $2))";

/// Quote row as stored, with items in a JSONB column
#[derive(Debug, sqlx::FromRow)]
struct QuoteRow {
    id: Uuid,
    quote_number: String,
    client_id: Uuid,
    service_id: Option<Uuid>,
    created_by: Uuid,
    title: String,
    description: Option<String>,
    items: Json<Vec<QuoteItem>>,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    status: QuoteStatus,
    valid_until: Option<NaiveDate>,
    sent_at: Option<chrono::DateTime<Utc>>,
    responded_at: Option<chrono::DateTime<Utc>>,
    notes: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<QuoteRow> for Quote {
    fn from(row: QuoteRow) -> Self {
        Quote {
            id: row.id,
            quote_number: row.quote_number,
            client_id: row.client_id,
            service_id: row.service_id,
            created_by: row.created_by,
            title: row.title,
            description: row.description,
            items: row.items.0,
            subtotal: row.subtotal,
            tax_rate: row.tax_rate,
            tax_amount: row.tax_amount,
            total: row.total,
            status: row.status,
            valid_until: row.valid_until,
            sent_at: row.sent_at,
            responded_at: row.responded_at,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Quote service
#[derive(Clone)]
pub struct QuoteService {
    db: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteFilter {
    pub status: Option<QuoteStatus>,
    pub client_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuoteInput {
    /// Taken from the service when one is given
    pub client_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub items: Vec<QuoteItem>,
    pub tax_rate: Option<Decimal>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuoteInput {
    #[validate(custom = "shared::not_blank", length(max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub items: Option<Vec<QuoteItem>>,
    pub tax_rate: Option<Decimal>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Service a quote is attached to
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct LinkedService {
    client_id: Uuid,
    technician_id: Option<Uuid>,
}

/// Work out which client a new quote is for.
///
/// Technicians may only quote services assigned to them.
fn resolve_quote_client(
    actor: &Actor,
    requested: Option<Uuid>,
    service: Option<LinkedService>,
) -> AppResult<Uuid> {
    actor.require_any(&[UserRole::Admin, UserRole::Technician])?;

    match service {
        Some(service) => {
            if actor.role == UserRole::Technician
                && (service.technician_id.is_none() || actor.technician_id() != service.technician_id)
            {
                return Err(AppError::Forbidden(
                    "Technicians can only quote services assigned to them".to_string(),
                ));
            }
            if requested.is_some_and(|id| id != service.client_id) {
                return Err(AppError::validation(
                    "client_id",
                    "client_id does not match the service's client",
                ));
            }
            Ok(service.client_id)
        }
        None if actor.role == UserRole::Technician => Err(AppError::validation(
            "service_id",
            "Technicians must attach quotes to a service",
        )),
        None => requested.ok_or_else(|| AppError::validation("client_id", "client_id is required")),
    }
}

/// Validate lines and tax, then compute the money fields
fn price(items: &[QuoteItem], tax_rate: Decimal) -> AppResult<QuoteTotals> {
    validate_quote_items(items).map_err(|m| AppError::validation("items", m))?;
    validate_tax_rate(tax_rate).map_err(|m| AppError::validation("tax_rate", m))?;
    Ok(QuoteTotals::compute(items, tax_rate))
}

fn check_valid_until(valid_until: Option<NaiveDate>, today: NaiveDate) -> AppResult<()> {
    match valid_until {
        Some(date) if date < today => Err(AppError::validation(
            "valid_until",
            "Validity date cannot be in the past",
        )),
        _ => Ok(()),
    }
}

fn transition_error(from: QuoteStatus, to: QuoteStatus) -> AppError {
    AppError::InvalidStateTransition(format!("Cannot move a quote from {} to {}", from, to))
}

/// The row changed status between the read and the write
fn stale_status(expected: QuoteStatus) -> AppError {
    AppError::InvalidStateTransition(format!("Quote is no longer {}", expected))
}

/// Column stamped when a quote enters `to`
fn stamp_column(to: QuoteStatus) -> Option<&'static str> {
    match to {
        QuoteStatus::Sent => Some("sent_at"),
        QuoteStatus::Accepted | QuoteStatus::Rejected => Some("responded_at"),
        QuoteStatus::Draft | QuoteStatus::Expired => None,
    }
}

/// Move a quote from `from` to `to` in one guarded statement.
///
/// Fails with a state error when the quote is no longer in `from`.
async fn move_status<'c, E>(
    executor: E,
    quote_id: Uuid,
    from: QuoteStatus,
    to: QuoteStatus,
) -> AppResult<QuoteRow>
where
    E: sqlx::PgExecutor<'c>,
{
    let stamp = stamp_column(to)
        .map(|column| format!(", {} = NOW()", column))
        .unwrap_or_default();

    sqlx::query_as::<_, QuoteRow>(&format!(
        "UPDATE quotes q SET status = $3{} WHERE q.id = $1 AND q.status = $2 RETURNING {}",
        stamp, QUOTE_COLUMNS
    ))
    .bind(quote_id)
    .bind(from)
    .bind(to)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| stale_status(from))
}

impl QuoteService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List quotes visible to the caller, newest first
    pub async fn list(&self, actor: &Actor, filter: QuoteFilter) -> AppResult<PaginatedResponse<Quote>> {
        let scope = actor.scope()?;
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        let conditions = format!(
            "{} AND ($4::varchar IS NULL OR q.status = $4) AND ($5::uuid IS NULL OR q.client_id = $5)",
            VISIBLE
        );

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM quotes q WHERE {}",
            conditions
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(actor.user_id)
        .bind(filter.status)
        .bind(filter.client_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {} FROM quotes q WHERE {} ORDER BY q.created_at DESC LIMIT $6 OFFSET $7",
            QUOTE_COLUMNS, conditions
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(actor.user_id)
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let quotes = rows.into_iter().map(Quote::from).collect();
        Ok(PaginatedResponse::new(quotes, pagination, total))
    }

    pub async fn get(&self, actor: &Actor, quote_id: Uuid) -> AppResult<Quote> {
        let scope = actor.scope()?;

        sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {} FROM quotes q WHERE {} AND q.id = $4",
            QUOTE_COLUMNS, VISIBLE
        ))
        .bind(scope.client_filter())
        .bind(scope.technician_filter())
        .bind(actor.user_id)
        .bind(quote_id)
        .fetch_optional(&self.db)
        .await?
        .map(Quote::from)
        .ok_or_else(|| AppError::not_found("Quote"))
    }

    /// Create a draft quote with a fresh number
    pub async fn create(&self, actor: &Actor, input: CreateQuoteInput) -> AppResult<Quote> {
        input.validate()?;

        let service = match input.service_id {
            Some(service_id) => Some(
                sqlx::query_as::<_, LinkedService>(
                    "SELECT client_id, technician_id FROM services WHERE id = $1",
                )
                .bind(service_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::validation("service_id", "Service does not exist"))?,
            ),
            None => None,
        };
        let client_id = resolve_quote_client(actor, input.client_id, service)?;

        let tax_rate = input.tax_rate.unwrap_or(Decimal::ZERO);
        let totals = price(&input.items, tax_rate)?;
        let today = Utc::now().date_naive();
        check_valid_until(input.valid_until, today)?;

        let mut tx = self.db.begin().await?;

        // Serialize numbering within the month
        let prefix = quote_number_prefix(today.year(), today.month());
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&prefix)
            .execute(&mut *tx)
            .await?;
        let last = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(MAX(SUBSTRING(quote_number FROM LENGTH($1) + 1)::bigint), 0)
            FROM quotes
            WHERE quote_number LIKE $1 || '%'
            "#,
        )
        .bind(&prefix)
        .fetch_one(&mut *tx)
        .await?;
        let quote_number = format_quote_number(today.year(), today.month(), last + 1);

        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            r#"
            INSERT INTO quotes AS q (quote_number, client_id, service_id, created_by, title,
                                     description, items, subtotal, tax_rate, tax_amount, total,
                                     valid_until, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            QUOTE_COLUMNS
        ))
        .bind(&quote_number)
        .bind(client_id)
        .bind(input.service_id)
        .bind(actor.user_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(Json(&input.items))
        .bind(totals.subtotal)
        .bind(tax_rate)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .bind(input.valid_until)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(quote_id = %row.id, %quote_number, total = %totals.total, "Created quote");
        Ok(row.into())
    }

    /// Edit a draft; totals are recomputed
    pub async fn update(&self, actor: &Actor, quote_id: Uuid, input: UpdateQuoteInput) -> AppResult<Quote> {
        input.validate()?;
        let existing = self.get(actor, quote_id).await?;

        if !actor.can_edit_quote(existing.created_by) {
            return Err(AppError::Forbidden(
                "Only an admin or the author can edit this quote".to_string(),
            ));
        }
        if !existing.status.is_editable() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} quote can no longer be edited",
                existing.status
            )));
        }

        let items = input.items.unwrap_or(existing.items);
        let tax_rate = input.tax_rate.unwrap_or(existing.tax_rate);
        let totals = price(&items, tax_rate)?;
        if input.valid_until.is_some() {
            check_valid_until(input.valid_until, Utc::now().date_naive())?;
        }

        let row = sqlx::query_as::<_, QuoteRow>(&format!(
            r#"
            UPDATE quotes q
            SET title = $2, description = $3, items = $4, subtotal = $5, tax_rate = $6,
                tax_amount = $7, total = $8, valid_until = $9, notes = $10
            WHERE q.id = $1 AND q.status = $11
            RETURNING {}
            "#,
            QUOTE_COLUMNS
        ))
        .bind(quote_id)
        .bind(input.title.as_deref().map(str::trim).unwrap_or(existing.title.as_str()))
        .bind(input.description.or(existing.description))
        .bind(Json(&items))
        .bind(totals.subtotal)
        .bind(tax_rate)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .bind(input.valid_until.or(existing.valid_until))
        .bind(input.notes.or(existing.notes))
        .bind(QuoteStatus::Draft)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| stale_status(QuoteStatus::Draft))?;

        Ok(row.into())
    }

    /// Send a draft to the client
    pub async fn send(&self, actor: &Actor, quote_id: Uuid) -> AppResult<Quote> {
        let existing = self.get(actor, quote_id).await?;

        if !actor.can_edit_quote(existing.created_by) {
            return Err(AppError::Forbidden(
                "Only an admin or the author can send this quote".to_string(),
            ));
        }
        if !existing.status.can_transition_to(QuoteStatus::Sent) {
            return Err(transition_error(existing.status, QuoteStatus::Sent));
        }

        let row = move_status(&self.db, quote_id, QuoteStatus::Draft, QuoteStatus::Sent).await?;

        tracing::info!(%quote_id, "Quote sent");
        Ok(row.into())
    }

    /// Accept a sent quote; the total becomes the cost of the linked service.
    ///
    /// A quote past its validity date is marked expired instead.
    pub async fn accept(&self, actor: &Actor, quote_id: Uuid) -> AppResult<Quote> {
        let existing = self.answerable(actor, quote_id, QuoteStatus::Accepted).await?;

        if existing.acceptance_status(Utc::now().date_naive()) == QuoteStatus::Expired {
            move_status(&self.db, quote_id, QuoteStatus::Sent, QuoteStatus::Expired).await?;
            tracing::info!(%quote_id, "Quote expired on acceptance attempt");
            return Err(AppError::InvalidStateTransition(
                "Quote has expired and can no longer be accepted".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let row = move_status(&mut *tx, quote_id, QuoteStatus::Sent, QuoteStatus::Accepted).await?;
        let accepted = Quote::from(row);

        if let Some((service_id, cost)) = accepted.service_cost() {
            sqlx::query("UPDATE services SET cost = $2 WHERE id = $1")
                .bind(service_id)
                .bind(cost)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(%quote_id, total = %accepted.total, "Quote accepted");
        Ok(accepted)
    }

    pub async fn reject(&self, actor: &Actor, quote_id: Uuid) -> AppResult<Quote> {
        self.answerable(actor, quote_id, QuoteStatus::Rejected).await?;

        let row = move_status(&self.db, quote_id, QuoteStatus::Sent, QuoteStatus::Rejected).await?;

        tracing::info!(%quote_id, "Quote rejected");
        Ok(row.into())
    }

    /// Delete a draft, rejected or expired quote
    pub async fn delete(&self, actor: &Actor, quote_id: Uuid) -> AppResult<()> {
        actor.require_admin()?;
        let existing = self.get(actor, quote_id).await?;

        if !existing.status.is_deletable() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} quote cannot be deleted",
                existing.status
            )));
        }

        sqlx::query("DELETE FROM quotes WHERE id = $1")
            .bind(quote_id)
            .execute(&self.db)
            .await?;

        tracing::info!(%quote_id, "Deleted quote");
        Ok(())
    }

    /// Load a quote the caller may answer and check it can move to `next`
    async fn answerable(&self, actor: &Actor, quote_id: Uuid, next: QuoteStatus) -> AppResult<Quote> {
        let existing = self.get(actor, quote_id).await?;

        if !actor.can_answer_quote(existing.client_id) {
            return Err(AppError::Forbidden(
                "Only the client or an admin can answer this quote".to_string(),
            ));
        }
        if !existing.status.can_transition_to(next) {
            return Err(transition_error(existing.status, next));
        }
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn actor(role: UserRole, profile_id: Option<Uuid>) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
            profile_id,
        }
    }

    #[test]
    fn technician_quotes_only_own_services() {
        let tech_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let tech = actor(UserRole::Technician, Some(tech_id));

        let own = LinkedService {
            client_id,
            technician_id: Some(tech_id),
        };
        assert_eq!(resolve_quote_client(&tech, None, Some(own)).unwrap(), client_id);

        let other = LinkedService {
            client_id,
            technician_id: Some(Uuid::new_v4()),
        };
        assert!(matches!(
            resolve_quote_client(&tech, None, Some(other)),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            resolve_quote_client(&tech, Some(client_id), None),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn admin_client_must_match_service() {
        let admin = actor(UserRole::Admin, None);
        let client_id = Uuid::new_v4();
        let service = LinkedService {
            client_id,
            technician_id: None,
        };
        assert!(resolve_quote_client(&admin, Some(Uuid::new_v4()), Some(service)).is_err());
        assert_eq!(resolve_quote_client(&admin, Some(client_id), None).unwrap(), client_id);
        assert!(resolve_quote_client(&admin, None, None).is_err());
    }

    #[test]
    fn clients_cannot_create_quotes() {
        let client = actor(UserRole::Client, Some(Uuid::new_v4()));
        assert!(matches!(
            resolve_quote_client(&client, None, None),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn pricing_validates_inputs() {
        let items = vec![QuoteItem {
            description: "Filter".to_string(),
            quantity: Decimal::from(2),
            unit_price: Decimal::from_str("12.50").unwrap(),
        }];
        let totals = price(&items, Decimal::from(10)).unwrap();
        assert_eq!(totals.total, Decimal::from_str("27.50").unwrap());

        assert!(matches!(
            price(&[], Decimal::ZERO),
            Err(AppError::Validation { field, .. }) if field == "items"
        ));
        assert!(matches!(
            price(&items, Decimal::from(101)),
            Err(AppError::Validation { field, .. }) if field == "tax_rate"
        ));
    }

    #[test]
    fn transitions_stamp_the_right_column() {
        assert_eq!(stamp_column(QuoteStatus::Sent), Some("sent_at"));
        assert_eq!(stamp_column(QuoteStatus::Accepted), Some("responded_at"));
        assert_eq!(stamp_column(QuoteStatus::Rejected), Some("responded_at"));
        assert_eq!(stamp_column(QuoteStatus::Expired), None);
    }

    #[test]
    fn lost_race_is_a_state_error() {
        match stale_status(QuoteStatus::Sent) {
            AppError::InvalidStateTransition(message) => assert!(message.contains("sent")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn validity_cannot_start_in_the_past() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(check_valid_until(NaiveDate::from_ymd_opt(2025, 3, 9), today).is_err());
        assert!(check_valid_until(Some(today), today).is_ok());
        assert!(check_valid_until(None, today).is_ok());
    }
}

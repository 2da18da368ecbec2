//! Statistics service
//!
//! Grouping happens in SQL; zero-filling, growth and ranking are done by
//! `shared::stats`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    add_months, baseline_month, clamp_months, decimal_growth_percent, growth_percent,
    month_window, quote_series, rank_technicians, round2, service_series, start_of_month, Actor,
    MonthlyQuoteRow, MonthlyQuoteStats, MonthlyServiceRow, MonthlyServiceStats, ServiceJob,
    TechnicianRanking, TechnicianTally, UserRole,
};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::services::service_job::SERVICE_COLUMNS;

const TECHNICIAN_STATUSES: [&str; 3] = ["available", "busy", "inactive"];
const SERVICE_STATUSES: [&str; 5] =
    ["pending", "scheduled", "in_progress", "completed", "cancelled"];
const QUOTE_STATUSES: [&str; 5] = ["draft", "sent", "accepted", "rejected", "expired"];

/// Month boundaries are UTC, matching the `AT TIME ZONE 'UTC'` buckets
fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Clone)]
pub struct StatsService {
    db: PgPool,
}

/// Query parameters shared by the statistics endpoints
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub months: Option<u32>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub format: Option<String>,
}

impl StatsQuery {
    pub fn wants_csv(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("csv"))
    }
}

/// Business-wide dashboard figures
#[derive(Debug, Serialize)]
pub struct StatsOverview {
    pub clients: i64,
    pub equipment: i64,
    pub technicians: BTreeMap<String, i64>,
    pub services: BTreeMap<String, i64>,
    pub quotes: BTreeMap<String, i64>,
    pub revenue: Decimal,
    pub services_this_month: i64,
    pub services_last_month: i64,
    pub services_growth_percent: f64,
    pub revenue_this_month: Decimal,
    pub revenue_last_month: Decimal,
    pub revenue_growth_percent: f64,
    pub avg_completion_hours: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct OverviewTotals {
    clients: i64,
    equipment: i64,
    revenue: Decimal,
    services_this_month: i64,
    services_last_month: i64,
    revenue_this_month: Decimal,
    revenue_last_month: Decimal,
    avg_completion_hours: Option<f64>,
}

/// Figures for the signed-in technician or client
#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MyStats {
    Admin(StatsOverview),
    Technician {
        ranking: Option<TechnicianRanking>,
        open_services: Vec<ServiceJob>,
    },
    Client {
        services: BTreeMap<String, i64>,
        equipment: i64,
        pending_quotes: i64,
        total_spent: Decimal,
    },
}

/// Count per status, with every known status present
fn zero_filled(keys: &[&str], rows: Vec<(String, i64)>) -> BTreeMap<String, i64> {
    let mut counts: BTreeMap<String, i64> = keys.iter().map(|k| (k.to_string(), 0)).collect();
    for (key, count) in rows {
        *counts.entry(key).or_insert(0) += count;
    }
    counts
}

/// Ranking rows are computed over every technician so ranks stay comparable
const TALLY_QUERY: &str = r#"
    SELECT t.id AS technician_id,
           t.name,
           COUNT(s.id) AS assigned,
           COUNT(s.id) FILTER (WHERE s.status = 'completed') AS completed,
           COUNT(s.id) FILTER (WHERE s.status = 'cancelled') AS cancelled,
           COUNT(s.id) FILTER (WHERE s.status IN ('pending', 'scheduled', 'in_progress')) AS open,
           (AVG(EXTRACT(EPOCH FROM (s.completed_at - s.started_at)))
               FILTER (WHERE s.status = 'completed'
                         AND s.started_at IS NOT NULL
                         AND s.completed_at IS NOT NULL) / 3600.0)::float8 AS avg_completion_hours,
           COALESCE(SUM(s.cost) FILTER (WHERE s.status = 'completed'), 0) AS revenue
    FROM technicians t
    LEFT JOIN services s ON s.technician_id = t.id
        AND ($1::date IS NULL OR (s.created_at AT TIME ZONE 'UTC') >= $1::date)
        AND ($2::date IS NULL OR (s.created_at AT TIME ZONE 'UTC') < $2::date + 1)
    GROUP BY t.id, t.name
"#;

impl StatsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn overview(&self, actor: &Actor) -> AppResult<StatsOverview> {
        actor.require_admin()?;

        let today = Utc::now().date_naive();
        let this_month = start_of_month(today);
        let last_month = add_months(today, -1);

        let totals = sqlx::query_as::<_, OverviewTotals>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM clients) AS clients,
                (SELECT COUNT(*) FROM equipment) AS equipment,
                (SELECT COALESCE(SUM(total), 0) FROM quotes WHERE status = 'accepted') AS revenue,
                (SELECT COUNT(*) FROM services WHERE created_at >= $1) AS services_this_month,
                (SELECT COUNT(*) FROM services
                  WHERE created_at >= $2 AND created_at < $1) AS services_last_month,
                (SELECT COALESCE(SUM(total), 0) FROM quotes
                  WHERE status = 'accepted' AND responded_at >= $1) AS revenue_this_month,
                (SELECT COALESCE(SUM(total), 0) FROM quotes
                  WHERE status = 'accepted' AND responded_at >= $2
                    AND responded_at < $1) AS revenue_last_month,
                (SELECT (AVG(EXTRACT(EPOCH FROM (completed_at - started_at))) / 3600.0)::float8
                   FROM services
                  WHERE status = 'completed' AND started_at IS NOT NULL
                    AND completed_at IS NOT NULL) AS avg_completion_hours
            "#,
        )
        .bind(utc_midnight(this_month))
        .bind(utc_midnight(last_month))
        .fetch_one(&self.db)
        .await?;

        let technicians = self.status_counts("technicians", &TECHNICIAN_STATUSES).await?;
        let services = self.status_counts("services", &SERVICE_STATUSES).await?;
        let quotes = self.status_counts("quotes", &QUOTE_STATUSES).await?;

        Ok(StatsOverview {
            clients: totals.clients,
            equipment: totals.equipment,
            technicians,
            services,
            quotes,
            revenue: totals.revenue,
            services_this_month: totals.services_this_month,
            services_last_month: totals.services_last_month,
            services_growth_percent: growth_percent(
                totals.services_this_month as f64,
                totals.services_last_month as f64,
            ),
            revenue_this_month: totals.revenue_this_month,
            revenue_last_month: totals.revenue_last_month,
            revenue_growth_percent: decimal_growth_percent(
                totals.revenue_this_month,
                totals.revenue_last_month,
            ),
            avg_completion_hours: totals.avg_completion_hours.map(round2),
        })
    }

    /// Services per calendar month, oldest first, ending with the current month
    pub async fn services_by_month(
        &self,
        actor: &Actor,
        months: Option<u32>,
    ) -> AppResult<Vec<MonthlyServiceStats>> {
        actor.require_admin()?;
        let window = month_window(Utc::now().date_naive(), clamp_months(months));
        let since = baseline_month(&window)
            .unwrap_or_else(|| start_of_month(Utc::now().date_naive()));

        let rows = sqlx::query_as::<_, MonthlyServiceRow>(
            r#"
            SELECT TO_CHAR(DATE_TRUNC('month', created_at AT TIME ZONE 'UTC'), 'YYYY-MM') AS period,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                   COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled
            FROM services
            WHERE created_at >= $1
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(utc_midnight(since))
        .fetch_all(&self.db)
        .await?;

        Ok(service_series(&window, &rows))
    }

    /// Quotes per calendar month with conversion and accepted amounts
    pub async fn quotes_by_month(
        &self,
        actor: &Actor,
        months: Option<u32>,
    ) -> AppResult<Vec<MonthlyQuoteStats>> {
        actor.require_admin()?;
        let window = month_window(Utc::now().date_naive(), clamp_months(months));
        let since = baseline_month(&window)
            .unwrap_or_else(|| start_of_month(Utc::now().date_naive()));

        let rows = sqlx::query_as::<_, MonthlyQuoteRow>(
            r#"
            SELECT TO_CHAR(DATE_TRUNC('month', created_at AT TIME ZONE 'UTC'), 'YYYY-MM') AS period,
                   COUNT(*) AS created,
                   COUNT(*) FILTER (WHERE status = 'accepted') AS accepted,
                   COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                   COALESCE(SUM(total) FILTER (WHERE status = 'accepted'), 0) AS accepted_amount
            FROM quotes
            WHERE created_at >= $1
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(utc_midnight(since))
        .fetch_all(&self.db)
        .await?;

        Ok(quote_series(&window, &rows))
    }

    pub async fn technician_ranking(
        &self,
        actor: &Actor,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<TechnicianRanking>> {
        actor.require_admin()?;
        self.ranking(from, to).await
    }

    /// Personal figures for whoever is signed in
    pub async fn my_stats(&self, actor: &Actor) -> AppResult<MyStats> {
        match actor.role {
            UserRole::Admin => Ok(MyStats::Admin(self.overview(actor).await?)),
            UserRole::Technician => {
                let technician_id = actor.scope()?.technician_filter().ok_or_else(|| {
                    AppError::Forbidden("account is not linked to a technician profile".to_string())
                })?;

                let ranking = self
                    .ranking(None, None)
                    .await?
                    .into_iter()
                    .find(|r| r.technician_id == technician_id);

                let open_services = sqlx::query_as::<_, ServiceJob>(&format!(
                    r#"
                    SELECT {} FROM services s
                    WHERE s.technician_id = $1
                      AND s.status IN ('pending', 'scheduled', 'in_progress')
                    ORDER BY s.scheduled_at ASC NULLS LAST, s.created_at ASC
                    "#,
                    SERVICE_COLUMNS
                ))
                .bind(technician_id)
                .fetch_all(&self.db)
                .await?;

                Ok(MyStats::Technician {
                    ranking,
                    open_services,
                })
            }
            UserRole::Client => {
                let client_id = actor.scope()?.client_filter().ok_or_else(|| {
                    AppError::Forbidden("account is not linked to a client profile".to_string())
                })?;

                let rows = sqlx::query_as::<_, (String, i64)>(
                    "SELECT status, COUNT(*) FROM services WHERE client_id = $1 GROUP BY status",
                )
                .bind(client_id)
                .fetch_all(&self.db)
                .await?;

                let (equipment, pending_quotes, total_spent) =
                    sqlx::query_as::<_, (i64, i64, Decimal)>(
                        r#"
                        SELECT
                            (SELECT COUNT(*) FROM equipment WHERE client_id = $1),
                            (SELECT COUNT(*) FROM quotes WHERE client_id = $1 AND status = 'sent'),
                            (SELECT COALESCE(SUM(total), 0) FROM quotes
                              WHERE client_id = $1 AND status = 'accepted')
                        "#,
                    )
                    .bind(client_id)
                    .fetch_one(&self.db)
                    .await?;

                Ok(MyStats::Client {
                    services: zero_filled(&SERVICE_STATUSES, rows),
                    equipment,
                    pending_quotes,
                    total_spent,
                })
            }
        }
    }

    /// Render rows as CSV with a header line
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }

    async fn ranking(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<TechnicianRanking>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::validation("from", "from must not be after to"));
            }
        }

        let tallies = sqlx::query_as::<_, TechnicianTally>(TALLY_QUERY)
            .bind(from)
            .bind(to)
            .fetch_all(&self.db)
            .await?;

        Ok(rank_technicians(tallies))
    }

    async fn status_counts(
        &self,
        table: &str,
        statuses: &[&str],
    ) -> AppResult<BTreeMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            table
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(zero_filled(statuses, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_are_utc() {
        let start = utc_midnight(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(start.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert_eq!(TALLY_QUERY.matches("s.created_at AT TIME ZONE 'UTC'").count(), 2);
    }

    #[test]
    fn missing_statuses_count_zero() {
        let counts = zero_filled(
            &SERVICE_STATUSES,
            vec![("pending".to_string(), 3), ("completed".to_string(), 7)],
        );
        assert_eq!(counts.len(), 5);
        assert_eq!(counts["pending"], 3);
        assert_eq!(counts["completed"], 7);
        assert_eq!(counts["in_progress"], 0);
    }

    #[test]
    fn csv_format_detection() {
        let query = StatsQuery {
            format: Some("CSV".to_string()),
            ..Default::default()
        };
        assert!(query.wants_csv());
        assert!(!StatsQuery::default().wants_csv());
    }

    #[test]
    fn monthly_rows_export_with_header() {
        let rows = vec![MonthlyServiceStats {
            period: "2025-01".to_string(),
            total: 4,
            completed: 3,
            cancelled: 1,
            completion_rate: 75.0,
            growth_percent: 0.0,
        }];
        let csv = StatsService::export_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("period,total,completed,cancelled,completion_rate,growth_percent")
        );
        assert_eq!(lines.next(), Some("2025-01,4,3,1,75.0,0.0"));
    }
}

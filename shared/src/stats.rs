//! Statistics math
//!
//! The backend runs the grouped SQL; everything here turns those rows into
//! zero-filled monthly series, growth percentages and technician rankings.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_STATS_MONTHS: u32 = 12;
pub const MAX_STATS_MONTHS: u32 = 36;

/// Weight of the completion rate in the efficiency score; speed gets the rest
const COMPLETION_WEIGHT: f64 = 0.7;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percent change from `previous` to `current`.
///
/// With no baseline, any activity counts as 100% growth and none as 0%.
pub fn growth_percent(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    round2((current - previous) / previous * 100.0)
}

pub fn decimal_growth_percent(current: Decimal, previous: Decimal) -> f64 {
    growth_percent(
        current.to_f64().unwrap_or(0.0),
        previous.to_f64().unwrap_or(0.0),
    )
}

/// `part / whole` as a percentage, 0 when `whole` is 0
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// Share of answered quotes that were accepted
pub fn conversion_rate(accepted: i64, rejected: i64) -> f64 {
    percentage(accepted, accepted + rejected)
}

pub fn clamp_months(months: Option<u32>) -> u32 {
    months
        .unwrap_or(DEFAULT_STATS_MONTHS)
        .clamp(1, MAX_STATS_MONTHS)
}

pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month `delta` months away from the month of `date`
pub fn add_months(date: NaiveDate, delta: i32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 + delta;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_else(|| start_of_month(date))
}

/// `YYYY-MM` label used to join SQL buckets with the window
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// First days of the `months` calendar months ending with the month of `today`, oldest first
pub fn month_window(today: NaiveDate, months: u32) -> Vec<NaiveDate> {
    let months = months.max(1) as i32;
    (0..months)
        .map(|i| add_months(today, i - (months - 1)))
        .collect()
}

/// Services grouped by creation month, as returned by SQL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MonthlyServiceRow {
    pub period: String,
    pub total: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyServiceStats {
    pub period: String,
    pub total: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub completion_rate: f64,
    pub growth_percent: f64,
}

/// The month before the window, whose totals seed the first growth figure
pub fn baseline_month(window: &[NaiveDate]) -> Option<NaiveDate> {
    window.first().map(|first| add_months(*first, -1))
}

/// Zero-fill the window and compute month-over-month growth of the totals.
///
/// `rows` may also carry the month before the window; the first month is
/// compared with it (a missing month counts as zero).
pub fn service_series(
    window: &[NaiveDate],
    rows: &[MonthlyServiceRow],
) -> Vec<MonthlyServiceStats> {
    let by_period: HashMap<&str, &MonthlyServiceRow> =
        rows.iter().map(|r| (r.period.as_str(), r)).collect();

    let mut previous: Option<i64> = baseline_month(window).map(|month| {
        by_period
            .get(month_key(month).as_str())
            .map_or(0, |r| r.total)
    });
    window
        .iter()
        .map(|month| {
            let period = month_key(*month);
            let (total, completed, cancelled) = by_period
                .get(period.as_str())
                .map(|r| (r.total, r.completed, r.cancelled))
                .unwrap_or((0, 0, 0));
            let growth = previous
                .map(|prev| growth_percent(total as f64, prev as f64))
                .unwrap_or(0.0);
            previous = Some(total);
            MonthlyServiceStats {
                period,
                total,
                completed,
                cancelled,
                completion_rate: percentage(completed, total),
                growth_percent: growth,
            }
        })
        .collect()
}

/// Quotes grouped by creation month, as returned by SQL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MonthlyQuoteRow {
    pub period: String,
    pub created: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub accepted_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyQuoteStats {
    pub period: String,
    pub created: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub accepted_amount: Decimal,
    pub conversion_rate: f64,
    pub amount_growth_percent: f64,
}

pub fn quote_series(window: &[NaiveDate], rows: &[MonthlyQuoteRow]) -> Vec<MonthlyQuoteStats> {
    let by_period: HashMap<&str, &MonthlyQuoteRow> =
        rows.iter().map(|r| (r.period.as_str(), r)).collect();

    let mut previous: Option<Decimal> = baseline_month(window).map(|month| {
        by_period
            .get(month_key(month).as_str())
            .map_or(Decimal::ZERO, |r| r.accepted_amount)
    });
    window
        .iter()
        .map(|month| {
            let period = month_key(*month);
            let (created, accepted, rejected, amount) = by_period
                .get(period.as_str())
                .map(|r| (r.created, r.accepted, r.rejected, r.accepted_amount))
                .unwrap_or((0, 0, 0, Decimal::ZERO));
            let growth = previous
                .map(|prev| decimal_growth_percent(amount, prev))
                .unwrap_or(0.0);
            previous = Some(amount);
            MonthlyQuoteStats {
                period,
                created,
                accepted,
                rejected,
                accepted_amount: amount,
                conversion_rate: conversion_rate(accepted, rejected),
                amount_growth_percent: growth,
            }
        })
        .collect()
}

/// Per-technician job counts, as returned by SQL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TechnicianTally {
    pub technician_id: Uuid,
    pub name: String,
    pub assigned: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub open: i64,
    pub avg_completion_hours: Option<f64>,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicianRanking {
    pub rank: u32,
    pub technician_id: Uuid,
    pub name: String,
    pub assigned: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub open: i64,
    pub avg_completion_hours: Option<f64>,
    pub revenue: Decimal,
    pub completion_rate: f64,
    pub efficiency_score: f64,
}

/// Speed relative to the fastest technician, 0-100
fn speed_score(own_avg: Option<f64>, fastest_avg: Option<f64>) -> f64 {
    match (own_avg, fastest_avg) {
        (Some(own), _) if own <= 0.0 => 100.0,
        (Some(own), Some(fastest)) => (fastest.max(0.0) / own * 100.0).min(100.0),
        _ => 0.0,
    }
}

/// Score and order technicians.
///
/// Ordered by efficiency score, then completed jobs, then name; ranks are 1-based.
pub fn rank_technicians(tallies: Vec<TechnicianTally>) -> Vec<TechnicianRanking> {
    let fastest = tallies
        .iter()
        .filter_map(|t| t.avg_completion_hours)
        .filter(|h| *h > 0.0)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.min(h))));

    let mut ranked: Vec<TechnicianRanking> = tallies
        .into_iter()
        .map(|t| {
            let completion_rate = percentage(t.completed, t.assigned);
            let score = COMPLETION_WEIGHT * completion_rate
                + (1.0 - COMPLETION_WEIGHT) * speed_score(t.avg_completion_hours, fastest);
            TechnicianRanking {
                rank: 0,
                technician_id: t.technician_id,
                name: t.name,
                assigned: t.assigned,
                completed: t.completed,
                cancelled: t.cancelled,
                open: t.open,
                avg_completion_hours: t.avg_completion_hours.map(round2),
                revenue: t.revenue,
                completion_rate,
                efficiency_score: round2(score),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.efficiency_score
            .total_cmp(&a.efficiency_score)
            .then_with(|| b.completed.cmp(&a.completed))
            .then_with(|| a.name.cmp(&b.name))
    });
    for (i, r) in ranked.iter_mut().enumerate() {
        r.rank = i as u32 + 1;
    }
    ranked
}

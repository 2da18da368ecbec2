//! Business statistics tests
//!
//! Property-based and unit tests for:
//! - Month-over-month growth
//! - Monthly windows and zero-filled series
//! - Technician efficiency ranking

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    add_months, baseline_month, clamp_months, growth_percent, month_key, month_window, percentage,
    quote_series, rank_technicians, service_series, MonthlyQuoteRow, MonthlyServiceRow,
    TechnicianTally, DEFAULT_STATS_MONTHS, MAX_STATS_MONTHS,
};
use uuid::Uuid;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn count_strategy() -> impl Strategy<Value = i64> {
    0i64..10_000
}

fn tally_strategy() -> impl Strategy<Value = TechnicianTally> {
    (
        "[A-Z][a-z]{2,10}",
        0i64..200,
        0.0f64..1.0,
        proptest::option::of(0.5f64..48.0),
    )
        .prop_map(|(name, assigned, share, hours)| {
            let completed = (assigned as f64 * share).floor() as i64;
            TechnicianTally {
                technician_id: Uuid::new_v4(),
                name,
                assigned,
                completed,
                cancelled: 0,
                open: assigned - completed,
                avg_completion_hours: if completed > 0 { hours } else { None },
                revenue: Decimal::ZERO,
            }
        })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Growth from a non-zero baseline is (cur - prev) / prev * 100
    #[test]
    fn prop_growth_formula(cur in count_strategy(), prev in 1i64..10_000) {
        let expected = (cur - prev) as f64 / prev as f64 * 100.0;
        let got = growth_percent(cur as f64, prev as f64);
        prop_assert!((got - expected).abs() <= 0.0051 + 1e-9 * expected.abs());
    }

    /// A zero baseline gives 100% for any activity and 0% otherwise
    #[test]
    fn prop_growth_zero_baseline(cur in count_strategy()) {
        let expected = if cur > 0 { 100.0 } else { 0.0 };
        prop_assert_eq!(growth_percent(cur as f64, 0.0), expected);
    }

    /// Growth never drops below -100%
    #[test]
    fn prop_growth_bounded_below(cur in count_strategy(), prev in count_strategy()) {
        prop_assert!(growth_percent(cur as f64, prev as f64) >= -100.0);
    }

    /// The window has the requested length, ends in the current month and
    /// steps one month at a time
    #[test]
    fn prop_window_shape(today in date_strategy(), months in 1u32..=MAX_STATS_MONTHS) {
        let window = month_window(today, months);
        prop_assert_eq!(window.len(), months as usize);
        prop_assert_eq!(month_key(*window.last().unwrap()), month_key(today));
        for pair in window.windows(2) {
            prop_assert_eq!(add_months(pair[0], 1), pair[1]);
        }
    }

    /// Months are clamped into 1..=MAX_STATS_MONTHS
    #[test]
    fn prop_months_clamped(months in proptest::option::of(any::<u32>())) {
        let clamped = clamp_months(months);
        prop_assert!((1..=MAX_STATS_MONTHS).contains(&clamped));
    }

    /// Series keep every month of the window even without data
    #[test]
    fn prop_series_zero_filled(today in date_strategy(), months in 1u32..=24) {
        let window = month_window(today, months);
        let series = service_series(&window, &[]);
        prop_assert_eq!(series.len(), window.len());
        prop_assert!(series.iter().all(|m| m.total == 0 && m.growth_percent == 0.0));
    }

    /// The first month of the window grows from the month before it
    #[test]
    fn prop_first_month_uses_baseline(
        today in date_strategy(),
        months in 1u32..=MAX_STATS_MONTHS,
        before in count_strategy(),
        first in count_strategy(),
    ) {
        let window = month_window(today, months);
        let row = |month: NaiveDate, total: i64| MonthlyServiceRow {
            period: month_key(month),
            total,
            completed: 0,
            cancelled: 0,
        };
        let rows = vec![
            row(baseline_month(&window).unwrap(), before),
            row(window[0], first),
        ];
        let series = service_series(&window, &rows);
        prop_assert_eq!(series.len(), window.len());
        prop_assert_eq!(
            series[0].growth_percent,
            growth_percent(first as f64, before as f64)
        );
    }

    /// Completion rate is a percentage
    #[test]
    fn prop_percentage_in_range(whole in 0i64..10_000, share in 0.0f64..=1.0) {
        let part = (whole as f64 * share).floor() as i64;
        let rate = percentage(part, whole);
        prop_assert!((0.0..=100.0).contains(&rate));
    }

    /// Ranks are 1..=n and scores never increase down the list
    #[test]
    fn prop_ranking_ordered(tallies in prop::collection::vec(tally_strategy(), 0..20)) {
        let n = tallies.len();
        let ranked = rank_technicians(tallies);
        prop_assert_eq!(ranked.len(), n);
        for (i, r) in ranked.iter().enumerate() {
            prop_assert_eq!(r.rank as usize, i + 1);
            prop_assert!((0.0..=100.0).contains(&r.efficiency_score));
        }
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].efficiency_score >= pair[1].efficiency_score);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tally(name: &str, assigned: i64, completed: i64, hours: Option<f64>) -> TechnicianTally {
        TechnicianTally {
            technician_id: Uuid::new_v4(),
            name: name.to_string(),
            assigned,
            completed,
            cancelled: 0,
            open: assigned - completed,
            avg_completion_hours: hours,
            revenue: Decimal::ZERO,
        }
    }

    #[test]
    fn default_window_is_a_year() {
        assert_eq!(clamp_months(None), DEFAULT_STATS_MONTHS);
        assert_eq!(clamp_months(Some(0)), 1);
        assert_eq!(clamp_months(Some(120)), MAX_STATS_MONTHS);
    }

    #[test]
    fn ranking_example() {
        let ranked = rank_technicians(vec![
            tally("Bruno", 10, 8, Some(4.0)),
            tally("Idle", 0, 0, None),
            tally("Alice", 10, 8, Some(2.0)),
        ]);

        // 0.7 * 80 + 0.3 * 100
        assert_eq!(ranked[0].name, "Alice");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].completion_rate, 80.0);
        assert_eq!(ranked[0].efficiency_score, 86.0);

        // 0.7 * 80 + 0.3 * 50
        assert_eq!(ranked[1].name, "Bruno");
        assert_eq!(ranked[1].efficiency_score, 71.0);

        assert_eq!(ranked[2].name, "Idle");
        assert_eq!(ranked[2].efficiency_score, 0.0);
    }

    #[test]
    fn ranking_tie_prefers_more_completed() {
        let ranked = rank_technicians(vec![
            tally("Zed", 4, 4, Some(3.0)),
            tally("Amy", 2, 2, Some(3.0)),
        ]);
        assert_eq!(ranked[0].efficiency_score, ranked[1].efficiency_score);
        assert_eq!(ranked[0].name, "Zed");
    }

    #[test]
    fn service_series_growth() {
        let window = month_window(date(2025, 3, 10), 3);
        let rows = vec![
            MonthlyServiceRow {
                period: "2025-01".to_string(),
                total: 4,
                completed: 3,
                cancelled: 1,
            },
            MonthlyServiceRow {
                period: "2025-02".to_string(),
                total: 6,
                completed: 3,
                cancelled: 0,
            },
        ];
        let series = service_series(&window, &rows);
        let periods: Vec<&str> = series.iter().map(|m| m.period.as_str()).collect();
        assert_eq!(periods, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(series[0].completion_rate, 75.0);
        // Nothing in December 2024
        assert_eq!(series[0].growth_percent, 100.0);
        assert_eq!(series[1].growth_percent, 50.0);
        assert_eq!(series[2].growth_percent, -100.0);
    }

    #[test]
    fn single_month_window_compares_with_last_month() {
        let window = month_window(date(2026, 3, 15), 1);
        let rows = vec![
            MonthlyServiceRow {
                period: "2026-02".to_string(),
                total: 10,
                completed: 8,
                cancelled: 0,
            },
            MonthlyServiceRow {
                period: "2026-03".to_string(),
                total: 5,
                completed: 2,
                cancelled: 1,
            },
        ];
        let series = service_series(&window, &rows);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].total, 5);
        assert_eq!(series[0].growth_percent, -50.0);

        let quotes = quote_series(
            &window,
            &[MonthlyQuoteRow {
                period: "2026-02".to_string(),
                created: 2,
                accepted: 2,
                rejected: 0,
                accepted_amount: Decimal::new(40000, 2),
            }],
        );
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].accepted_amount, Decimal::ZERO);
        assert_eq!(quotes[0].amount_growth_percent, -100.0);
    }

    #[test]
    fn quote_series_tracks_accepted_amounts() {
        let window = month_window(date(2025, 2, 1), 2);
        let rows = vec![
            MonthlyQuoteRow {
                period: "2025-01".to_string(),
                created: 5,
                accepted: 2,
                rejected: 2,
                accepted_amount: Decimal::new(100000, 2),
            },
            MonthlyQuoteRow {
                period: "2025-02".to_string(),
                created: 3,
                accepted: 3,
                rejected: 0,
                accepted_amount: Decimal::new(150000, 2),
            },
        ];
        let series = quote_series(&window, &rows);
        assert_eq!(series[0].conversion_rate, 50.0);
        assert_eq!(series[1].conversion_rate, 100.0);
        assert_eq!(series[1].amount_growth_percent, 50.0);
        assert_eq!(series[1].accepted_amount, Decimal::new(150000, 2));
    }
}

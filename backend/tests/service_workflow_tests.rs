//! Service job workflow tests
//!
//! Property-based and unit tests for:
//! - The status state machine
//! - Start/completion stamps and derived hours
//! - Technician availability and equipment dates

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    elapsed_hours, validate_warranty_dates, ServiceJob, ServicePriority, ServiceStatus,
    ServiceType, TechnicianStatus,
};
use uuid::Uuid;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn status_strategy() -> impl Strategy<Value = ServiceStatus> {
    prop_oneof![
        Just(ServiceStatus::Pending),
        Just(ServiceStatus::Scheduled),
        Just(ServiceStatus::InProgress),
        Just(ServiceStatus::Completed),
        Just(ServiceStatus::Cancelled),
    ]
}

/// Instants between 2020 and roughly 2030
fn instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

fn job(status: ServiceStatus) -> ServiceJob {
    let now = Utc::now();
    ServiceJob {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        technician_id: Some(Uuid::new_v4()),
        equipment_id: None,
        title: "Air conditioner not cooling".to_string(),
        description: None,
        service_type: ServiceType::Repair,
        priority: ServicePriority::High,
        status,
        scheduled_at: None,
        started_at: None,
        completed_at: None,
        estimated_hours: None,
        actual_hours: None,
        cost: None,
        diagnosis: None,
        resolution: None,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Completed and cancelled jobs never move again
    #[test]
    fn prop_terminal_is_final(from in status_strategy(), to in status_strategy()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    /// No status transitions to itself
    #[test]
    fn prop_no_self_transition(status in status_strategy()) {
        prop_assert!(!status.can_transition_to(status));
    }

    /// Completion is only reachable from in-progress
    #[test]
    fn prop_completion_needs_work(from in status_strategy()) {
        prop_assert_eq!(
            from.can_transition_to(ServiceStatus::Completed),
            from == ServiceStatus::InProgress
        );
    }

    /// Every open job can still be cancelled
    #[test]
    fn prop_open_jobs_cancellable(status in status_strategy()) {
        prop_assert_eq!(
            status.can_transition_to(ServiceStatus::Cancelled),
            status.is_open()
        );
    }

    /// Derived hours match the elapsed time and are never negative
    #[test]
    fn prop_elapsed_hours(start in instant_strategy(), minutes in -600i64..6_000) {
        let end = start + Duration::minutes(minutes);
        let hours = elapsed_hours(start, end);
        prop_assert!(hours >= Decimal::ZERO);
        if minutes >= 0 {
            let exact = Decimal::from(minutes) / Decimal::from(60);
            prop_assert!((hours - exact).abs() <= Decimal::new(5, 3));
        } else {
            prop_assert_eq!(hours, Decimal::ZERO);
        }
    }

    /// Completing stamps completed_at and keeps an existing start
    #[test]
    fn prop_completion_stamps(start in instant_strategy(), minutes in 1i64..6_000) {
        let now = start + Duration::minutes(minutes);
        let mut j = job(ServiceStatus::InProgress);
        j.started_at = Some(start);
        let stamps = j.stamps_for(ServiceStatus::Completed, now, None);
        prop_assert_eq!(stamps.started_at, Some(start));
        prop_assert_eq!(stamps.completed_at, Some(now));
        prop_assert!(stamps.actual_hours.is_some());
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn full_lifecycle() {
        let path = [
            ServiceStatus::Pending,
            ServiceStatus::Scheduled,
            ServiceStatus::InProgress,
            ServiceStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn scheduled_can_go_back_to_pending() {
        assert!(ServiceStatus::Scheduled.can_transition_to(ServiceStatus::Pending));
        assert!(!ServiceStatus::InProgress.can_transition_to(ServiceStatus::Pending));
    }

    #[test]
    fn start_time_set_on_first_start() {
        let now = Utc::now();
        let stamps = job(ServiceStatus::Scheduled).stamps_for(ServiceStatus::InProgress, now, None);
        assert_eq!(stamps.started_at, Some(now));
        assert_eq!(stamps.completed_at, None);
    }

    #[test]
    fn completion_without_start_leaves_hours_empty() {
        let now = Utc::now();
        let stamps = job(ServiceStatus::InProgress).stamps_for(ServiceStatus::Completed, now, None);
        assert_eq!(stamps.actual_hours, None);
        assert_eq!(stamps.completed_at, Some(now));
    }

    #[test]
    fn supplied_hours_win() {
        let now = Utc::now();
        let mut j = job(ServiceStatus::InProgress);
        j.started_at = Some(now - Duration::hours(5));
        let stamps = j.stamps_for(ServiceStatus::Completed, now, Some(Decimal::new(35, 1)));
        assert_eq!(stamps.actual_hours, Some(Decimal::new(35, 1)));
    }

    #[test]
    fn cancelling_keeps_stamps() {
        let now = Utc::now();
        let mut j = job(ServiceStatus::InProgress);
        j.started_at = Some(now - Duration::hours(1));
        let stamps = j.stamps_for(ServiceStatus::Cancelled, now, None);
        assert_eq!(stamps.started_at, j.started_at);
        assert_eq!(stamps.completed_at, None);
    }

    #[test]
    fn elapsed_hours_rounds_to_cents() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 10, 20, 0).unwrap();
        // 2h20m = 2.333...
        assert_eq!(elapsed_hours(start, end), Decimal::new(233, 2));
    }

    #[test]
    fn inactive_technicians_take_no_jobs() {
        assert!(TechnicianStatus::Available.can_take_jobs());
        assert!(TechnicianStatus::Busy.can_take_jobs());
        assert!(!TechnicianStatus::Inactive.can_take_jobs());
    }

    #[test]
    fn warranty_after_purchase() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert!(validate_warranty_dates(Some(d(2024, 5, 1)), Some(d(2024, 5, 1))).is_ok());
        assert!(validate_warranty_dates(Some(d(2024, 5, 2)), Some(d(2024, 5, 1))).is_err());
        assert!(validate_warranty_dates(None, None).is_ok());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ServiceStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        let parsed: ServiceStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, ServiceStatus::Cancelled);
    }
}

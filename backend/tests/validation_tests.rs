//! Input validation tests
//!
//! Property-based and unit tests for:
//! - Accounts (email, password)
//! - Contact details and serial numbers
//! - Pagination and search terms

use proptest::prelude::*;
use shared::{
    normalize_email, search_pattern, validate_password, validate_phone, validate_serial_number,
    Pagination, PaginationMeta, MAX_PER_PAGE,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

fn email_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z]{3,10}@[A-Za-z]{3,8}\\.(com|org|net)"
}

/// Letters and digits, at least one of each, 8+ characters
fn password_strategy() -> impl Strategy<Value = String> {
    ("[a-zA-Z]{4,12}", "[0-9]{4,8}").prop_map(|(letters, digits)| format!("{}{}", letters, digits))
}

fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[0-9]{7,15}",
        "\\+[0-9]{1,3} [0-9]{3} [0-9]{3} [0-9]{4}",
        "\\([0-9]{3}\\) [0-9]{3}-[0-9]{4}",
    ]
}

fn serial_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{2,4}-[0-9]{4}/[0-9]{2,6}"
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Normalized emails are lower-case and idempotent
    #[test]
    fn prop_email_normalization(email in email_strategy()) {
        let once = normalize_email(&format!("  {}  ", email));
        prop_assert_eq!(once.clone(), email.to_lowercase());
        prop_assert_eq!(normalize_email(&once), once);
    }

    #[test]
    fn prop_valid_passwords(password in password_strategy()) {
        prop_assert!(validate_password(&password).is_ok());
    }

    /// Passwords without digits are refused
    #[test]
    fn prop_letters_only_password(password in "[a-zA-Z]{8,20}") {
        prop_assert!(validate_password(&password).is_err());
    }

    #[test]
    fn prop_valid_phones(phone in phone_strategy()) {
        prop_assert!(validate_phone(&phone).is_ok());
    }

    /// Letters in a phone number are never accepted
    #[test]
    fn prop_phone_rejects_letters(prefix in "[0-9]{4}", letters in "[a-zA-Z]{1,4}", suffix in "[0-9]{4}") {
        let phone = format!("{}{}{}", prefix, letters, suffix);
        prop_assert!(validate_phone(&phone).is_err());
    }

    #[test]
    fn prop_valid_serials(serial in serial_strategy()) {
        prop_assert!(validate_serial_number(&serial).is_ok());
    }

    /// Pagination always stays within bounds
    #[test]
    fn prop_pagination_clamped(
        page in proptest::option::of(any::<u32>()),
        per_page in proptest::option::of(any::<u32>()),
    ) {
        let p = Pagination::from_query(page, per_page);
        prop_assert!(p.page >= 1);
        prop_assert!((1..=MAX_PER_PAGE).contains(&p.per_page));
        prop_assert!(p.offset() >= 0);
    }

    /// total_pages * per_page covers every item without a spare page
    #[test]
    fn prop_total_pages(total in 0i64..100_000, per_page in 1u32..=MAX_PER_PAGE) {
        let meta = PaginationMeta::new(Pagination::from_query(Some(1), Some(per_page)), total);
        let covered = u64::from(meta.total_pages) * u64::from(per_page);
        prop_assert!(covered >= total as u64);
        prop_assert!(covered < total as u64 + u64::from(per_page));
    }

    /// Search patterns wrap the term and escape every wildcard
    #[test]
    fn prop_search_pattern(term in "[a-z%_]{1,20}") {
        let pattern = search_pattern(Some(term.as_str())).unwrap();
        prop_assert!(pattern.starts_with('%') && pattern.ends_with('%'));
        let inner = &pattern[1..pattern.len() - 1];
        let wildcards = term.chars().filter(|c| matches!(c, '%' | '_')).count();
        prop_assert_eq!(inner.matches('\\').count(), wildcards);
        prop_assert_eq!(inner.len(), term.len() + wildcards);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn short_password() {
        assert_eq!(
            validate_password("abc123"),
            Err("Password must be at least 8 characters")
        );
    }

    #[test]
    fn phone_digit_count() {
        assert!(validate_phone("123456").is_err());
        assert!(validate_phone("1234567").is_ok());
        assert!(validate_phone("123456789012345").is_ok());
        assert!(validate_phone("1234567890123456").is_err());
    }

    #[test]
    fn phone_plus_only_leading() {
        assert!(validate_phone("+44 20 7946 0958").is_ok());
        assert!(validate_phone("44+20 7946 0958").is_err());
    }

    #[test]
    fn serial_length_limits() {
        assert!(validate_serial_number("AB1").is_ok());
        assert!(validate_serial_number(&"X".repeat(64)).is_ok());
        assert!(validate_serial_number(&"X".repeat(65)).is_err());
        assert!(validate_serial_number("SN#001").is_err());
    }

    #[test]
    fn search_pattern_trims() {
        assert_eq!(search_pattern(Some("  boiler ")).as_deref(), Some("%boiler%"));
        assert_eq!(search_pattern(Some("a\\b")).as_deref(), Some("%a\\\\b%"));
    }

    #[test]
    fn default_pagination() {
        let p = Pagination::from_query(None, None);
        assert_eq!((p.page, p.per_page), (1, 20));
        assert_eq!(p.offset(), 0);
    }
}

//! Validation utilities shared by request schemas and services

use rust_decimal::Decimal;
use validator::ValidationError;

// ============================================================================
// Accounts
// ============================================================================

/// Emails are stored trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit())
        || !password.chars().any(|c| c.is_alphabetic())
    {
        return Err("Password must contain letters and digits");
    }
    Ok(())
}

// ============================================================================
// Contact details
// ============================================================================

/// Validate a phone number.
/// Accepts digits with spaces, dashes, dots and parentheses, optionally led by `+`;
/// 7 to 15 digits in total.
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '.' | '(' | ')'))
    {
        return Err("Phone number contains invalid characters");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(7..=15).contains(&digits) {
        return Err("Phone number must have between 7 and 15 digits");
    }
    Ok(())
}

/// Validate a serial number: 3-64 characters of letters, digits, `-`, `_`, `/`
pub fn validate_serial_number(serial: &str) -> Result<(), &'static str> {
    let serial = serial.trim();
    if serial.len() < 3 || serial.len() > 64 {
        return Err("Serial number must be 3-64 characters");
    }
    if !serial
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
    {
        return Err("Serial number may only contain letters, digits, '-', '_' and '/'");
    }
    Ok(())
}

// ============================================================================
// Money and hours
// ============================================================================

pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Value cannot be negative");
    }
    Ok(())
}

/// Work hours on a single job are capped at a thousand
pub fn validate_hours(hours: Decimal) -> Result<(), &'static str> {
    if hours < Decimal::ZERO || hours > Decimal::ONE_THOUSAND {
        return Err("Hours must be between 0 and 1000");
    }
    Ok(())
}

// ============================================================================
// `validator` adapters
// ============================================================================

fn to_validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// `#[validate(custom = "shared::phone")]`
pub fn phone(value: &str) -> Result<(), ValidationError> {
    validate_phone(value).map_err(|m| to_validation_error("phone", m))
}

/// `#[validate(custom = "shared::password")]`
pub fn password(value: &str) -> Result<(), ValidationError> {
    validate_password(value).map_err(|m| to_validation_error("password", m))
}

/// `#[validate(custom = "shared::serial_number")]`
pub fn serial_number(value: &str) -> Result<(), ValidationError> {
    validate_serial_number(value).map_err(|m| to_validation_error("serial_number", m))
}

/// `#[validate(custom = "shared::not_blank")]`
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(to_validation_error("not_blank", "Value cannot be blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("letters123").is_ok());
    }

    #[test]
    fn phone_formats() {
        assert!(validate_phone("+1 (555) 123-4567").is_ok());
        assert!(validate_phone("555.123.4567").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("555-CALL-NOW").is_err());
        assert!(validate_phone("+1234567890123456").is_err());
    }

    #[test]
    fn serial_numbers() {
        assert!(validate_serial_number("HV-2024/0012").is_ok());
        assert!(validate_serial_number("ab").is_err());
        assert!(validate_serial_number("has space").is_err());
    }

    #[test]
    fn hours_and_money() {
        assert!(validate_hours(Decimal::from_str("2.5").unwrap()).is_ok());
        assert!(validate_hours(Decimal::from(-1)).is_err());
        assert!(validate_hours(Decimal::from(1001)).is_err());
        assert!(validate_non_negative(Decimal::ZERO).is_ok());
        assert!(validate_non_negative(Decimal::from(-5)).is_err());
    }

    #[test]
    fn validator_adapters_carry_messages() {
        let err = phone("abc").unwrap_err();
        assert_eq!(err.code, "phone");
        assert!(err.message.is_some());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("x").is_ok());
    }
}

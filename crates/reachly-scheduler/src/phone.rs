//! Recipient phone validation.

use reachly_core::error::{ReachlyError, Result};

/// Normalize a phone number to the digits-only form the Cloud API expects.
///
/// Spaces, dashes, dots, parentheses and one leading `+` are dropped; what
/// remains must be 8 to 15 digits and must not start with `0`.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let invalid = |reason: &str| ReachlyError::Validation(format!("invalid phone '{raw}': {reason}"));

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("unexpected characters"));
    }
    if !(8..=15).contains(&digits.len()) {
        return Err(invalid("expected 8-15 digits"));
    }
    if digits.starts_with('0') {
        return Err(invalid("missing country code"));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_formatted_numbers() {
        assert_eq!(normalize_phone("+84 912-345.678").unwrap(), "84912345678");
        assert_eq!(normalize_phone("(1) 415 555 0100").unwrap(), "14155550100");
    }

    #[test]
    fn test_rejects_bad_numbers() {
        for raw in ["", "12345", "0912345678", "+84abc45678", "++84912345678", "1234567890123456"] {
            let err = normalize_phone(raw).unwrap_err();
            assert!(err.is_permanent(), "{raw}");
        }
    }
}

//! Field-level input checks shared by the domain input types.

use crate::error::ValidationError;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Check that `value` has between `min` and `max` characters (after trimming for the minimum).
pub fn check_len(errors: &mut ValidationError, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if value.trim().chars().count() < min {
        if min == 1 {
            errors.push(field, "must not be empty");
        } else {
            errors.push(field, format!("must be at least {min} characters"));
        }
    } else if len > max {
        errors.push(field, format!("must be at most {max} characters"));
    }
}

/// Fiscal year in `YYYY-YY` form, e.g. `2023-24`.
pub fn is_fiscal_year(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

/// Fiscal year end in `DD-Mon` form, e.g. `31-Mar`.
pub fn is_fiscal_year_end(value: &str) -> bool {
    match value.split_once('-') {
        Some((day, month)) => {
            day.len() == 2 && day.bytes().all(|b| b.is_ascii_digit()) && MONTHS.contains(&month)
        }
        None => false,
    }
}

/// ISO 4217 style code: three uppercase ASCII letters.
pub fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.bytes().all(|b| b.is_ascii_uppercase())
}

/// Check a list that must have at least one entry and no blank entries.
pub fn check_non_empty_list(errors: &mut ValidationError, field: &str, items: &[String]) {
    if items.is_empty() {
        errors.push(field, "must contain at least one entry");
    } else if items.iter().any(|item| item.trim().is_empty()) {
        errors.push(field, "entries cannot be empty strings");
    }
}

//! Value-level transforms applied by the cleaner.
//!
//! Each function maps one nullable text value to its cleaned form and never fails:
//! values that cannot be represented become missing instead of a guessed default.

use crate::constants::{BOOL_FALSE, BOOL_TRUE, EMPTY_ARRAY};

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Parse an integer column value.
///
/// Surrounding whitespace is ignored and whole-valued decimals such as `1990.0`
/// are accepted. Anything else, including blanks, becomes missing (never 0).
pub fn coerce_integer(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n.to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some((f as i64).to_string())
        }
        _ => None,
    }
}

/// Encode a comma-separated list as an array literal: `a, b ,c` -> `{a,b,c}`
pub fn encode_array(value: Option<&str>) -> Option<String> {
    if is_blank(value) {
        return None;
    }
    let elements: Vec<&str> = value?.split(',').map(str::trim).collect();
    Some(format!("{{{}}}", elements.join(",")))
}

/// Like [`encode_array`] but missing input becomes the empty array literal
pub fn encode_array_non_null(value: Option<&str>) -> Option<String> {
    encode_array(value).or_else(|| Some(EMPTY_ARRAY.to_string()))
}

/// Map a numeric 0/1 flag to a boolean literal; anything else is false
pub fn coerce_flag(value: Option<&str>) -> Option<String> {
    let literal = match value {
        Some("1") => BOOL_TRUE,
        _ => BOOL_FALSE,
    };
    Some(literal.to_string())
}

/// Replace a blank or missing value with `placeholder`
pub fn with_placeholder(value: Option<String>, placeholder: &str) -> Option<String> {
    if is_blank(value.as_deref()) {
        Some(placeholder.to_string())
    } else {
        value
    }
}

/// Replace a blank or missing value with `fallback`
pub fn with_fallback(value: Option<String>, fallback: Option<&str>) -> Option<String> {
    if is_blank(value.as_deref()) {
        fallback.map(str::to_string)
    } else {
        value
    }
}

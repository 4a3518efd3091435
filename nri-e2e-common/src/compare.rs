//! Exact and bounded comparison of observed query values.

use crate::value::{Value, coerce};

/// Why an observed value did not satisfy an expectation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompareError {
    #[error("assertion failure - expected: '{expected}', got '{actual}'")]
    Mismatch { expected: Value, actual: Value },

    #[error("assertion failure - expected value in range {range}, got {actual:.6}")]
    OutOfRange { range: String, actual: f64 },

    /// The observed value does not reduce to a number.
    #[error("could not assert type from any: expected a number, got '{actual}'")]
    NotNumeric { actual: Value },

    #[error("missing comparison bounds")]
    MissingBounds,
}

impl CompareError {
    /// Configuration problems are reported once and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingBounds)
    }
}

/// Compare two values for equality after coercing both sides.
pub fn compare_exact(expected: &Value, actual: &Value) -> Result<(), CompareError> {
    let expected = coerce(expected);
    let actual = coerce(actual);
    if expected == actual {
        return Ok(());
    }
    Err(CompareError::Mismatch { expected, actual })
}

/// Check that `actual` lies within `[lower, upper]`, inclusive.
///
/// A missing bound is treated as unbounded on that side. At least one bound is
/// required; calling this with neither is a configuration error no matter what
/// `actual` holds.
pub fn compare_bounded(
    actual: &Value,
    lower: Option<f64>,
    upper: Option<f64>,
) -> Result<(), CompareError> {
    if lower.is_none() && upper.is_none() {
        return Err(CompareError::MissingBounds);
    }

    let coerced = coerce(actual);
    let x = coerced
        .as_f64()
        .ok_or(CompareError::NotNumeric { actual: coerced })?;

    let above_lower = lower.is_none_or(|l| l <= x);
    let below_upper = upper.is_none_or(|u| x <= u);
    if above_lower && below_upper {
        return Ok(());
    }

    Err(CompareError::OutOfRange {
        range: format_range(lower, upper),
        actual: x,
    })
}

/// Render bounds as `[-INF,u]`, `[l,INF]` or `[l,u]`.
pub fn format_range(lower: Option<f64>, upper: Option<f64>) -> String {
    let lower = lower.map_or_else(|| "-INF".to_string(), |l| format!("{l:.6}"));
    let upper = upper.map_or_else(|| "INF".to_string(), |u| format!("{u:.6}"));
    format!("[{lower},{upper}]")
}

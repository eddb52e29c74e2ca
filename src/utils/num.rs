//! Numeric utilities: centralized integer and duration conversions.
//!
//! Guidelines
//! - Prefer saturating conversions for counters and limits: a limit that does not fit is
//!   treated as unbounded rather than truncated.
//! - Duration parsing from floating seconds never fails; out-of-domain inputs are normalized.

use std::time::Duration;

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u64_to_usize_saturating(v: u64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    if v > u128::from(u64::MAX) { u64::MAX } else { v as u64 }
}

/// Converts floating seconds into a limit duration.
///
/// NaN, zero and negatives map to `Duration::ZERO` ("trim everything");
/// infinities and values past `Duration::MAX` map to `Duration::MAX` ("unbounded").
#[must_use]
pub fn secs_f64_to_limit(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Inverse of [`secs_f64_to_limit`] for display; `Duration::MAX` becomes infinity.
#[must_use]
pub fn limit_to_secs_f64(d: Duration) -> f64 {
    if d == Duration::MAX { f64::INFINITY } else { d.as_secs_f64() }
}

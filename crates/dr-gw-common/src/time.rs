//! ---
//! gw_section: "01-core-functionality"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Shared primitives and utilities for the gateway runtime."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::time::Duration;

/// Signed difference between an observed interval and the expected one, in
/// microseconds. Positive values mean the cycle ran late.
pub fn jitter_us(actual: Duration, expected: Duration) -> i64 {
    let actual_us = actual.as_secs_f64() * 1_000_000.0;
    let expected_us = expected.as_secs_f64() * 1_000_000.0;
    (actual_us - expected_us).round() as i64
}

//! Timeframe clock - pure functions over wall-clock time
//!
//! Computes the boundary of the next timeframe-aligned bar and the
//! countdown to it. The trade anchor and the UI countdown both derive
//! from these; nothing here performs I/O.

use chrono::Utc;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of the next timeframe-aligned bar, strictly after `now_ms`.
///
/// Always a multiple of `timeframe_secs * 1000` and always > `now_ms`,
/// even when `now_ms` sits exactly on a boundary.
pub fn next_boundary(now_ms: i64, timeframe_secs: u32) -> i64 {
    let interval_ms = timeframe_secs as i64 * 1000;
    (now_ms.div_euclid(interval_ms) + 1) * interval_ms
}

/// Milliseconds until `boundary_ms`, clamped at zero
pub fn remaining(now_ms: i64, boundary_ms: i64) -> i64 {
    (boundary_ms - now_ms).max(0)
}

/// Format a countdown in milliseconds as "MM:SS"
pub fn format_countdown(ms: i64) -> String {
    let total_secs = (ms / 1000).max(0);
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

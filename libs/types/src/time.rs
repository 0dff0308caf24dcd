//! Exchange clock

use chrono::Utc;

/// Current wall-clock time in Unix nanoseconds
pub fn now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

use chrono::{DateTime, Duration, Utc};

/// Canonical timestamp format used across every store, matching SQLite's
/// own `strftime('%Y-%m-%dT%H:%M:%SZ','now')` default.
pub fn format(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn now_string() -> String {
    format(Utc::now())
}

/// Window length for a dashboard/growth `period` query param.
pub fn period_duration(period: &str) -> Duration {
    match period {
        "week" => Duration::days(7),
        "month" => Duration::days(30),
        "year" => Duration::days(365),
        _ => Duration::days(1),
    }
}

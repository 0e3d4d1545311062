use chrono::{DateTime, SecondsFormat, Utc};

/// ISO-8601 UTC with millisecond precision and a `Z` suffix,
/// e.g. `2026-01-02T03:04:05.678Z`. Fixed width, so string order is time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

use chrono::{DateTime, Duration, Utc};

/// "now - older_than". Durations too large for chrono saturate to the
/// earliest representable instant, so nothing is old enough to purge.
pub fn cutoff_ago(older_than: std::time::Duration) -> DateTime<Utc> {
    Duration::from_std(older_than)
        .ok()
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

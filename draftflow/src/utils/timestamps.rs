//! Timestamp helpers.

use chrono::{DateTime, Duration, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use draftflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp with microsecond precision and an explicit offset.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Milliseconds elapsed since `start`, clamped at zero.
#[must_use]
pub fn elapsed_ms(start: &Timestamp) -> u64 {
    let millis = (Utc::now() - *start).num_milliseconds();
    u64::try_from(millis).unwrap_or(0)
}

/// Returns true when `ts` lies strictly before `now - age`.
#[must_use]
pub fn is_older_than(ts: &Timestamp, age: std::time::Duration, now: &Timestamp) -> bool {
    let Ok(age) = Duration::from_std(age) else {
        return false;
    };
    now.checked_sub_signed(age).is_some_and(|cutoff| *ts < cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_is_older_than() {
        let now = now_utc();
        let old = now - Duration::seconds(120);
        assert!(is_older_than(&old, std::time::Duration::from_secs(60), &now));
        assert!(!is_older_than(&now, std::time::Duration::from_secs(60), &now));
    }

    #[test]
    fn test_elapsed_ms_never_negative() {
        let future = now_utc() + Duration::seconds(10);
        assert_eq!(elapsed_ms(&future), 0);
    }
}

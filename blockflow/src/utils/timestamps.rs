//! Timestamp helpers for event payloads.

use chrono::Utc;
use std::time::Instant;

/// Returns the current UTC time as an ISO 8601 string with microseconds,
/// e.g. `2024-01-01T12:00:00.000000+00:00`.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Milliseconds elapsed since `start`, as reported in `*.completed` events.
#[must_use]
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_iso_timestamp_parses() {
        let ts = iso_timestamp();
        assert!(ts.ends_with("+00:00"));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_elapsed_ms_is_non_negative() {
        let start = Instant::now();
        assert!(elapsed_ms(start) >= 0.0);
    }
}

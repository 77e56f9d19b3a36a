//! ID and timestamp utilities for msgloop
//!
//! Timestamps are microseconds since the Unix epoch so that a stop request
//! and a worker start in the same millisecond still order correctly.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Get current timestamp in microseconds since Unix epoch
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Render a microsecond timestamp as RFC 3339, for logs and status output
pub fn format_micros(micros: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| micros.to_string())
}

/// Generate a unique message ID
///
/// Format: `msg-{timestamp_micros}-{random_hex}`
pub fn generate_message_id() -> String {
    let random: u16 = rand::rng().random();
    format!("msg-{}-{:04x}", now_micros(), random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_micros_returns_reasonable_timestamp() {
        let ts = now_micros();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1_577_836_800_000_000);
        assert!(ts < 4_102_444_800_000_000);
    }

    #[test]
    fn test_now_micros_is_monotonic_enough() {
        let a = now_micros();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_micros();
        assert!(b > a);
    }

    #[test]
    fn test_format_micros() {
        assert_eq!(format_micros(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_generate_message_id_format() {
        let id = generate_message_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "msg");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_message_id_uniqueness() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert_ne!(id1, id2);
    }
}

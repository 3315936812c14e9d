//! Trait definitions shared across `OpenUsage` crates.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Wall clock used by token policies, device flows and the refresh cooldown.
///
/// Everything time-dependent reads the clock through this trait so tests can
/// pin or advance it.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Current time as an RFC 3339 string with millisecond precision.
    fn now_iso(&self) -> String {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .map(|dt: DateTime<Utc>| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i64);

    impl Clock for Fixed {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_now_iso_formats_millis() {
        let clock = Fixed(1_700_000_000_123);
        assert_eq!(clock.now_iso(), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}

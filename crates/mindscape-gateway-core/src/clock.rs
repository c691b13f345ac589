// crates/mindscape-gateway-core/src/clock.rs
// ============================================================================
// Module: Gateway Clock
// Description: Injectable wall clock and RFC 3339 formatting.
// Purpose: Keep result timestamps and token expiry checks testable.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Result metadata and confirmation expiry both read the current time. Hosts
//! inject a [`Clock`]; production uses [`SystemClock`] and tests use
//! [`FixedClock`], which can be moved forward to exercise expiry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;

    /// Returns the current time as unix seconds.
    fn unix_seconds(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Settable clock for deterministic tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    /// Current unix seconds.
    seconds: AtomicI64,
}

impl FixedClock {
    /// Creates a clock pinned at `seconds` since the unix epoch.
    #[must_use]
    pub const fn at(seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(seconds),
        }
    }

    /// Pins the clock at a new instant.
    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        let seconds = self.seconds.load(Ordering::SeqCst);
        OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    fn unix_seconds(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats a UTC instant as RFC 3339.
///
/// Falls back to decimal unix seconds for instants RFC 3339 cannot express.
#[must_use]
pub fn format_rfc3339(instant: OffsetDateTime) -> String {
    instant.format(&Rfc3339).unwrap_or_else(|_| instant.unix_timestamp().to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Clock;
    use super::FixedClock;
    use super::format_rfc3339;

    #[test]
    fn fixed_clock_formats_rfc3339() {
        let clock = FixedClock::at(1_700_000_000);
        assert_eq!(format_rfc3339(clock.now()), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at(100);
        clock.advance(50);
        assert_eq!(clock.unix_seconds(), 150);
        clock.set(10);
        assert_eq!(clock.unix_seconds(), 10);
    }
}

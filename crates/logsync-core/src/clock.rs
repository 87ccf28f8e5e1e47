//! Wall-clock source used for id generation and handshake timing.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of milliseconds.
///
/// Logs and nodes read time only through this trait so tests can drive
/// the clock by hand.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

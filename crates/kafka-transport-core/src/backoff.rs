//! Reconnection delay computation.

use std::time::Duration;

use crate::config::TransportOptions;

/// Capped exponential backoff for reconnection attempts.
///
/// Yields `initial, initial * m, initial * m^2, …` up to `cap`. The transport
/// loop constructs a fresh policy for every connect sequence, so a successful
/// connect always resets the delay to `initial`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    multiplier: u32,
    cap: Duration,
    current: Duration,
}

impl BackoffPolicy {
    /// Create a policy starting at `initial` and capped at `cap`.
    #[must_use]
    pub fn new(initial: Duration, multiplier: u32, cap: Duration) -> Self {
        let current = initial.min(cap);
        Self {
            initial: current,
            multiplier,
            cap,
            current,
        }
    }

    /// Create a policy from transport options.
    #[must_use]
    pub fn from_options(options: &TransportOptions) -> Self {
        Self::new(
            options.initial_backoff(),
            options.backoff_multiplier,
            options.max_reconnect_backoff(),
        )
    }

    /// Return the delay to sleep before the next attempt and advance the
    /// internal state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * self.multiplier).min(self.cap);
        delay
    }

    /// Restore the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

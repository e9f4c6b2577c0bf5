//! Command throttles.
//!
//! - [`RateWindow`] – fixed-length window counting every validation attempt;
//!   the window restarts once it is older than its length.
//! - [`CommandCooldown`] – minimum gap measured from the last *accepted*
//!   command, independent of the window.
//!
//! Both compare [`Instant`]s and never block.

use std::time::{Duration, Instant};

use crate::rules::SafetyViolation;

// ────────────────────────────────────────────────────────────────────────────
// RateWindow
// ────────────────────────────────────────────────────────────────────────────

/// Counts commands inside a rolling window and rejects once `max` is passed.
///
/// ```
/// use std::time::{Duration, Instant};
/// use rover_kernel::rate_limit::RateWindow;
///
/// let mut window = RateWindow::new(Duration::from_millis(1000), 2);
/// let t0 = Instant::now();
/// assert!(window.admit(t0).is_ok());
/// assert!(window.admit(t0).is_ok());
/// assert!(window.admit(t0).is_err());
/// // More than a full window later the counter starts over.
/// assert!(window.admit(t0 + Duration::from_millis(1001)).is_ok());
/// ```
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    max: u32,
    window_start: Option<Instant>,
    count: u32,
}

impl RateWindow {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            window_start: None,
            count: 0,
        }
    }

    /// Roll the window if it has expired, count this attempt, and reject it
    /// when the count exceeds `max`.  Rejected attempts still count.
    pub fn admit(&mut self, now: Instant) -> Result<(), SafetyViolation> {
        let expired = match self.window_start {
            Some(start) => now.saturating_duration_since(start) > self.window,
            None => true,
        };
        if expired {
            self.window_start = Some(now);
            self.count = 0;
        }

        self.count += 1;
        if self.count > self.max {
            return Err(SafetyViolation::RateLimited {
                count: self.count,
                max: self.max,
                window_ms: self.window.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Attempts counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.count = 0;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CommandCooldown
// ────────────────────────────────────────────────────────────────────────────

/// Fixed minimum gap between two accepted commands.
#[derive(Debug)]
pub struct CommandCooldown {
    gap: Duration,
    last_command: Option<Instant>,
}

impl CommandCooldown {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            last_command: None,
        }
    }

    /// Mark `now` as the time of the last accepted command.
    pub fn record(&mut self, now: Instant) {
        self.last_command = Some(now);
    }

    /// `true` once the gap since the last accepted command has passed.
    pub fn can_send_at(&self, now: Instant) -> bool {
        self.remaining_at(now).is_zero()
    }

    /// Time left before another command may be sent; zero when ready.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last_command {
            Some(last) => self.gap.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.last_command = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[test]
    fn eleventh_command_in_window_is_rejected() {
        let mut window = RateWindow::new(WINDOW, 10);
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(
                window.admit(t0 + Duration::from_millis(i * 50)).is_ok(),
                "command {i} should pass"
            );
        }
        let err = window.admit(t0 + Duration::from_millis(600)).unwrap_err();
        assert_eq!(
            err,
            SafetyViolation::RateLimited {
                count: 11,
                max: 10,
                window_ms: 1000
            }
        );
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let mut window = RateWindow::new(WINDOW, 1);
        let t0 = Instant::now();
        assert!(window.admit(t0).is_ok());
        // Exactly one window later has not yet *exceeded* the window.
        assert!(window.admit(t0 + WINDOW).is_err());
        assert!(window.admit(t0 + WINDOW + Duration::from_millis(1)).is_ok());
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn reset_clears_the_counter() {
        let mut window = RateWindow::new(WINDOW, 1);
        let t0 = Instant::now();
        window.admit(t0).unwrap();
        assert!(window.admit(t0).is_err());
        window.reset();
        assert!(window.admit(t0).is_ok());
    }

    #[test]
    fn cooldown_ready_before_first_command() {
        let cooldown = CommandCooldown::new(Duration::from_millis(100));
        let now = Instant::now();
        assert!(cooldown.can_send_at(now));
        assert_eq!(cooldown.remaining_at(now), Duration::ZERO);
    }

    #[test]
    fn cooldown_counts_down_from_last_command() {
        let mut cooldown = CommandCooldown::new(Duration::from_millis(100));
        let t0 = Instant::now();
        cooldown.record(t0);
        assert!(!cooldown.can_send_at(t0 + Duration::from_millis(40)));
        assert_eq!(
            cooldown.remaining_at(t0 + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
        assert!(cooldown.can_send_at(t0 + Duration::from_millis(100)));
    }
}

// THEORY:
// Two kinds of time live in a session and they are kept strictly apart.
//
// 1.  **Game time** is whatever the host says it is. `SessionTimers` holds the
//     session countdown and the per-color countdown and only moves when `tick`
//     hands it a delta. Nothing here reads a clock.
// 2.  **Real time** only matters for the guard window, the short pause after the
//     first target appears during which taps are ignored. The window itself is a
//     token: arming it hands out a `GuardToken`, and whoever owns a real clock
//     (a tokio sleep, an `Instant` deadline) sends that token back once the delay
//     has passed. Cancelling bumps the generation, so a token from a cancelled
//     window or an earlier session can never open a newer one.

use serde::Serialize;
use std::time::Duration;

/// A countdown in seconds that may run below zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Countdown {
    remaining: f64,
    reset_value: f64,
}

impl Countdown {
    pub fn new(reset_value: f64) -> Self {
        Self {
            remaining: reset_value,
            reset_value,
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn reset_value(&self) -> f64 {
        self.reset_value
    }

    pub fn advance(&mut self, delta_secs: f64) {
        self.remaining -= delta_secs;
    }

    pub fn reset(&mut self) {
        self.remaining = self.reset_value;
    }

    pub fn expired(&self) -> bool {
        self.remaining <= 0.0
    }
}

/// Session countdown plus per-color countdown, inert until started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionTimers {
    main: Countdown,
    color: Countdown,
    running: bool,
}

impl SessionTimers {
    pub fn new(session_secs: f64, color_secs: f64) -> Self {
        Self {
            main: Countdown::new(session_secs),
            color: Countdown::new(color_secs),
            running: false,
        }
    }

    /// Restores both countdowns and starts them.
    pub fn start(&mut self) {
        self.main.reset();
        self.color.reset();
        self.running = true;
    }

    /// Stops both countdowns and restores their start values.
    pub fn stop(&mut self) {
        self.main.reset();
        self.color.reset();
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Decrements both countdowns; does nothing while stopped.
    pub fn advance(&mut self, delta_secs: f64) {
        if !self.running {
            return;
        }
        self.main.advance(delta_secs);
        self.color.advance(delta_secs);
    }

    pub fn reset_color(&mut self) {
        self.color.reset();
    }

    pub fn main(&self) -> &Countdown {
        &self.main
    }

    pub fn color(&self) -> &Countdown {
        &self.color
    }

    pub fn main_remaining(&self) -> f64 {
        self.main.remaining()
    }

    pub fn color_remaining(&self) -> f64 {
        self.color.remaining()
    }
}

/// Identifies one arming of the guard window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GuardToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardPhase {
    Inactive,
    Armed(GuardToken),
    Released,
}

/// One-shot, cancellable gate that keeps taps out right after setup.
#[derive(Debug, Clone)]
pub struct GuardWindow {
    delay: Duration,
    generation: u64,
    phase: GuardPhase,
}

impl GuardWindow {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            phase: GuardPhase::Inactive,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Closes the gate and returns the token that will reopen it.
    pub fn arm(&mut self) -> GuardToken {
        self.generation += 1;
        let token = GuardToken(self.generation);
        self.phase = GuardPhase::Armed(token);
        token
    }

    /// Opens the gate if `token` belongs to the current arming.
    pub fn release(&mut self, token: GuardToken) -> bool {
        if self.phase == GuardPhase::Armed(token) {
            self.phase = GuardPhase::Released;
            true
        } else {
            false
        }
    }

    /// Drops any pending arming; outstanding tokens become stale.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.phase = GuardPhase::Inactive;
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, GuardPhase::Armed(_))
    }

    /// Whether taps may pass.
    pub fn is_open(&self) -> bool {
        self.phase == GuardPhase::Released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_are_inert_until_started() {
        let mut timers = SessionTimers::new(180.0, 30.0);
        timers.advance(5.0);
        assert_eq!(timers.main_remaining(), 180.0);

        timers.start();
        timers.advance(5.0);
        assert_eq!(timers.main_remaining(), 175.0);
        assert_eq!(timers.color_remaining(), 25.0);

        timers.reset_color();
        assert_eq!(timers.color_remaining(), 30.0);
        assert_eq!(timers.main_remaining(), 175.0);

        timers.stop();
        assert!(!timers.is_running());
        assert_eq!(timers.main_remaining(), 180.0);
    }

    #[test]
    fn countdown_runs_negative() {
        let mut countdown = Countdown::new(1.0);
        countdown.advance(1.5);
        assert!(countdown.expired());
        assert_eq!(countdown.remaining(), -0.5);
    }

    #[test]
    fn guard_opens_only_for_current_token() {
        let mut guard = GuardWindow::new(Duration::from_secs(1));
        assert!(!guard.is_open());

        let stale = guard.arm();
        guard.cancel();
        let current = guard.arm();
        assert!(guard.is_armed());
        assert!(!guard.release(stale));
        assert!(!guard.is_open());

        assert!(guard.release(current));
        assert!(guard.is_open());
        assert!(!guard.release(current));

        guard.cancel();
        assert!(!guard.is_open());
        assert!(!guard.release(current));
    }
}

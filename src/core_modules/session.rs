// THEORY:
// `GameSession` is the only owner of a game's mutable state: the saved palette,
// the target queue, the completed set, both countdowns and the guard window.
// Every other component either feeds it (sampler, resolver, host tick) or reads
// what it publishes (snapshots, events).
//
// Key architectural principles:
// 1.  **Explicit states**: `Idle -> AwaitingCube -> ScanningColors -> Playing ->
//     Ended{Win|Loss}`, and `reset` returns to `Idle` from anywhere. Each entry
//     point checks the state first and does nothing, or returns a typed error,
//     when it does not apply.
// 2.  **Loss before win**: On a tick the session countdown is checked first. A
//     session whose clock ran out is lost even if the last color was matched in
//     the same instant.
// 3.  **One message per transition**: Instead of flags that another component
//     polls and clears, every transition is pushed once into a single-consumer
//     channel. The consumer sees each reveal, hit or ending exactly once.
// 4.  **Failures leave no trace**: A rejected submission or an ignored tap does not
//     touch any collection, so the session is always resumable.

use crate::collaborators::SessionSnapshot;
use crate::config::{ConfigError, FaceAssignment, GameConfig};
use crate::core_modules::color_sampler::{PALETTE_SIZE, SavedColorSet};
use crate::core_modules::quantized_color::QuantizedColor;
use crate::core_modules::timers::{GuardToken, GuardWindow, SessionTimers};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Win,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Idle,
    AwaitingCube,
    ScanningColors,
    Playing,
    Ended(Outcome),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("Idle"),
            SessionState::AwaitingCube => f.write_str("AwaitingCube"),
            SessionState::ScanningColors => f.write_str("ScanningColors"),
            SessionState::Playing => f.write_str("Playing"),
            SessionState::Ended(outcome) => write!(f, "Ended({outcome:?})"),
        }
    }
}

/// Everything a session announces, in the order it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A frame should be sampled for the palette.
    FrameRequested,
    PaletteSaved(Vec<QuantizedColor>),
    /// A palette color joined the target queue.
    TargetRevealed {
        slot: usize,
        color: QuantizedColor,
        forced: bool,
    },
    /// Taps are ignored until `token` comes back after `delay`.
    GuardArmed {
        token: GuardToken,
        delay: Duration,
    },
    GuardReleased,
    Hit {
        color: QuantizedColor,
        paint_index: usize,
    },
    Miss {
        color: QuantizedColor,
    },
    Ended(Outcome),
    Reset,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("expected {expected} sampled colors, got {actual}")]
    InvalidColorCount { expected: usize, actual: usize },
    #[error("sampled color {0} appears more than once")]
    DuplicateColor(QuantizedColor),
    #[error("{operation} is not allowed while {state}")]
    WrongState {
        operation: &'static str,
        state: SessionState,
    },
}

/// What a tap did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Dropped: not playing, or still inside the guard window.
    Ignored,
    Miss,
    Hit { paint_index: usize },
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// The session state machine.
#[derive(Debug)]
pub struct GameSession {
    config: GameConfig,
    state: SessionState,
    palette: Option<SavedColorSet>,
    targets: Vec<QuantizedColor>,
    completed: Vec<QuantizedColor>,
    timers: SessionTimers,
    guard: GuardWindow,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl GameSession {
    /// Creates an idle session and the receiving end of its event channel.
    ///
    /// The config is validated first, so a session never holds durations it
    /// cannot count down.
    pub fn new(config: GameConfig) -> Result<(Self, EventReceiver), ConfigError> {
        config.validate()?;
        let guard = GuardWindow::new(config.guard_window()?);
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            timers: SessionTimers::new(config.session_duration_secs, config.color_duration_secs),
            guard,
            config,
            state: SessionState::Idle,
            palette: None,
            targets: Vec::with_capacity(PALETTE_SIZE),
            completed: Vec::with_capacity(PALETTE_SIZE),
            events,
        };
        Ok((session, receiver))
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn palette(&self) -> Option<&SavedColorSet> {
        self.palette.as_ref()
    }

    pub fn targets(&self) -> &[QuantizedColor] {
        &self.targets
    }

    /// Matched colors in the order they were matched.
    pub fn completed(&self) -> &[QuantizedColor] {
        &self.completed
    }

    pub fn timers(&self) -> &SessionTimers {
        &self.timers
    }

    pub fn guard_open(&self) -> bool {
        self.guard.is_open()
    }

    /// Whether `on_tap` would currently consider a color.
    pub fn accepts_taps(&self) -> bool {
        self.state == SessionState::Playing && self.guard.is_open()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            saved: self
                .palette
                .as_ref()
                .map(|palette| palette.colors().to_vec())
                .unwrap_or_default(),
            targets: self.targets.clone(),
            completed: self.completed.clone(),
            main_timer: self.timers.main_remaining(),
            color_timer: self.timers.color_remaining(),
            guard_open: self.guard.is_open(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("session event dropped, receiver is gone");
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        info!("session {from} -> {to}");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn clear_collections(&mut self) {
        self.palette = None;
        self.targets.clear();
        self.completed.clear();
        self.timers.stop();
        self.guard.cancel();
    }

    /// `Idle -> AwaitingCube`. Returns whether the transition happened.
    pub fn on_cube_spawned(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.transition(SessionState::AwaitingCube);
        true
    }

    /// `AwaitingCube -> ScanningColors`, asking for a frame to sample.
    pub fn on_spawn_confirmed(&mut self) -> bool {
        if self.state != SessionState::AwaitingCube {
            return false;
        }
        self.transition(SessionState::ScanningColors);
        self.emit(SessionEvent::FrameRequested);
        true
    }

    /// Fixes the palette and starts play with the first target revealed.
    pub fn submit_sampled_colors(&mut self, colors: &[QuantizedColor]) -> Result<(), SessionError> {
        if colors.len() != PALETTE_SIZE {
            warn!("rejected palette of {} colors", colors.len());
            return Err(SessionError::InvalidColorCount {
                expected: PALETTE_SIZE,
                actual: colors.len(),
            });
        }
        if self.state != SessionState::ScanningColors {
            return Err(SessionError::WrongState {
                operation: "submit_sampled_colors",
                state: self.state,
            });
        }
        for (i, color) in colors.iter().enumerate() {
            if colors[..i].contains(color) {
                warn!("rejected palette with duplicate {color}");
                return Err(SessionError::DuplicateColor(*color));
            }
        }

        let palette = SavedColorSet::from_distinct(colors.to_vec());
        debug!(
            "palette saved: {}",
            palette
                .colors()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.emit(SessionEvent::PaletteSaved(palette.colors().to_vec()));
        self.palette = Some(palette);
        self.targets.clear();
        self.completed.clear();
        self.timers.start();
        self.transition(SessionState::Playing);
        self.reveal_next(false);
        Ok(())
    }

    /// Appends the next palette color to the target queue, if any remain.
    fn reveal_next(&mut self, forced: bool) -> bool {
        let Some(color) = self
            .palette
            .as_ref()
            .and_then(|palette| palette.get(self.targets.len()))
        else {
            return false;
        };
        let slot = self.targets.len();
        self.targets.push(color);
        self.timers.reset_color();
        debug!(
            "target {slot} revealed: {color}{}",
            if forced { " (timed out)" } else { "" }
        );
        self.emit(SessionEvent::TargetRevealed {
            slot,
            color,
            forced,
        });

        if self.targets.len() == 1 {
            let token = self.guard.arm();
            self.emit(SessionEvent::GuardArmed {
                token,
                delay: self.guard.delay(),
            });
        }
        true
    }

    /// Opens the tap gate if `token` is the live guard token.
    pub fn on_guard_elapsed(&mut self, token: GuardToken) -> bool {
        if self.state != SessionState::Playing || !self.guard.release(token) {
            trace!("stale guard token ignored");
            return false;
        }
        debug!("guard window elapsed, taps enabled");
        self.emit(SessionEvent::GuardReleased);
        true
    }

    /// Judges a tapped color against the target queue.
    pub fn on_tap(&mut self, color: QuantizedColor) -> TapOutcome {
        if !self.accepts_taps() {
            return TapOutcome::Ignored;
        }
        // Targets are a prefix of the palette, so a target's queue slot is also
        // its palette slot.
        let slot = match self.targets.iter().position(|target| *target == color) {
            Some(slot) if !self.completed.contains(&color) => slot,
            _ => {
                debug!("miss: {color}");
                self.emit(SessionEvent::Miss { color });
                return TapOutcome::Miss;
            }
        };

        self.completed.push(color);
        let paint_index = match self.config.face_assignment {
            FaceAssignment::CompletionOrder => self.completed.len() - 1,
            FaceAssignment::RevealSlot => slot,
        };
        debug!(
            "hit: {color} paints face {paint_index} ({}/{PALETTE_SIZE})",
            self.completed.len()
        );
        self.emit(SessionEvent::Hit { color, paint_index });

        if self.targets.len() < PALETTE_SIZE {
            self.reveal_next(false);
        }
        self.check_win();
        TapOutcome::Hit { paint_index }
    }

    /// Advances game time by `delta_secs`.
    pub fn tick(&mut self, delta_secs: f64) {
        if self.state != SessionState::Playing {
            return;
        }
        if !delta_secs.is_finite() || delta_secs < 0.0 {
            warn!("ignoring tick with delta {delta_secs}");
            return;
        }

        self.timers.advance(delta_secs);
        trace!(
            "main timer {:.2}s, color timer {:.2}s",
            self.timers.main_remaining(),
            self.timers.color_remaining()
        );

        if self.timers.main().expired() {
            self.end(Outcome::Loss);
            return;
        }
        if self.timers.color().expired() && self.targets.len() < PALETTE_SIZE {
            self.reveal_next(true);
        }
        self.check_win();
    }

    fn check_win(&mut self) {
        if self.state == SessionState::Playing && self.completed.len() == PALETTE_SIZE {
            self.end(Outcome::Win);
        }
    }

    fn end(&mut self, outcome: Outcome) {
        info!(
            "session ended: {outcome:?} with {}/{PALETTE_SIZE} colors matched",
            self.completed.len()
        );
        self.clear_collections();
        self.transition(SessionState::Ended(outcome));
        self.emit(SessionEvent::Ended(outcome));
    }

    /// Clears everything and returns to `Idle` from any state.
    pub fn reset(&mut self) {
        self.clear_collections();
        self.emit(SessionEvent::Reset);
        if self.state != SessionState::Idle {
            self.transition(SessionState::Idle);
        }
    }
}

// THEORY:
// The `pipeline` module is the top-level, single-threaded API of the engine. It
// wires one `GameSession` to its collaborators and gives the host three calls:
// `update` once per rendered frame, `tap` when the player touches the screen, and
// `reset` from the end screen.
//
// Key architectural principles:
// 1.  **Session context, not globals**: The pipeline owns the session and the
//     collaborators it was built with. Nobody looks anything up at runtime.
// 2.  **Events in, side effects out**: After every call the pipeline drains the
//     session's event channel and routes each event to exactly the collaborator
//     that cares (paint on hit, feedback on hit/miss/end, despawn on end/reset),
//     then publishes one fresh snapshot to the observer.
// 3.  **Failures are retried, not raised**: A missing camera frame or a frame with
//     too few colors is logged and tried again on the next `update`.
//
// `ParallelPipeline` reuses the same routing but moves sampling onto worker tasks.

use crate::collaborators::{Collaborators, Feedback, FrameSource, SessionSnapshot};
use crate::config::{ConfigError, GameConfig};
use crate::core_modules::color_sampler::{SampleError, SavedColorSet, sample_dominant_colors};
use crate::core_modules::quantized_color::QuantizedColor;
use crate::core_modules::session::{
    EventReceiver, GameSession, Outcome, SessionEvent, SessionState, TapOutcome,
};
use crate::core_modules::tap_resolver::{TapPoint, resolve_tap};
use crate::core_modules::timers::GuardToken;
use log::{debug, warn};
use std::time::{Duration, Instant};

/// A guard window waiting for real time to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedGuard {
    pub token: GuardToken,
    pub delay: Duration,
    pub deadline: Instant,
}

/// Synchronous driver binding a session to its collaborators.
pub struct GamePipeline {
    session: GameSession,
    events: EventReceiver,
    collaborators: Collaborators,
    armed_guard: Option<ArmedGuard>,
}

impl GamePipeline {
    pub fn new(config: GameConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let (session, events) = GameSession::new(config)?;
        Ok(Self {
            session,
            events,
            collaborators,
            armed_guard: None,
        })
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Per-frame entry point: spawn detection, palette sampling, guard expiry and
    /// timer advance, in that order.
    pub fn update(&mut self, delta_secs: f64) {
        self.poll_spawner();
        if self.session.state() == SessionState::ScanningColors {
            self.scan_frame();
        }
        self.poll_guard(Instant::now());
        self.session.tick(delta_secs);
        self.dispatch();
    }

    /// Resolves a tap against the current camera frame.
    pub fn tap(&mut self, tap: TapPoint) -> TapOutcome {
        self.poll_guard(Instant::now());
        if !self.session.accepts_taps() {
            self.dispatch();
            return TapOutcome::Ignored;
        }
        let Some(frame) = self.collaborators.frames.try_acquire_frame() else {
            warn!("no camera frame for tap, dropped");
            return TapOutcome::Ignored;
        };
        let Some(color) = resolve_tap(&frame, tap) else {
            warn!("no pixel under tap, dropped");
            return TapOutcome::Ignored;
        };
        self.apply_tap_color(color)
    }

    /// Ends whatever is going on and returns to `Idle`.
    pub fn reset(&mut self) {
        self.session.reset();
        self.dispatch();
    }

    /// Timer advance without sampling or guard polling.
    pub(crate) fn advance(&mut self, delta_secs: f64) {
        self.session.tick(delta_secs);
        self.dispatch();
    }

    pub(crate) fn poll_spawner(&mut self) {
        if !self.collaborators.spawner.is_spawned() {
            return;
        }
        self.session.on_cube_spawned();
        self.session.on_spawn_confirmed();
    }

    fn scan_frame(&mut self) {
        match self.collaborators.frames.try_acquire_frame() {
            Some(frame) => self.apply_palette(sample_dominant_colors(&frame)),
            None => warn!("frame acquisition failed, retrying on next update"),
        }
    }

    /// Feeds a sampling result into the session.
    pub(crate) fn apply_palette(&mut self, sampled: Result<SavedColorSet, SampleError>) {
        match sampled {
            Ok(palette) => {
                if let Err(err) = self.session.submit_sampled_colors(palette.colors()) {
                    warn!("sampled palette rejected: {err}");
                }
            }
            Err(err) => warn!("sampling failed, will retry: {err}"),
        }
        self.dispatch();
    }

    pub(crate) fn apply_tap_color(&mut self, color: QuantizedColor) -> TapOutcome {
        let outcome = self.session.on_tap(color);
        self.dispatch();
        outcome
    }

    pub(crate) fn guard_elapsed(&mut self, token: GuardToken) {
        if self.session.on_guard_elapsed(token) {
            self.dispatch();
        }
    }

    /// Releases the guard if its real-time deadline has passed.
    pub(crate) fn poll_guard(&mut self, now: Instant) {
        if let Some(armed) = self.armed_guard {
            if now >= armed.deadline {
                self.armed_guard = None;
                self.guard_elapsed(armed.token);
            }
        }
    }

    /// Hands an armed guard to an external scheduler instead of polling it.
    pub(crate) fn take_armed_guard(&mut self) -> Option<ArmedGuard> {
        self.armed_guard.take()
    }

    pub(crate) fn frames(&mut self) -> &mut dyn FrameSource {
        self.collaborators.frames.as_mut()
    }

    /// Routes pending session events to collaborators and publishes a snapshot.
    pub(crate) fn dispatch(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::PaletteSaved(_) => self.collaborators.painter.clear_faces(),
                SessionEvent::GuardArmed { token, delay } => {
                    self.armed_guard = Some(ArmedGuard {
                        token,
                        delay,
                        deadline: Instant::now() + delay,
                    });
                }
                SessionEvent::Hit { color, paint_index } => {
                    self.collaborators.painter.paint_face(paint_index, color);
                    self.collaborators.feedback.play(Feedback::Hit);
                }
                SessionEvent::Miss { .. } => self.collaborators.feedback.play(Feedback::Miss),
                SessionEvent::Ended(outcome) => {
                    self.armed_guard = None;
                    self.collaborators.feedback.play(match outcome {
                        Outcome::Win => Feedback::Win,
                        Outcome::Loss => Feedback::Loss,
                    });
                    self.collaborators.spawner.despawn();
                }
                SessionEvent::Reset => {
                    self.armed_guard = None;
                    self.collaborators.spawner.despawn();
                }
                SessionEvent::FrameRequested => debug!("frame requested for palette"),
                SessionEvent::StateChanged { .. }
                | SessionEvent::TargetRevealed { .. }
                | SessionEvent::GuardReleased => {}
            }
        }
        let snapshot = self.session.snapshot();
        self.collaborators.observer.on_snapshot(&snapshot);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collaborators::{FacePainter, FeedbackSink, FrameSource, SessionObserver, Spawner};
    use crate::core_modules::color_sampler::tests::{buffer_with_runs, palette_colors};
    use crate::core_modules::pixel::PixelBuffer;
    use std::sync::{Arc, Mutex};

    /// Shared record of everything the collaborators were told.
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub spawned: bool,
        pub despawns: usize,
        pub frame: Option<PixelBuffer>,
        pub frame_requests: usize,
        pub clears: usize,
        pub painted: Vec<(usize, QuantizedColor)>,
        pub feedback: Vec<Feedback>,
        pub snapshots: Vec<SessionSnapshot>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct Fakes(pub Arc<Mutex<Recorder>>);

    impl Fakes {
        pub fn with<R>(&self, f: impl FnOnce(&mut Recorder) -> R) -> R {
            f(&mut self.0.lock().unwrap())
        }

        pub fn collaborators(&self) -> Collaborators {
            Collaborators {
                spawner: Box::new(self.clone()),
                frames: Box::new(self.clone()),
                painter: Box::new(self.clone()),
                observer: Box::new(self.clone()),
                feedback: Box::new(self.clone()),
            }
        }
    }

    impl Spawner for Fakes {
        fn is_spawned(&self) -> bool {
            self.with(|r| r.spawned)
        }
        fn despawn(&mut self) {
            self.with(|r| {
                r.spawned = false;
                r.despawns += 1;
            });
        }
    }

    impl FrameSource for Fakes {
        fn try_acquire_frame(&mut self) -> Option<PixelBuffer> {
            self.with(|r| {
                r.frame_requests += 1;
                r.frame.clone()
            })
        }
    }

    impl FacePainter for Fakes {
        fn clear_faces(&mut self) {
            self.with(|r| r.clears += 1);
        }
        fn paint_face(&mut self, index: usize, color: QuantizedColor) {
            self.with(|r| r.painted.push((index, color)));
        }
    }

    impl SessionObserver for Fakes {
        fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
            self.with(|r| r.snapshots.push(snapshot.clone()));
        }
    }

    impl FeedbackSink for Fakes {
        fn play(&mut self, feedback: Feedback) {
            self.with(|r| r.feedback.push(feedback));
        }
    }

    /// A 1-row frame where palette color `i` occupies `60 - 10 * i` pixels, so
    /// the column of the first pixel of color `i` is known.
    pub(crate) fn scene() -> (PixelBuffer, Vec<(QuantizedColor, f32)>) {
        let colors = palette_colors();
        let runs: Vec<_> = colors[..6]
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, 60 - 10 * i))
            .collect();
        let buffer = buffer_with_runs(&runs);
        let width = buffer.width() as f32;
        let mut start = 0usize;
        let mut taps = Vec::new();
        for (color, count) in &runs {
            taps.push((*color, (start as f32 + 0.5) / width));
            start += count;
        }
        (buffer, taps)
    }

    pub(crate) fn instant_guard() -> GameConfig {
        GameConfig {
            guard_window_secs: 0.0,
            ..GameConfig::default()
        }
    }

    #[test]
    fn plays_a_full_session_to_a_win() {
        let fakes = Fakes::default();
        let (frame, taps) = scene();
        let mut pipeline = GamePipeline::new(instant_guard(), fakes.collaborators()).unwrap();

        pipeline.update(0.016);
        assert_eq!(pipeline.state(), SessionState::Idle);

        fakes.with(|r| {
            r.spawned = true;
            r.frame = Some(frame);
        });
        pipeline.update(0.016);
        assert_eq!(pipeline.state(), SessionState::Playing);
        assert!(pipeline.session().accepts_taps());
        assert_eq!(fakes.with(|r| r.clears), 1);

        for (color, x) in &taps {
            let outcome = pipeline.tap(TapPoint::new(*x, 0.5));
            assert!(matches!(outcome, TapOutcome::Hit { .. }), "{color} missed");
        }

        assert_eq!(pipeline.state(), SessionState::Ended(Outcome::Win));
        fakes.with(|r| {
            let painted: Vec<_> = r.painted.iter().map(|(i, _)| *i).collect();
            assert_eq!(painted, vec![0, 1, 2, 3, 4, 5]);
            assert_eq!(r.feedback.last(), Some(&Feedback::Win));
            assert_eq!(r.feedback.iter().filter(|f| **f == Feedback::Hit).count(), 6);
            assert!(!r.spawned);
            assert_eq!(r.despawns, 1);
            assert_eq!(
                r.snapshots.last().map(|s| s.state),
                Some(SessionState::Ended(Outcome::Win))
            );
        });

        pipeline.reset();
        assert_eq!(pipeline.state(), SessionState::Idle);
    }

    #[test]
    fn missing_frames_are_retried() {
        let fakes = Fakes::default();
        let mut pipeline = GamePipeline::new(instant_guard(), fakes.collaborators()).unwrap();
        fakes.with(|r| r.spawned = true);

        pipeline.update(0.1);
        pipeline.update(0.1);
        assert_eq!(pipeline.state(), SessionState::ScanningColors);
        assert_eq!(fakes.with(|r| r.frame_requests), 2);

        let [a, b, ..] = palette_colors();
        fakes.with(|r| r.frame = Some(buffer_with_runs(&[(a, 5), (b, 5)])));
        pipeline.update(0.1);
        assert_eq!(pipeline.state(), SessionState::ScanningColors);

        fakes.with(|r| r.frame = Some(scene().0));
        pipeline.update(0.1);
        assert_eq!(pipeline.state(), SessionState::Playing);
    }

    #[test]
    fn taps_without_a_frame_are_dropped_silently() {
        let fakes = Fakes::default();
        let (frame, taps) = scene();
        let mut pipeline = GamePipeline::new(instant_guard(), fakes.collaborators()).unwrap();
        fakes.with(|r| {
            r.spawned = true;
            r.frame = Some(frame);
        });
        pipeline.update(0.0);
        fakes.with(|r| r.frame = None);

        assert_eq!(pipeline.tap(TapPoint::new(taps[0].1, 0.0)), TapOutcome::Ignored);
        assert!(fakes.with(|r| r.feedback.is_empty()));
        assert!(pipeline.snapshot().completed.is_empty());
    }

    #[test]
    fn guard_window_blocks_early_taps() {
        let fakes = Fakes::default();
        let (frame, taps) = scene();
        let mut pipeline = GamePipeline::new(GameConfig::default(), fakes.collaborators()).unwrap();
        fakes.with(|r| {
            r.spawned = true;
            r.frame = Some(frame);
        });
        pipeline.update(0.0);
        assert_eq!(pipeline.state(), SessionState::Playing);
        assert_eq!(pipeline.tap(TapPoint::new(taps[0].1, 0.0)), TapOutcome::Ignored);

        let armed = pipeline.take_armed_guard().expect("guard armed");
        assert_eq!(armed.delay, Duration::from_secs(1));
        pipeline.guard_elapsed(armed.token);
        assert!(matches!(
            pipeline.tap(TapPoint::new(taps[0].1, 0.0)),
            TapOutcome::Hit { paint_index: 0 }
        ));
    }

    #[test]
    fn timeout_loss_despawns_and_reports() {
        let fakes = Fakes::default();
        let (frame, _) = scene();
        let mut pipeline = GamePipeline::new(instant_guard(), fakes.collaborators()).unwrap();
        fakes.with(|r| {
            r.spawned = true;
            r.frame = Some(frame);
        });
        pipeline.update(0.0);
        pipeline.update(200.0);
        assert_eq!(pipeline.state(), SessionState::Ended(Outcome::Loss));
        fakes.with(|r| {
            assert_eq!(r.feedback, vec![Feedback::Loss]);
            assert_eq!(r.despawns, 1);
        });
    }

    #[test]
    fn unusable_config_is_refused_at_wiring() {
        let config = GameConfig {
            guard_window_secs: f64::INFINITY,
            ..GameConfig::default()
        };
        assert!(matches!(
            GamePipeline::new(config, Fakes::default().collaborators()),
            Err(ConfigError::InvalidGuard(_))
        ));
    }
}

// THEORY:
// `ParallelPipeline` is the asynchronous driver. Sampling a full camera frame is
// the only expensive operation in the engine, so it runs on blocking worker tasks
// split by row spans, while the session itself stays on one logical thread.
//
// Key architectural principles:
// 1.  **One delivery queue**: Host calls (tick, tap, reset) and worker results
//     (palette sampled, tap resolved, guard elapsed) all arrive as `Command`s on a
//     single mpsc channel. The actor applies them one at a time, so no two
//     mutations ever interleave.
// 2.  **Freshest frame wins**: At most one sampling job and one tap resolution are
//     in flight. A request made while one is pending is dropped, not queued.
// 3.  **Epochs and tokens**: Every reset starts a new epoch. Worker results carry
//     the epoch they were started in and are discarded if it is stale. The guard
//     timer is a cancellable task whose token the session validates again, so a
//     late wake-up can never open a newer session's guard.

use crate::collaborators::{Collaborators, SessionSnapshot};
use crate::config::{ConfigError, GameConfig};
use crate::core_modules::color_sampler::{
    ColorFrequencyMap, SampleError, SavedColorSet, shard_rows,
};
use crate::core_modules::pixel::PixelBuffer;
use crate::core_modules::quantized_color::QuantizedColor;
use crate::core_modules::session::SessionState;
use crate::core_modules::tap_resolver::{TapPoint, resolve_tap};
use crate::core_modules::timers::GuardToken;
use crate::pipeline::GamePipeline;
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline actor has shut down")]
    Closed,
}

/// Messages applied, in arrival order, by the pipeline actor.
pub enum Command {
    Tick(f64),
    Tap(TapPoint),
    Reset,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    SampleReady {
        epoch: u64,
        result: Result<SavedColorSet, SampleError>,
    },
    TapResolved {
        epoch: u64,
        color: Option<QuantizedColor>,
    },
    GuardElapsed(GuardToken),
    Shutdown,
}

/// Cloneable front end of a running `ParallelPipeline`.
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl PipelineHandle {
    fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.commands.send(command).map_err(|_| PipelineError::Closed)
    }

    pub fn tick(&self, delta_secs: f64) -> Result<(), PipelineError> {
        self.send(Command::Tick(delta_secs))
    }

    pub fn tap(&self, tap: TapPoint) -> Result<(), PipelineError> {
        self.send(Command::Tap(tap))
    }

    pub fn reset(&self) -> Result<(), PipelineError> {
        self.send(Command::Reset)
    }

    pub fn shutdown(&self) -> Result<(), PipelineError> {
        self.send(Command::Shutdown)
    }

    /// Current session snapshot, taken between two commands.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, PipelineError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        response.await.map_err(|_| PipelineError::Closed)
    }
}

/// Histograms row spans on blocking workers and merges them in span order.
pub async fn sample_frame_sharded(
    frame: Arc<PixelBuffer>,
    shards: usize,
) -> Result<SavedColorSet, SampleError> {
    let spans = shard_rows(frame.height(), shards);
    let tasks = spans.iter().map(|&(start, end)| {
        let frame = Arc::clone(&frame);
        tokio::task::spawn_blocking(move || ColorFrequencyMap::from_rows(&frame, start, end))
    });
    let results = futures::future::join_all(tasks).await;

    let mut merged = ColorFrequencyMap::new();
    for ((start, end), result) in spans.into_iter().zip(results) {
        match result {
            Ok(map) => merged.merge(map),
            Err(err) => {
                warn!("sampling worker for rows {start}..{end} failed ({err}), rescanning inline");
                merged.merge(ColorFrequencyMap::from_rows(&frame, start, end));
            }
        }
    }
    debug!("sampled {} distinct colors", merged.len());
    merged.into_palette()
}

/// Actor owning a `GamePipeline` and every in-flight worker.
pub struct ParallelPipeline {
    pipeline: GamePipeline,
    commands: mpsc::UnboundedReceiver<Command>,
    workers: mpsc::WeakUnboundedSender<Command>,
    shards: usize,
    epoch: u64,
    sample_in_flight: bool,
    tap_in_flight: bool,
    guard_timer: Option<JoinHandle<()>>,
}

impl ParallelPipeline {
    /// Starts the actor on the current tokio runtime.
    pub fn spawn(
        config: GameConfig,
        collaborators: Collaborators,
    ) -> Result<(PipelineHandle, JoinHandle<()>), ConfigError> {
        let (actor, handle) = Self::new(config, collaborators)?;
        let task = tokio::spawn(actor.run());
        Ok((handle, task))
    }

    fn new(
        config: GameConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, PipelineHandle), ConfigError> {
        let (sender, commands) = mpsc::unbounded_channel();
        let actor = Self {
            shards: config.shard_count(),
            pipeline: GamePipeline::new(config, collaborators)?,
            commands,
            workers: sender.downgrade(),
            epoch: 0,
            sample_in_flight: false,
            tap_in_flight: false,
            guard_timer: None,
        };
        Ok((actor, PipelineHandle { commands: sender }))
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            if !self.apply(command) {
                break;
            }
            self.schedule_guard();
        }
        self.cancel_guard();
        info!("pipeline actor stopped");
    }

    /// Applies one command; `false` stops the actor.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Tick(delta_secs) => {
                self.pipeline.poll_spawner();
                if self.pipeline.state() == SessionState::ScanningColors {
                    self.request_sample();
                }
                self.pipeline.advance(delta_secs);
            }
            Command::Tap(tap) => self.request_tap(tap),
            Command::Reset => {
                self.epoch += 1;
                self.sample_in_flight = false;
                self.tap_in_flight = false;
                self.cancel_guard();
                self.pipeline.reset();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.pipeline.snapshot());
            }
            Command::SampleReady { epoch, result } => {
                if epoch != self.epoch {
                    debug!("discarding palette sampled before reset");
                    return true;
                }
                self.sample_in_flight = false;
                if self.pipeline.state() == SessionState::ScanningColors {
                    self.pipeline.apply_palette(result);
                }
            }
            Command::TapResolved { epoch, color } => {
                if epoch != self.epoch {
                    debug!("discarding tap resolved before reset");
                    return true;
                }
                self.tap_in_flight = false;
                match color {
                    Some(color) => {
                        self.pipeline.apply_tap_color(color);
                    }
                    None => warn!("no pixel under tap, dropped"),
                }
            }
            Command::GuardElapsed(token) => {
                self.guard_timer = None;
                self.pipeline.guard_elapsed(token);
            }
            Command::Shutdown => return false,
        }
        if !matches!(self.pipeline.state(), SessionState::Playing) {
            self.cancel_guard();
        }
        true
    }

    fn request_sample(&mut self) {
        if self.sample_in_flight {
            debug!("sampling already in flight, request dropped");
            return;
        }
        let Some(frame) = self.pipeline.frames().try_acquire_frame() else {
            warn!("frame acquisition failed, retrying on next tick");
            return;
        };
        let Some(results) = self.workers.upgrade() else {
            return;
        };
        self.sample_in_flight = true;
        let epoch = self.epoch;
        let shards = self.shards;
        tokio::spawn(async move {
            let result = sample_frame_sharded(Arc::new(frame), shards).await;
            let _ = results.send(Command::SampleReady { epoch, result });
        });
    }

    fn request_tap(&mut self, tap: TapPoint) {
        if !self.pipeline.session().accepts_taps() {
            return;
        }
        if self.tap_in_flight {
            debug!("tap resolution already in flight, tap dropped");
            return;
        }
        let Some(frame) = self.pipeline.frames().try_acquire_frame() else {
            warn!("no camera frame for tap, dropped");
            return;
        };
        let Some(results) = self.workers.upgrade() else {
            return;
        };
        self.tap_in_flight = true;
        let epoch = self.epoch;
        tokio::task::spawn_blocking(move || {
            let color = resolve_tap(&frame, tap);
            let _ = results.send(Command::TapResolved { epoch, color });
        });
    }

    /// Turns a freshly armed guard into a cancellable sleep.
    fn schedule_guard(&mut self) {
        let Some(armed) = self.pipeline.take_armed_guard() else {
            return;
        };
        self.cancel_guard();
        let Some(results) = self.workers.upgrade() else {
            return;
        };
        self.guard_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(armed.delay).await;
            let _ = results.send(Command::GuardElapsed(armed.token));
        }));
    }

    fn cancel_guard(&mut self) {
        if let Some(timer) = self.guard_timer.take() {
            timer.abort();
        }
    }
}

// THEORY:
// This file is the main entry point for the `chroma_match` library crate: the
// session engine of a timed color-matching game. A camera frame is reduced to its
// six most common quantized colors, and the player must tap those colors on the
// live feed, one revealed target at a time, before the clocks run out.
//
// The public surface is deliberately small. `GamePipeline` (synchronous) and
// `ParallelPipeline` (tokio actor) are the two ways to drive a session; both are
// wired with the collaborator traits in `collaborators` and configured with a
// `GameConfig`. The building blocks in `core_modules` are public for hosts that
// want to sample or resolve colors on their own, but only `GameSession` ever
// mutates game state.

pub mod collaborators;
pub mod config;
pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;

pub use collaborators::{
    Collaborators, FacePainter, Feedback, FeedbackSink, FrameSource, SessionObserver,
    SessionSnapshot, Spawner, Swatch,
};
pub use config::{ConfigError, FaceAssignment, GameConfig};
pub use core_modules::color_sampler::{
    ColorFrequencyMap, PALETTE_SIZE, SampleError, SavedColorSet, sample_dominant_colors,
};
pub use core_modules::pixel::{BufferError, Pixel, PixelBuffer};
pub use core_modules::quantized_color::{QuantizedColor, quantize};
pub use core_modules::session::{
    GameSession, Outcome, SessionError, SessionEvent, SessionState, TapOutcome,
};
pub use core_modules::tap_resolver::{TapPoint, resolve_tap};
pub use parallel_pipeline::{ParallelPipeline, PipelineError, PipelineHandle};
pub use pipeline::GamePipeline;

// THEORY:
// The session engine never talks to a camera, a mesh, a speaker or a widget
// directly. Each of those is a collaborator behind a small trait, captured once
// when the pipeline is wired and never looked up again. Collaborators only ever
// receive copies (`SessionSnapshot`) or single notifications; none of them can
// reach back into the session and change it.

use crate::core_modules::pixel::PixelBuffer;
use crate::core_modules::color_sampler::PALETTE_SIZE;
use crate::core_modules::quantized_color::QuantizedColor;
use crate::core_modules::session::SessionState;
use serde::Serialize;

/// Owner of the spawned object the game paints.
pub trait Spawner: Send {
    /// Whether the object has been placed in the scene.
    fn is_spawned(&self) -> bool;
    /// Removes the object; called when a session ends or resets.
    fn despawn(&mut self);
}

/// Camera access. `None` means no frame right now; the caller retries later.
pub trait FrameSource: Send {
    fn try_acquire_frame(&mut self) -> Option<PixelBuffer>;
}

/// Paints faces of the spawned object.
pub trait FacePainter: Send {
    /// Returns every face to its blank color.
    fn clear_faces(&mut self);
    /// Called exactly once per hit.
    fn paint_face(&mut self, index: usize, color: QuantizedColor);
}

/// Read-only consumer of session state, typically the HUD.
pub trait SessionObserver: Send {
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Feedback {
    Hit,
    Miss,
    Win,
    Loss,
}

/// Audio and haptics.
pub trait FeedbackSink: Send {
    fn play(&mut self, feedback: Feedback);
}

/// Every collaborator a pipeline is wired with.
pub struct Collaborators {
    pub spawner: Box<dyn Spawner>,
    pub frames: Box<dyn FrameSource>,
    pub painter: Box<dyn FacePainter>,
    pub observer: Box<dyn SessionObserver>,
    pub feedback: Box<dyn FeedbackSink>,
}

/// How one palette slot should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Swatch {
    /// Not revealed yet.
    Hidden,
    Revealed(QuantizedColor),
    /// Revealed and matched; drawn dimmed.
    Completed(QuantizedColor),
}

/// Copy of everything the UI is allowed to know.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub saved: Vec<QuantizedColor>,
    pub targets: Vec<QuantizedColor>,
    pub completed: Vec<QuantizedColor>,
    pub main_timer: f64,
    pub color_timer: f64,
    pub guard_open: bool,
}

impl SessionSnapshot {
    /// One entry per palette slot, in reveal order.
    pub fn swatches(&self) -> [Swatch; PALETTE_SIZE] {
        let mut swatches = [Swatch::Hidden; PALETTE_SIZE];
        for (slot, color) in self.targets.iter().enumerate().take(PALETTE_SIZE) {
            swatches[slot] = if self.completed.contains(color) {
                Swatch::Completed(*color)
            } else {
                Swatch::Revealed(*color)
            };
        }
        swatches
    }

    pub fn main_seconds(&self) -> i64 {
        display_seconds(self.main_timer)
    }

    pub fn color_seconds(&self) -> i64 {
        display_seconds(self.color_timer)
    }
}

/// Whole seconds for a countdown label, truncated toward zero.
pub fn display_seconds(secs: f64) -> i64 {
    if secs.is_finite() { secs.trunc() as i64 } else { 0 }
}

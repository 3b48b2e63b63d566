// THEORY:
// Resolving a tap is the one-pixel twin of sampling a frame: take a normalized
// screen coordinate, find the pixel under it, quantize. The resolver never
// decides whether the tap was a good one; it only answers "what color is there".

use crate::core_modules::pixel::PixelBuffer;
use crate::core_modules::quantized_color::QuantizedColor;
use serde::{Deserialize, Serialize};

/// A tap in normalized screen space, `x` and `y` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapPoint {
    pub x: f32,
    pub y: f32,
}

impl TapPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Normalizes a raw screen position against the screen size.
    pub fn from_screen(px: f32, py: f32, screen_width: f32, screen_height: f32) -> Self {
        let normalize = |value: f32, extent: f32| {
            if extent > 0.0 { value / extent } else { 0.0 }
        };
        Self {
            x: normalize(px, screen_width),
            y: normalize(py, screen_height),
        }
    }

    /// Flips the vertical axis, for frames delivered mirrored top to bottom.
    pub fn mirrored_y(self) -> Self {
        Self {
            x: self.x,
            y: 1.0 - self.y,
        }
    }

    /// Pixel coordinates of this tap inside a `width` x `height` frame.
    pub fn to_pixel_coords(self, width: u32, height: u32) -> (u32, u32) {
        (axis_index(self.x, width), axis_index(self.y, height))
    }
}

/// `clamp(floor(norm * dim), 0, dim - 1)`; NaN lands on 0.
fn axis_index(norm: f32, dim: u32) -> u32 {
    let max_index = dim.saturating_sub(1);
    let scaled = (norm * dim as f32).floor();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else if scaled >= max_index as f32 {
        max_index
    } else {
        scaled as u32
    }
}

/// Quantized color of the pixel under `tap`, or `None` when the frame has no
/// pixel there.
pub fn resolve_tap(buffer: &PixelBuffer, tap: TapPoint) -> Option<QuantizedColor> {
    let (x, y) = tap.to_pixel_coords(buffer.width(), buffer.height());
    buffer.pixel_at(x, y).map(QuantizedColor::from)
}

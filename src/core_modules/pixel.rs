// THEORY:
// The `pixel` module holds the two "dumb" data containers every other module
// reads from: a single RGBA `Pixel` and a full-frame `PixelBuffer`. Neither
// knows anything about colors being "dominant" or "tapped"; they only know how
// to store bytes and hand out pixels by coordinate.
//
// Key architectural principles:
// 1.  **Validated at the boundary**: A `PixelBuffer` can only be built from a byte
//     vector whose length matches `width * height * 4`. Everything downstream may
//     therefore index without bounds anxiety.
// 2.  **Row-major, top row first**: Pixel (x, y) lives at byte offset
//     `(y * width + x) * 4`. Any mirroring the camera applies is the frame
//     source's business, not ours.
// 3.  **Cheap sharing**: Frames are immutable once built, so the sampler can hand
//     an `Arc<PixelBuffer>` to several workers without copying.

use thiserror::Error;

pub type Byte = u8;
pub type Bytes = Vec<Byte>;
pub type Channel = Byte;

/// Bytes per pixel in every buffer this crate accepts (RGBA8).
pub const CHANNELS: usize = 4;

/// Reasons a byte vector cannot become a `PixelBuffer`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("pixel buffer dimensions must be non-zero (got {width}x{height})")]
    ZeroDimension { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// A "dumb" data container representing a single RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
    /// The alpha (transparency) channel value (0-255).
    pub alpha: Channel,
}

impl Pixel {
    pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
        Pixel {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Opaque pixel from an RGB triple.
    pub const fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
        Pixel::new(red, green, blue, Channel::MAX)
    }
}

impl From<[Byte; CHANNELS]> for Pixel {
    fn from(bytes: [Byte; CHANNELS]) -> Self {
        Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl From<Pixel> for Bytes {
    fn from(pixel: Pixel) -> Self {
        vec![pixel.red, pixel.green, pixel.blue, pixel.alpha]
    }
}

/// An immutable, validated RGBA8 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Bytes,
}

impl PixelBuffer {
    /// Wraps raw RGBA bytes, rejecting empty frames and length mismatches.
    pub fn new(width: u32, height: u32, data: Bytes) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroDimension { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(BufferError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a buffer by evaluating `fill` for every coordinate, row by row.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut fill: impl FnMut(u32, u32) -> Pixel,
    ) -> Result<Self, BufferError> {
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                let pixel = fill(x, y);
                data.extend_from_slice(&[pixel.red, pixel.green, pixel.blue, pixel.alpha]);
            }
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len_pixels(&self) -> usize {
        self.data.len() / CHANNELS
    }

    pub fn as_bytes(&self) -> &[Byte] {
        &self.data
    }

    /// The pixel at column `x`, row `y`, or `None` outside the frame.
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some(Pixel::new(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ))
    }

    /// Iterates pixels in scan order (left to right, top to bottom).
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|bytes| Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }

    /// Pixels of rows `[start_row, end_row)` in scan order, paired with their
    /// global scan index.
    pub fn row_span(
        &self,
        start_row: u32,
        end_row: u32,
    ) -> impl Iterator<Item = (usize, Pixel)> + '_ {
        let end_row = end_row.min(self.height);
        let start_row = start_row.min(end_row);
        let row_bytes = self.width as usize * CHANNELS;
        let first_index = start_row as usize * self.width as usize;
        self.data[start_row as usize * row_bytes..end_row as usize * row_bytes]
            .chunks_exact(CHANNELS)
            .enumerate()
            .map(move |(i, bytes)| {
                (
                    first_index + i,
                    Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3]),
                )
            })
    }
}

impl TryFrom<image::RgbaImage> for PixelBuffer {
    type Error = BufferError;

    fn try_from(image: image::RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

// THEORY:
// The quantizer is what makes a camera-based matching game playable at all. Two
// photographs of the same wall never agree to the exact byte, so instead of
// comparing raw pixels we compare coarse buckets: every channel is floored to a
// multiple of `BUCKET_WIDTH` and alpha is forced opaque.
//
// Both the frame sampler and the tap resolver go through `quantize`, which is the
// only reason a tapped pixel can ever equal a sampled dominant color.

use crate::core_modules::pixel::{Channel, Pixel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of one quantization bucket per channel.
pub const BUCKET_WIDTH: Channel = 32;

/// Alpha of every quantized color.
pub const OPAQUE: Channel = Channel::MAX;

/// An RGB color floored to 32-unit buckets. Equality and hashing are by bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct QuantizedColor {
    red: Channel,
    green: Channel,
    blue: Channel,
}

#[inline]
fn bucket(channel: Channel) -> Channel {
    channel / BUCKET_WIDTH * BUCKET_WIDTH
}

/// Reduces an 8-bit RGB triple to its bucket.
#[inline]
pub fn quantize(red: Channel, green: Channel, blue: Channel) -> QuantizedColor {
    QuantizedColor {
        red: bucket(red),
        green: bucket(green),
        blue: bucket(blue),
    }
}

impl QuantizedColor {
    /// Same as [`quantize`]; any triple is accepted and floored.
    pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        quantize(red, green, blue)
    }

    pub fn red(&self) -> Channel {
        self.red
    }

    pub fn green(&self) -> Channel {
        self.green
    }

    pub fn blue(&self) -> Channel {
        self.blue
    }

    pub fn alpha(&self) -> Channel {
        OPAQUE
    }

    /// Bucket index per channel, 0..=7.
    pub fn bucket_indices(&self) -> (u8, u8, u8) {
        (
            self.red / BUCKET_WIDTH,
            self.green / BUCKET_WIDTH,
            self.blue / BUCKET_WIDTH,
        )
    }

    /// The opaque pixel this color paints with.
    pub fn to_pixel(self) -> Pixel {
        Pixel::new(self.red, self.green, self.blue, OPAQUE)
    }
}

impl From<Pixel> for QuantizedColor {
    fn from(pixel: Pixel) -> Self {
        quantize(pixel.red, pixel.green, pixel.blue)
    }
}

impl From<[u8; 3]> for QuantizedColor {
    fn from(rgb: [u8; 3]) -> Self {
        quantize(rgb[0], rgb[1], rgb[2])
    }
}

impl From<QuantizedColor> for [u8; 3] {
    fn from(color: QuantizedColor) -> Self {
        [color.red, color.green, color.blue]
    }
}

impl fmt::Display for QuantizedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn floors_each_channel_to_bucket() {
        let color = quantize(31, 32, 255);
        assert_eq!((color.red(), color.green(), color.blue()), (0, 32, 224));
        assert_eq!(color.alpha(), 255);
        assert_eq!(quantize(100, 101, 127), quantize(96, 96, 96));
    }

    #[test]
    fn pixel_alpha_is_ignored() {
        let translucent = QuantizedColor::from(Pixel::new(200, 10, 70, 3));
        let opaque = QuantizedColor::from(Pixel::rgb(200, 10, 70));
        assert_eq!(translucent, opaque);
        assert_eq!(translucent.to_pixel().alpha, 255);
    }

    #[test]
    fn displays_as_hex() {
        assert_eq!(quantize(255, 0, 70).to_string(), "#E00040");
    }

    #[test]
    fn serde_keeps_buckets() {
        let json = serde_json::to_string(&quantize(70, 140, 250)).unwrap();
        assert_eq!(json, "[64,128,224]");
        let parsed: QuantizedColor = serde_json::from_str("[65,129,255]").unwrap();
        assert_eq!(parsed, quantize(64, 128, 224));
    }

    proptest! {
        #[test]
        fn quantize_is_idempotent(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let once = quantize(r, g, b);
            let twice = quantize(once.red(), once.green(), once.blue());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn bucket_index_is_monotonic(a in any::<u8>(), b in any::<u8>()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let low_bucket = quantize(low, low, low).bucket_indices();
            let high_bucket = quantize(high, high, high).bucket_indices();
            prop_assert!(low_bucket.0 <= high_bucket.0);
            prop_assert!(low_bucket.1 <= high_bucket.1);
            prop_assert!(low_bucket.2 <= high_bucket.2);
        }
    }
}

use crate::core_modules::pixel::{BufferError, PixelBuffer};
use image::ImageEncoder;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageHelperError {
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Decodes any format the `image` crate knows into an RGBA frame.
pub fn load_rgba(path: impl AsRef<Path>) -> Result<PixelBuffer, ImageHelperError> {
    Ok(PixelBuffer::try_from(image::open(path)?.to_rgba8())?)
}

/// Decodes an in-memory encoded image into an RGBA frame.
pub fn decode_rgba(bytes: &[u8]) -> Result<PixelBuffer, ImageHelperError> {
    Ok(PixelBuffer::try_from(image::load_from_memory(bytes)?.to_rgba8())?)
}

/// PNG-encodes a frame into any writer.
pub fn encode_png(writer: impl Write, buffer: &PixelBuffer) -> Result<(), ImageHelperError> {
    let encoder = image::codecs::png::PngEncoder::new(writer);
    encoder.write_image(
        buffer.as_bytes(),
        buffer.width(),
        buffer.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(())
}

pub fn save_png(path: impl AsRef<Path>, buffer: &PixelBuffer) -> Result<(), ImageHelperError> {
    let output = std::io::BufWriter::new(std::fs::File::create(path)?);
    encode_png(output, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color_sampler::sample_dominant_colors;
    use crate::core_modules::pixel::Pixel;

    #[test]
    fn png_round_trip_keeps_the_palette() {
        let stripes = PixelBuffer::from_fn(60, 20, |x, _| match x / 10 {
            0 => Pixel::rgb(250, 10, 10),
            1 => Pixel::rgb(10, 250, 10),
            2 => Pixel::rgb(10, 10, 250),
            3 => Pixel::rgb(250, 250, 10),
            4 => Pixel::rgb(10, 250, 250),
            _ => Pixel::rgb(250, 10, 250),
        })
        .unwrap();

        let mut encoded = Vec::new();
        encode_png(&mut encoded, &stripes).unwrap();
        let decoded = decode_rgba(&encoded).unwrap();

        assert_eq!(decoded, stripes);
        assert_eq!(
            sample_dominant_colors(&decoded).unwrap(),
            sample_dominant_colors(&stripes).unwrap()
        );
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        assert!(matches!(
            decode_rgba(b"definitely not a png"),
            Err(ImageHelperError::Image(_))
        ));
    }
}

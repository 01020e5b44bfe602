//! Decoded frames and their still-image encodings.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};

use crate::error::SampleError;

/// A frame produced by a decode session.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Zero-based index of the frame in the source stream.
    pub source_index: u64,
    /// Presentation time in seconds from the start of the stream.
    pub timestamp: f64,
    /// Pixels, RGB8, after filtering and resizing.
    pub image: DynamicImage,
    /// Whether the frame was a keyframe in the source.
    pub is_keyframe: bool,
}

impl DecodedFrame {
    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the image as a still picture.
    pub fn encode(&self, format: FrameImageFormat) -> Result<Vec<u8>, SampleError> {
        format.encode(&self.image)
    }

    /// Encode the image and wrap it as base64 text.
    pub fn to_base64(&self, format: FrameImageFormat) -> Result<String, SampleError> {
        Ok(STANDARD.encode(self.encode(format)?))
    }

    /// Drop the metadata and keep the pixels.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Still-image encoding for frame export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameImageFormat {
    /// JPEG with the given quality (1-100).
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
    /// Lossless PNG.
    Png,
}

impl Default for FrameImageFormat {
    fn default() -> Self {
        FrameImageFormat::Jpeg { quality: 85 }
    }
}

impl FrameImageFormat {
    /// MIME type of the encoded bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            FrameImageFormat::Jpeg { .. } => "image/jpeg",
            FrameImageFormat::Png => "image/png",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FrameImageFormat::Jpeg { .. } => "jpg",
            FrameImageFormat::Png => "png",
        }
    }

    /// Encode an image in this format.
    pub fn encode(self, image: &DynamicImage) -> Result<Vec<u8>, SampleError> {
        let mut bytes = Vec::new();
        match self {
            FrameImageFormat::Jpeg { quality } => {
                let rgb = image.to_rgb8();
                let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)?;
            }
            FrameImageFormat::Png => {
                image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
            }
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    fn frame() -> DecodedFrame {
        DecodedFrame {
            source_index: 3,
            timestamp: 0.1,
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]))),
            is_keyframe: false,
        }
    }

    #[test]
    fn encodes_jpeg_and_png_with_magic_bytes() {
        let frame = frame();
        let jpeg = frame.encode(FrameImageFormat::default()).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let png = frame.encode(FrameImageFormat::Png).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn base64_is_decodable() {
        let text = frame().to_base64(FrameImageFormat::Png).unwrap();
        let bytes = STANDARD.decode(text).unwrap();
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (8, 4));
    }
}

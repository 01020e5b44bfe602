//! Frame and timestamp conversion helpers.
//!
//! [`FrameConverter`] turns decoder output of any pixel format into an RGB8
//! [`DynamicImage`]; the free functions convert between stream time bases,
//! seconds, and frame indices.

use ffmpeg_next::{
    Rational,
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::error::SampleError;

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer,
/// dropping any row padding.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}

/// Rescale a PTS value from a stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Convert a position in seconds to a container seek timestamp.
///
/// `Input::seek` targets `stream_index = -1`, which expects AV_TIME_BASE
/// (microseconds).
pub(crate) fn seconds_to_seek_timestamp(seconds: f64) -> i64 {
    (seconds.max(0.0) * 1_000_000.0) as i64
}

/// Frame index of a presentation time, relative to the stream start.
///
/// Rounds to the nearest frame so small timestamp jitter does not shift a
/// frame onto its neighbour.
pub(crate) fn seconds_to_frame_index(seconds: f64, start_seconds: f64, fps: f64) -> u64 {
    let offset = ((seconds - start_seconds) * fps).round();
    if offset.is_finite() && offset > 0.0 {
        offset as u64
    } else {
        0
    }
}

/// Presentation time of a frame index, assuming a constant frame rate.
pub(crate) fn frame_index_to_seconds(index: u64, fps: f64) -> f64 {
    if fps > 0.0 { index as f64 / fps } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerKey {
    format: Pixel,
    width: u32,
    height: u32,
}

/// Converts decoded frames to RGB8 images.
///
/// The scaling context is created on first use and rebuilt whenever the
/// input format or size changes, which happens after a hardware transfer or
/// a resolution switch mid-stream.
pub(crate) struct FrameConverter {
    scaler: Option<(ScalingContext, ScalerKey)>,
    rgb_frame: VideoFrame,
}

impl FrameConverter {
    pub(crate) fn new() -> Self {
        Self {
            scaler: None,
            rgb_frame: VideoFrame::empty(),
        }
    }

    /// Convert one frame, keeping its dimensions.
    pub(crate) fn to_image(&mut self, frame: &VideoFrame) -> Result<DynamicImage, SampleError> {
        let key = ScalerKey {
            format: frame.format(),
            width: frame.width(),
            height: frame.height(),
        };
        if key.width == 0 || key.height == 0 {
            return Err(SampleError::FfmpegError(
                "decoder produced an empty frame".to_string(),
            ));
        }

        if self.scaler.as_ref().is_none_or(|(_, built)| *built != key) {
            let scaler = ScalingContext::get(
                key.format,
                key.width,
                key.height,
                Pixel::RGB24,
                key.width,
                key.height,
                ScalingFlags::BILINEAR,
            )?;
            self.scaler = Some((scaler, key));
        }

        let Some((scaler, _)) = self.scaler.as_mut() else {
            return Err(SampleError::FfmpegError(
                "scaling context unavailable".to_string(),
            ));
        };
        scaler.run(frame, &mut self.rgb_frame)?;

        let buffer = frame_to_buffer(&self.rgb_frame, key.width, key.height, 3);
        let image = RgbImage::from_raw(key.width, key.height, buffer).ok_or_else(|| {
            SampleError::FfmpegError(
                "failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_to_nearest_frame() {
        let time_base = Rational::new(1, 15_360);
        let seconds = pts_to_seconds(15_360, time_base);
        assert!((seconds - 1.0).abs() < 1e-9);
        assert_eq!(seconds_to_frame_index(1.0, 0.0, 30.0), 30);
        assert_eq!(seconds_to_frame_index(0.999, 0.0, 30.0), 30);
        assert_eq!(seconds_to_frame_index(1.05, 0.05, 30.0), 30);
        assert_eq!(seconds_to_frame_index(-0.2, 0.0, 30.0), 0);
    }

    #[test]
    fn seek_timestamps_are_microseconds() {
        assert_eq!(seconds_to_seek_timestamp(1.5), 1_500_000);
        assert_eq!(seconds_to_seek_timestamp(-1.0), 0);
        assert_eq!(frame_index_to_seconds(45, 30.0), 1.5);
        assert_eq!(frame_index_to_seconds(45, 0.0), 0.0);
    }
}

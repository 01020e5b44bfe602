//! Synthetic media shared by the integration tests.
//!
//! Clips are built in memory with the crate's own re-encoder. When FFmpeg
//! has no usable encoder the helpers return `None` and the calling test
//! returns early, so the suite still passes on minimal FFmpeg builds.

#![allow(dead_code)]

use std::io::Write;
use std::ops::Range;

use image::{DynamicImage, Rgb, RgbImage};
use vidsample::{ContainerFormat, FrameReEncoder, ReEncodeOptions, VideoCodec, VideoSource};

/// A solid frame whose colour encodes its position in the sequence.
pub fn gradient_frame(index: usize, width: u32, height: u32) -> DynamicImage {
    let shade = ((index * 37) % 256) as u8;
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([shade, (x % 256) as u8, (y % 256) as u8])
    });
    DynamicImage::ImageRgb8(image)
}

pub fn gradient_frames(count: usize, width: u32, height: u32) -> Vec<DynamicImage> {
    (0..count)
        .map(|index| gradient_frame(index, width, height))
        .collect()
}

/// Encode `count` frames at `fps` into an MP4 clip.
pub fn synthetic_clip(count: usize, fps: f64) -> Option<VideoSource> {
    synthetic_clip_with(count, fps, 64, 48, ContainerFormat::Mp4)
}

pub fn synthetic_clip_with(
    count: usize,
    fps: f64,
    width: u32,
    height: u32,
    container: ContainerFormat,
) -> Option<VideoSource> {
    let frames = gradient_frames(count, width, height);
    let images: Vec<&DynamicImage> = frames.iter().collect();
    let options = ReEncodeOptions::default()
        .with_codec(VideoCodec::Mpeg4)
        .with_container(container);
    match FrameReEncoder::new(options).encode_images(&images, fps) {
        Ok(clip) => Some(VideoSource::from_bytes(clip.into_bytes())),
        Err(error) => {
            eprintln!("skipping: cannot build synthetic clip: {error}");
            None
        }
    }
}

/// Byte range of every video packet in `source`, in stream order.
pub fn packet_ranges(source: &VideoSource) -> Option<Vec<Range<usize>>> {
    ffmpeg_next::init().ok()?;
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().ok()?;
    file.write_all(source.as_bytes()).ok()?;
    file.flush().ok()?;

    let mut input = ffmpeg_next::format::input(file.path()).ok()?;
    let video = input
        .streams()
        .best(ffmpeg_next::media::Type::Video)?
        .index();
    input
        .packets()
        .filter(|(stream, _)| stream.index() == video)
        .map(|(_, packet)| {
            let start = usize::try_from(packet.position()).ok()?;
            Some(start..start + packet.size())
        })
        .collect()
}

/// Scramble the payload of the packet holding `frame`, leaving its picture
/// header intact so the decoder reaches the damaged macroblocks.
pub fn damage_frame(source: &VideoSource, frame: usize) -> Option<VideoSource> {
    let range = packet_ranges(source)?.get(frame)?.clone();
    let start = range.start + (range.len() / 4).max(8);
    if start >= range.end {
        eprintln!("skipping: packet of frame {frame} is too small to damage");
        return None;
    }

    let mut bytes = source.as_bytes().to_vec();
    for (offset, byte) in bytes[start..range.end].iter_mut().enumerate() {
        *byte ^= 0xA5 ^ (offset as u8).wrapping_mul(31);
    }
    Some(VideoSource::from_bytes(bytes))
}

/// A mono 16-bit PCM WAV file: a container without any video track.
pub fn audio_only_wav(sample_rate: u32, seconds: u32) -> VideoSource {
    let samples = sample_rate * seconds;
    let data_len = samples * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1_u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2_u16.to_le_bytes());
    bytes.extend_from_slice(&16_u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in 0..samples {
        let value = ((sample % 100) as i16 - 50) * 200;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    VideoSource::from_bytes(bytes)
}

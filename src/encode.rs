//! Re-encoding sampled frames into a video clip.
//!
//! [`FrameReEncoder`] turns a frame sequence into an in-memory container
//! whose presentation timestamps are exact: frame `i` is shown at
//! `i / target_fps` seconds with no drift, for any rational-looking rate
//! such as `0.5`, `2` or `29.97`. The rate is converted to a fraction
//! `num/den`, the time base is `1 / lcm(num, nominal)`, and each frame
//! advances by an integer number of ticks.
//!
//! Encoding favours fidelity and latency: H.264 through libx264 at a very
//! low CRF with the `ultrafast` preset and `zerolatency` tune, no B-frames.
//! When no H.264 encoder is available, MPEG-4 Part 2 at a fixed low
//! quantiser is used instead.
//!
//! # Example
//!
//! ```no_run
//! use vidsample::{FrameReEncoder, ReEncodeOptions};
//! # let frames: Vec<vidsample::DecodedFrame> = Vec::new();
//!
//! let clip = FrameReEncoder::new(ReEncodeOptions::default()).encode(&frames, 2.0)?;
//! clip.save("sampled.mp4")?;
//! # Ok::<(), vidsample::SampleError>(())
//! ```

use std::ffi::c_int;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ffmpeg_next::{
    Dictionary, Packet, Rational,
    codec::{Id, context::Context as CodecContext},
    encoder::Video as VideoEncoder,
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use ffmpeg_sys_next::{AVFormatContext, AVRational};
use image::{DynamicImage, imageops::FilterType};

use crate::error::SampleError;
use crate::frame::DecodedFrame;
use crate::io::MemoryOutput;
use crate::progress::{OperationType, ProgressCallback, ProgressTracker};

/// Timestamp resolution reference rate.
pub const NOMINAL_FRAME_RATE: u32 = 30;

/// Largest denominator used when turning a frame rate into a fraction.
const MAX_RATE_DENOMINATOR: c_int = 100_000;

/// Quantiser for the MPEG-4 fallback (2 is near-transparent).
const MPEG4_QSCALE: c_int = 2;

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC, falling back to MPEG-4 Part 2 when unavailable.
    #[default]
    H264,
    /// MPEG-4 Part 2.
    Mpeg4,
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    /// ISO base media (`.mp4`).
    #[default]
    Mp4,
    /// Matroska (`.mkv`).
    Matroska,
}

impl ContainerFormat {
    fn muxer_name(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Matroska => "matroska",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Matroska => "mkv",
        }
    }
}

/// Options for [`FrameReEncoder`].
#[derive(Clone)]
pub struct ReEncodeOptions {
    /// Codec (default H.264).
    pub codec: VideoCodec,
    /// libx264 constant rate factor, 0-51 (default 4).
    pub crf: u8,
    /// libx264 preset (default `ultrafast`).
    pub preset: String,
    /// libx264 tune (default `zerolatency`).
    pub tune: String,
    /// Container (default MP4).
    pub container: ContainerFormat,
    /// Reference rate for the timestamp grid (default 30).
    pub nominal_frame_rate: u32,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl Debug for ReEncodeOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ReEncodeOptions")
            .field("codec", &self.codec)
            .field("crf", &self.crf)
            .field("preset", &self.preset)
            .field("tune", &self.tune)
            .field("container", &self.container)
            .field("nominal_frame_rate", &self.nominal_frame_rate)
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for ReEncodeOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            crf: 4,
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            container: ContainerFormat::Mp4,
            nominal_frame_rate: NOMINAL_FRAME_RATE,
            progress: None,
        }
    }
}

impl ReEncodeOptions {
    /// Set the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the libx264 CRF (clamped to 0-51).
    #[must_use]
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Set the libx264 preset.
    #[must_use]
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Set the libx264 tune.
    #[must_use]
    pub fn with_tune(mut self, tune: impl Into<String>) -> Self {
        self.tune = tune.into();
        self
    }

    /// Set the container.
    #[must_use]
    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    /// Set the reference rate of the timestamp grid.
    #[must_use]
    pub fn with_nominal_frame_rate(mut self, rate: u32) -> Self {
        self.nominal_frame_rate = rate.max(1);
        self
    }

    /// Report progress after each encoded frame.
    #[must_use]
    pub fn with_progress<P: ProgressCallback + 'static>(mut self, callback: P) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }
}

/// An encoded clip held in memory.
#[derive(Clone, PartialEq, Eq)]
#[must_use]
pub struct EncodedVideoBuffer {
    data: Vec<u8>,
    /// Encoder that produced the stream (e.g. `"libx264"`, `"mpeg4"`).
    pub codec_name: String,
    /// Container of `data`.
    pub container: ContainerFormat,
    /// Number of frames encoded.
    pub frame_count: usize,
    /// Frame rate as a fraction.
    pub frame_rate: Rational,
    /// Time base of the encoded stream.
    pub time_base: Rational,
    /// Ticks between consecutive frames.
    pub pts_step_ticks: i64,
    /// Reference rate of the timestamp grid.
    pub nominal_frame_rate: u32,
    /// Width of every frame.
    pub width: u32,
    /// Height of every frame.
    pub height: u32,
}

impl Debug for EncodedVideoBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("EncodedVideoBuffer")
            .field("bytes", &self.data.len())
            .field("codec_name", &self.codec_name)
            .field("container", &self.container)
            .field("frame_count", &self.frame_count)
            .field("frame_rate", &self.frame_rate)
            .field("time_base", &self.time_base)
            .field("pts_step_ticks", &self.pts_step_ticks)
            .finish()
    }
}

impl EncodedVideoBuffer {
    /// The container bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64 of the container bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Frame rate as a float.
    pub fn target_fps(&self) -> f64 {
        f64::from(self.frame_rate)
    }

    /// Presentation time of every frame, in seconds.
    pub fn presentation_timestamps(&self) -> Vec<f64> {
        let tick = f64::from(self.time_base);
        (0..self.frame_count as i64)
            .map(|index| (index * self.pts_step_ticks) as f64 * tick)
            .collect()
    }

    /// Write the container to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SampleError> {
        std::fs::write(path.as_ref(), &self.data)?;
        log::debug!(
            "Wrote {} byte(s) to {}",
            self.data.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

/// The timestamp grid for a frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimestampGrid {
    pub(crate) frame_rate: Rational,
    pub(crate) time_base: Rational,
    pub(crate) step: i64,
}

impl TimestampGrid {
    pub(crate) fn new(fps: f64, nominal: u32) -> Result<Self, SampleError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SampleError::InvalidConfig(format!(
                "target frame rate must be positive and finite, got {fps}"
            )));
        }

        let AVRational { num, den } = unsafe { ffmpeg_sys_next::av_d2q(fps, MAX_RATE_DENOMINATOR) };
        if num <= 0 || den <= 0 {
            return Err(SampleError::InvalidConfig(format!(
                "frame rate {fps} cannot be expressed as a fraction"
            )));
        }

        let (num, den) = (i64::from(num), i64::from(den));
        let ticks_per_second = lcm(num, i64::from(nominal.max(1)));
        let (time_base, step) = if ticks_per_second <= i64::from(i32::MAX) {
            (
                Rational::new(1, ticks_per_second as i32),
                den * ticks_per_second / num,
            )
        } else {
            (Rational::new(den as i32, num as i32), 1)
        };

        Ok(Self {
            frame_rate: Rational::new(num as i32, den as i32),
            time_base,
            step,
        })
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

fn lcm(a: i64, b: i64) -> i64 {
    a / gcd(a, b) * b
}

/// Encodes frame sequences into exact-timestamp clips.
#[derive(Debug, Clone, Default)]
pub struct FrameReEncoder {
    options: ReEncodeOptions,
}

impl FrameReEncoder {
    /// Create an encoder with the given options.
    pub fn new(options: ReEncodeOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &ReEncodeOptions {
        &self.options
    }

    /// Encode decoded frames at `target_fps`.
    ///
    /// # Errors
    ///
    /// - [`SampleError::EmptyFrameSequence`] if `frames` is empty.
    /// - [`SampleError::InvalidConfig`] if `target_fps` is not positive and
    ///   finite.
    /// - [`SampleError::EncodeFailure`] if no encoder can be opened or
    ///   muxing fails.
    pub fn encode(
        &self,
        frames: &[DecodedFrame],
        target_fps: f64,
    ) -> Result<EncodedVideoBuffer, SampleError> {
        let images: Vec<&DynamicImage> = frames.iter().map(|frame| &frame.image).collect();
        self.encode_images(&images, target_fps)
    }

    /// Encode plain images at `target_fps`.
    pub fn encode_images(
        &self,
        images: &[&DynamicImage],
        target_fps: f64,
    ) -> Result<EncodedVideoBuffer, SampleError> {
        let Some(first) = images.first() else {
            return Err(SampleError::EmptyFrameSequence);
        };
        let grid = TimestampGrid::new(target_fps, self.options.nominal_frame_rate)?;
        crate::ffmpeg::initialize()?;

        // 4:2:0 chroma needs even dimensions.
        let width = (first.width() & !1).max(2);
        let height = (first.height() & !1).max(2);

        log::info!(
            "Re-encoding {} frame(s) at {}x{} and {}/{} fps (time base {}/{}, step {})",
            images.len(),
            width,
            height,
            grid.frame_rate.numerator(),
            grid.frame_rate.denominator(),
            grid.time_base.numerator(),
            grid.time_base.denominator(),
            grid.step
        );

        let mut output = MemoryOutput::new(self.options.container.muxer_name())?;
        let (mut encoder, codec_name) = self.open_encoder(width, height, &grid, &output)?;

        let stream_time_base = unsafe { add_stream(output.as_mut_ptr(), &encoder, &grid)? };

        let mut scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ScalingFlags::BICUBIC,
        )?;

        let mut tracker = self.options.progress.clone().map(|callback| {
            ProgressTracker::new(
                callback,
                OperationType::ReEncoding,
                Some(images.len() as u64),
            )
        });

        let mut writer = PacketWriter {
            context: output.as_mut_ptr(),
            encoder_time_base: grid.time_base,
            stream_time_base,
            step: grid.step,
        };

        let quality = if codec_name == "libx264" {
            None
        } else {
            Some(MPEG4_QSCALE * ffmpeg_sys_next::FF_QP2LAMBDA as c_int)
        };

        for (index, image) in images.iter().enumerate() {
            let rgb_frame = image_to_frame(image, width, height);
            let mut yuv_frame = VideoFrame::empty();
            scaler.run(&rgb_frame, &mut yuv_frame)?;
            yuv_frame.set_pts(Some(index as i64 * grid.step));
            if let Some(quality) = quality {
                unsafe {
                    (*yuv_frame.as_mut_ptr()).quality = quality;
                }
            }

            encoder
                .send_frame(&yuv_frame)
                .map_err(|error| SampleError::EncodeFailure(format!("send_frame failed: {error}")))?;
            writer.drain(&mut encoder)?;

            if let Some(tracker) = tracker.as_mut() {
                tracker.advance(Some(index as u64), None);
            }
        }

        encoder
            .send_eof()
            .map_err(|error| SampleError::EncodeFailure(format!("send_eof failed: {error}")))?;
        writer.drain(&mut encoder)?;

        let result = unsafe { ffmpeg_sys_next::av_write_trailer(output.as_mut_ptr()) };
        if result < 0 {
            return Err(SampleError::EncodeFailure(format!(
                "cannot write trailer: {}",
                ffmpeg_next::Error::from(result)
            )));
        }

        let data = output.into_bytes();
        log::info!("Encoded {} frame(s) into {} byte(s)", images.len(), data.len());

        Ok(EncodedVideoBuffer {
            data,
            codec_name,
            container: self.options.container,
            frame_count: images.len(),
            frame_rate: grid.frame_rate,
            time_base: grid.time_base,
            pts_step_ticks: grid.step,
            nominal_frame_rate: self.options.nominal_frame_rate,
            width,
            height,
        })
    }

    fn find_codec(&self) -> Result<ffmpeg_next::Codec, SampleError> {
        if self.options.codec == VideoCodec::H264 {
            let h264 = ffmpeg_next::encoder::find_by_name("libx264")
                .or_else(|| ffmpeg_next::encoder::find(Id::H264));
            if let Some(codec) = h264 {
                return Ok(codec);
            }
            log::warn!("No H.264 encoder available; falling back to MPEG-4 Part 2");
        }

        ffmpeg_next::encoder::find(Id::MPEG4)
            .ok_or_else(|| SampleError::EncodeFailure("no usable video encoder found".to_string()))
    }

    fn open_encoder(
        &self,
        width: u32,
        height: u32,
        grid: &TimestampGrid,
        output: &MemoryOutput,
    ) -> Result<(VideoEncoder, String), SampleError> {
        let codec = self.find_codec()?;
        let codec_name = codec.name().to_string();

        let mut encoder = CodecContext::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|error| SampleError::EncodeFailure(format!("cannot create encoder: {error}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(grid.time_base);
        encoder.set_frame_rate(Some(grid.frame_rate));
        encoder.set_max_b_frames(0);

        let mut options = Dictionary::new();
        unsafe {
            let context = encoder.as_mut_ptr();
            if output.needs_global_header() {
                (*context).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as c_int;
            }
            if codec_name != "libx264" {
                (*context).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_QSCALE as c_int;
                (*context).global_quality = MPEG4_QSCALE * ffmpeg_sys_next::FF_QP2LAMBDA as c_int;
            }
        }
        if codec_name == "libx264" {
            options.set("crf", &self.options.crf.to_string());
            options.set("preset", &self.options.preset);
            options.set("tune", &self.options.tune);
        }

        let encoder = encoder
            .open_as_with(codec, options)
            .map_err(|error| SampleError::EncodeFailure(format!("cannot open {codec_name}: {error}")))?;
        log::debug!("Opened {codec_name} encoder");
        Ok((encoder, codec_name))
    }
}

/// Add the video stream and write the container header. Returns the stream
/// time base chosen by the muxer.
unsafe fn add_stream(
    context: *mut AVFormatContext,
    encoder: &VideoEncoder,
    grid: &TimestampGrid,
) -> Result<Rational, SampleError> {
    unsafe {
        let stream = ffmpeg_sys_next::avformat_new_stream(context, ptr::null());
        if stream.is_null() {
            return Err(SampleError::EncodeFailure(
                "failed to add output stream".to_string(),
            ));
        }

        let result = ffmpeg_sys_next::avcodec_parameters_from_context((*stream).codecpar, encoder.as_ptr());
        if result < 0 {
            return Err(SampleError::EncodeFailure(format!(
                "cannot copy encoder parameters: {}",
                ffmpeg_next::Error::from(result)
            )));
        }
        (*stream).time_base = grid.time_base.into();
        (*stream).avg_frame_rate = grid.frame_rate.into();

        let result = ffmpeg_sys_next::avformat_write_header(context, ptr::null_mut());
        if result < 0 {
            return Err(SampleError::EncodeFailure(format!(
                "cannot write header: {}",
                ffmpeg_next::Error::from(result)
            )));
        }

        Ok(Rational::from((*stream).time_base))
    }
}

struct PacketWriter {
    context: *mut AVFormatContext,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    step: i64,
}

impl PacketWriter {
    fn drain(&mut self, encoder: &mut VideoEncoder) -> Result<(), SampleError> {
        let mut packet = Packet::empty();
        while packet_received(encoder.receive_packet(&mut packet))? {
            packet.set_stream(0);
            packet.set_duration(self.step);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            let result = unsafe {
                ffmpeg_sys_next::av_interleaved_write_frame(self.context, packet.as_mut_ptr())
            };
            if result < 0 {
                return Err(SampleError::EncodeFailure(format!(
                    "cannot write packet: {}",
                    ffmpeg_next::Error::from(result)
                )));
            }
        }
        Ok(())
    }
}

/// `Ok(true)` when a packet is ready, `Ok(false)` when the encoder needs more
/// input or is fully drained.
fn packet_received(result: Result<(), ffmpeg_next::Error>) -> Result<bool, SampleError> {
    match result {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Eof) => Ok(false),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(false)
        }
        Err(error) => Err(SampleError::EncodeFailure(format!(
            "cannot receive packet: {error}"
        ))),
    }
}

/// Copy an image into an RGB24 frame of exactly `width` x `height`.
fn image_to_frame(image: &DynamicImage, width: u32, height: u32) -> VideoFrame {
    let rgb = if image.width() != width || image.height() != height {
        image
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8()
    } else {
        image.to_rgb8()
    };

    let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
    let stride = frame.stride(0);
    let row_length = (width as usize) * 3;
    let source = rgb.as_raw();
    let destination = frame.data_mut(0);
    for row in 0..height as usize {
        let source_start = row * row_length;
        let destination_start = row * stride;
        destination[destination_start..destination_start + row_length]
            .copy_from_slice(&source[source_start..source_start + row_length]);
    }
    frame
}

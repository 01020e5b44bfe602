//! One-call sampling facade.
//!
//! [`FrameSampler`] bundles a [`DecodeMethod`] with a [`DecodeConfig`] and
//! runs the whole pipeline for each source it is given: backend selection,
//! planning, decoding, resizing, and optionally re-encoding.

use crate::batches::FrameBatches;
use crate::configuration::DecodeConfig;
use crate::decoder::{DecodeMethod, DecodeOutput, VideoBackend};
use crate::decoder_factory::DecoderFactory;
use crate::encode::{EncodedVideoBuffer, FrameReEncoder, ReEncodeOptions};
use crate::error::SampleError;
use crate::frame::FrameImageFormat;
use crate::metadata::VideoInfo;
use crate::probe::MediaProbe;
use crate::session::DecodeSession;
use crate::source::VideoSource;

/// Samples frames from video sources with a fixed method and configuration.
///
/// # Example
///
/// ```no_run
/// use vidsample::{DecodeConfig, DecodeMethod, FrameSampler, ResizeBounds, VideoSource};
///
/// let config = DecodeConfig::new()
///     .with_target_fps(2.0)
///     .with_max_frames(32)
///     .with_resize_bounds(ResizeBounds::new(128 * 28 * 28, 768 * 28 * 28));
/// let sampler = FrameSampler::new(DecodeMethod::Auto, config);
///
/// let source = VideoSource::from_path("input.mp4")?;
/// let output = sampler.sample(&source)?;
/// for frame in &output.frames {
///     println!("#{} at {:.3}s", frame.source_index, frame.timestamp);
/// }
/// # Ok::<(), vidsample::SampleError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameSampler {
    method: DecodeMethod,
    config: DecodeConfig,
    encode_options: ReEncodeOptions,
}

impl FrameSampler {
    /// Create a sampler.
    pub fn new(method: DecodeMethod, config: DecodeConfig) -> Self {
        Self {
            method,
            config,
            encode_options: ReEncodeOptions::default(),
        }
    }

    /// Options used by [`sample_to_clip`](FrameSampler::sample_to_clip).
    #[must_use]
    pub fn with_encode_options(mut self, options: ReEncodeOptions) -> Self {
        self.encode_options = options;
        self
    }

    /// Requested method (possibly `Auto`).
    pub fn method(&self) -> DecodeMethod {
        self.method
    }

    /// Decode configuration.
    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// The backend this sampler would use right now.
    pub fn backend(&self) -> Result<Box<dyn VideoBackend>, SampleError> {
        DecoderFactory::create(self.method, &self.config)
    }

    /// Open a session on `source`.
    pub fn open<'a>(&self, source: &'a VideoSource) -> Result<DecodeSession<'a>, SampleError> {
        self.backend()?.open(source, &self.config)
    }

    /// Probe `source` without decoding.
    pub fn probe(&self, source: &VideoSource) -> Result<VideoInfo, SampleError> {
        MediaProbe::probe(source)
    }

    /// Decode every planned frame.
    pub fn sample(&self, source: &VideoSource) -> Result<DecodeOutput, SampleError> {
        let output = self.open(source)?.decode_all()?;
        log::info!(
            "Sampled {} frame(s) from {} byte(s) ({:?})",
            output.len(),
            source.len(),
            output.status
        );
        Ok(output)
    }

    /// Stream planned frames in batches of `batch_size`.
    pub fn sample_batches<'a>(
        &self,
        source: &'a VideoSource,
        batch_size: usize,
    ) -> Result<FrameBatches<'a>, SampleError> {
        self.open(source)?.decode_batches(batch_size)
    }

    /// Decode and encode every frame as image bytes.
    pub fn sample_to_images(
        &self,
        source: &VideoSource,
        format: FrameImageFormat,
    ) -> Result<Vec<Vec<u8>>, SampleError> {
        self.sample(source)?
            .frames
            .iter()
            .map(|frame| frame.encode(format))
            .collect()
    }

    /// Decode and encode every frame as base64 image text.
    pub fn sample_to_base64(
        &self,
        source: &VideoSource,
        format: FrameImageFormat,
    ) -> Result<Vec<String>, SampleError> {
        self.sample(source)?
            .frames
            .iter()
            .map(|frame| frame.to_base64(format))
            .collect()
    }

    /// Decode, then re-encode the sampled frames into a clip.
    ///
    /// The clip plays at the configured target rate, or at the source rate
    /// when every frame is kept.
    ///
    /// # Errors
    ///
    /// [`SampleError::EmptyFrameSequence`] if nothing was decoded, plus any
    /// decode or encode error.
    pub fn sample_to_clip(&self, source: &VideoSource) -> Result<EncodedVideoBuffer, SampleError> {
        let output = self.sample(source)?;
        let fps = if self.config.target_fps() > 0.0 {
            self.config.target_fps()
        } else {
            output.metadata.effective_fps()
        };
        FrameReEncoder::new(self.encode_options.clone()).encode(&output.frames, fps)
    }
}

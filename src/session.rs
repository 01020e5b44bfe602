//! Decode sessions.
//!
//! A [`DecodeSession`] is returned by [`VideoBackend::open`] with the
//! container already open and its metadata read. Every decode operation
//! consumes the session: it plans the frames to produce, streams them out of
//! the backend, and releases the container when it reaches a terminal state,
//! whether that is completion, cancellation, or failure.
//!
//! [`VideoBackend::open`]: crate::VideoBackend::open

use std::time::Duration;

use crate::batches::FrameBatches;
use crate::configuration::{DecodeConfig, TimeRange};
use crate::decoder::{
    Capabilities, DecodeMethod, DecodeOutput, DecodeState, DecodeStatus, Degradation, FramePump,
};
use crate::error::SampleError;
use crate::frame::DecodedFrame;
use crate::metadata::StreamMetadata;
use crate::planner::{FrameIndexPlan, plan_frame_indices};
use crate::progress::{OperationType, ProgressTracker};
use crate::resize::resize_image;

/// An opened source, ready to decode.
///
/// # Example
///
/// ```no_run
/// use vidsample::{DecodeConfig, DecoderFactory, DecodeMethod, VideoSource};
///
/// let source = VideoSource::from_path("clip.mp4")?;
/// let config = DecodeConfig::new().with_target_fps(1.0);
/// let backend = DecoderFactory::create(DecodeMethod::Auto, &config)?;
///
/// let session = backend.open(&source, &config)?;
/// println!("{:?}", session.stream_info());
/// let output = session.decode_all()?;
/// println!("{} frames", output.len());
/// # Ok::<(), vidsample::SampleError>(())
/// ```
pub struct DecodeSession<'a> {
    method: DecodeMethod,
    capabilities: Capabilities,
    config: DecodeConfig,
    metadata: StreamMetadata,
    pump: Option<Box<dyn FramePump + 'a>>,
    state: DecodeState,
    degradations: Vec<Degradation>,
    tracker: Option<ProgressTracker>,
    last_timestamp: f64,
}

impl std::fmt::Debug for DecodeSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("method", &self.method)
            .field("state", &self.state)
            .field("metadata", &self.metadata)
            .field("degradations", &self.degradations)
            .finish()
    }
}

impl<'a> DecodeSession<'a> {
    /// Wrap an opened pump. Checks the time window against the stream and
    /// records metadata-level degradations.
    pub(crate) fn open(
        method: DecodeMethod,
        capabilities: Capabilities,
        config: &DecodeConfig,
        pump: Box<dyn FramePump + 'a>,
        mut degradations: Vec<Degradation>,
    ) -> Result<Self, SampleError> {
        let metadata = pump.metadata().clone();
        config.validate_against(&metadata)?;

        if !metadata.has_known_frame_rate() {
            log::warn!("Source frame rate unknown; timestamps assume 1 fps");
            degradations.push(Degradation::UnknownFrameRate);
        }
        if metadata.frame_count_estimated {
            log::debug!(
                "Frame count {} estimated from duration {:.3}s",
                metadata.total_frames,
                metadata.duration_seconds
            );
            degradations.push(Degradation::EstimatedFrameCount);
        }

        Ok(Self {
            method,
            capabilities,
            config: config.clone(),
            metadata,
            pump: Some(pump),
            state: DecodeState::Opened,
            degradations,
            tracker: None,
            last_timestamp: 0.0,
        })
    }

    /// Backend that opened this session.
    pub fn method(&self) -> DecodeMethod {
        self.method
    }

    /// Capabilities of that backend.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Metadata of the video track.
    pub fn stream_info(&self) -> &StreamMetadata {
        &self.metadata
    }

    /// Degradations recorded so far.
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// The absolute source indices [`decode_all`](Self::decode_all) would
    /// produce.
    pub fn plan(&self) -> Result<FrameIndexPlan, SampleError> {
        plan_for(&self.config, &self.metadata)
    }

    /// Decode every planned frame.
    pub fn decode_all(mut self) -> Result<DecodeOutput, SampleError> {
        let plan = self.plan_or_fail()?;
        self.begin(plan.into_vec())?;
        self.collect()
    }

    /// Decode the plan lazily in batches of at most `batch_size` frames.
    pub fn decode_batches(mut self, batch_size: usize) -> Result<FrameBatches<'a>, SampleError> {
        if batch_size == 0 {
            return Err(SampleError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if !self.capabilities.streaming_batches {
            return Err(SampleError::UnsupportedOperation {
                method: self.method,
                operation: "decode_batches",
            });
        }

        let plan = self.plan_or_fail()?;
        self.begin(plan.into_vec())?;
        Ok(FrameBatches::new(self, batch_size))
    }

    /// Decode exactly the given source indices.
    ///
    /// Indices are sorted and deduplicated; indices past the end of the
    /// stream are dropped with a warning.
    pub fn decode_specific_frames(mut self, indices: &[u64]) -> Result<DecodeOutput, SampleError> {
        self.require_precise_seek("decode_specific_frames")?;

        let total = self.metadata.total_frames;
        let mut targets: Vec<u64> = indices.to_vec();
        targets.sort_unstable();
        targets.dedup();
        let requested = targets.len();
        if total > 0 {
            targets.retain(|&index| index < total);
        }
        if targets.len() < requested {
            log::warn!(
                "Dropping {} index(es) beyond the last frame ({})",
                requested - targets.len(),
                total.saturating_sub(1)
            );
        }

        self.state = DecodeState::Planning;
        self.begin(targets)?;
        self.collect()
    }

    /// Decode the planned frames of a time window, overriding the window in
    /// the session's configuration.
    pub fn decode_time_range(
        mut self,
        start: f64,
        duration: Option<f64>,
    ) -> Result<DecodeOutput, SampleError> {
        self.require_precise_seek("decode_time_range")?;

        self.config = self.config.clone().with_time_range(Some(start), None, duration);
        if let Err(error) = self
            .config
            .validate()
            .and_then(|()| self.config.validate_against(&self.metadata))
        {
            self.fail();
            return Err(error);
        }

        let plan = self.plan_or_fail()?;
        self.begin(plan.into_vec())?;
        self.collect()
    }

    fn require_precise_seek(&mut self, operation: &'static str) -> Result<(), SampleError> {
        if self.capabilities.precise_seek {
            return Ok(());
        }
        self.fail();
        Err(SampleError::UnsupportedOperation {
            method: self.method,
            operation,
        })
    }

    fn plan_or_fail(&mut self) -> Result<FrameIndexPlan, SampleError> {
        self.state = DecodeState::Planning;
        plan_for(&self.config, &self.metadata).inspect_err(|_| self.fail())
    }

    fn begin(&mut self, targets: Vec<u64>) -> Result<(), SampleError> {
        log::debug!(
            "{} backend decoding {} planned frame(s) of {}",
            self.method,
            targets.len(),
            self.metadata.total_frames
        );

        self.tracker = self.config.has_progress.then(|| {
            ProgressTracker::new(
                self.config.progress.clone(),
                OperationType::FrameDecoding,
                Some(targets.len() as u64),
            )
        });

        let started = match self.pump.as_mut() {
            Some(pump) => pump.start(targets),
            None => Err(SampleError::FfmpegError(
                "decode session already finished".to_string(),
            )),
        };
        if let Err(error) = started {
            self.fail();
            return Err(error);
        }

        self.state = DecodeState::Streaming;
        Ok(())
    }

    fn collect(mut self) -> Result<DecodeOutput, SampleError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(self.into_output(frames))
    }

    /// Produce the next frame, or `None` once the session reached
    /// `Completed` or `Cancelled`.
    pub(crate) fn next_frame(&mut self) -> Result<Option<DecodedFrame>, SampleError> {
        if self.state != DecodeState::Streaming {
            return Ok(None);
        }

        if self.config.is_cancelled() {
            log::info!(
                "Decode cancelled after {} frame(s)",
                self.tracker.as_ref().map_or(0, ProgressTracker::current)
            );
            self.finish(DecodeState::Cancelled);
            return Ok(None);
        }

        let Some(pump) = self.pump.as_mut() else {
            return Ok(None);
        };

        let next = pump.next_frame();
        self.degradations.extend(pump.take_degradations());

        let mut frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.finish(DecodeState::Completed);
                return Ok(None);
            }
            Err(error) => {
                log::error!("Decoding failed: {error}");
                self.fail();
                return Err(error);
            }
        };

        if let Some(bounds) = self.config.resize_bounds() {
            frame.image = resize_image(frame.image, bounds);
        }

        // Timestamps must never run backwards, even across reordered or
        // damaged input.
        if frame.timestamp < self.last_timestamp {
            frame.timestamp = self.last_timestamp;
        }
        self.last_timestamp = frame.timestamp;

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.advance(
                Some(frame.source_index),
                Some(Duration::from_secs_f64(frame.timestamp.max(0.0))),
            );
        }

        Ok(Some(frame))
    }

    fn finish(&mut self, state: DecodeState) {
        if let Some(mut pump) = self.pump.take() {
            self.degradations.extend(pump.take_degradations());
        }
        self.state = state;
        log::debug!("{} session finished: {state:?}", self.method);
    }

    fn fail(&mut self) {
        self.pump = None;
        self.state = DecodeState::Failed;
    }

    /// Terminal status, if the session reached one.
    pub(crate) fn status(&self) -> Option<DecodeStatus> {
        match self.state {
            DecodeState::Completed => Some(DecodeStatus::Completed),
            DecodeState::Cancelled => Some(DecodeStatus::Cancelled),
            _ => None,
        }
    }

    pub(crate) fn into_output(self, frames: Vec<DecodedFrame>) -> DecodeOutput {
        let status = self.status().unwrap_or(DecodeStatus::Completed);
        if status == DecodeStatus::Completed {
            log::info!(
                "Decoded {} frame(s) with the {} backend",
                frames.len(),
                self.method
            );
        }
        DecodeOutput {
            frames,
            status,
            metadata: self.metadata,
            degradations: self.degradations,
        }
    }
}

/// Plan over the configured window, as absolute source indices.
pub(crate) fn plan_for(
    config: &DecodeConfig,
    metadata: &StreamMetadata,
) -> Result<FrameIndexPlan, SampleError> {
    let range: TimeRange = config.time_range()?;
    let window = range.frame_window(metadata);
    let plan = plan_frame_indices(
        window.len(),
        metadata.source_fps,
        config.target_fps(),
        config.max_frames(),
    );
    Ok(plan.shifted(window.start_frame))
}

//! Decode configuration.
//!
//! [`DecodeConfig`] is an immutable builder that carries the sampling policy
//! (time window, target frame rate, frame cap), the decode tuning knobs
//! (hardware, threads, keyframes, geometric filter), the resize budget, and
//! the progress/cancellation plumbing through every backend.
//!
//! # Example
//!
//! ```
//! use vidsample::{CancellationToken, DecodeConfig, ResizeBounds};
//!
//! let token = CancellationToken::new();
//! let config = DecodeConfig::new()
//!     .with_time_range(Some(2.0), None, Some(10.0))
//!     .with_target_fps(2.0)
//!     .with_max_frames(64)
//!     .with_resize_bounds(ResizeBounds::new(128 * 28 * 28, 768 * 28 * 28))
//!     .with_cancellation(token.clone());
//!
//! assert!(config.validate().is_ok());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::SampleError;
use crate::filter::{FilterChain, validate_filter_expression};
use crate::metadata::StreamMetadata;
use crate::progress::{CancelCheck, CancellationToken, NoOpProgress, ProgressCallback};
use crate::resize::ResizeBounds;

/// Configuration for a decode call.
///
/// All fields have defaults: a default-constructed config decodes every frame
/// of the whole stream in software without resizing.
#[derive(Clone)]
pub struct DecodeConfig {
    pub(crate) start_time: Option<f64>,
    pub(crate) end_time: Option<f64>,
    pub(crate) duration: Option<f64>,
    pub(crate) target_fps: f64,
    pub(crate) max_frames: Option<u64>,
    pub(crate) gpu_id: Option<u32>,
    pub(crate) auto_fallback_to_software: bool,
    pub(crate) filter_expression: Option<String>,
    pub(crate) thread_count: Option<usize>,
    pub(crate) keyframes_only: bool,
    pub(crate) resize_bounds: Option<ResizeBounds>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) has_progress: bool,
    pub(crate) cancel_check: Option<CancelCheck>,
}

impl Debug for DecodeConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DecodeConfig")
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("duration", &self.duration)
            .field("target_fps", &self.target_fps)
            .field("max_frames", &self.max_frames)
            .field("gpu_id", &self.gpu_id)
            .field("auto_fallback_to_software", &self.auto_fallback_to_software)
            .field("filter_expression", &self.filter_expression)
            .field("thread_count", &self.thread_count)
            .field("keyframes_only", &self.keyframes_only)
            .field("resize_bounds", &self.resize_bounds)
            .field("has_progress", &self.has_progress)
            .field("has_cancel_check", &self.cancel_check.is_some())
            .finish()
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeConfig {
    /// Create a configuration with default settings.
    ///
    /// Defaults: whole stream, every frame (`target_fps = 0`), no cap,
    /// software decoding with fallback enabled, no filter, codec-chosen
    /// thread count, no resizing, no callbacks.
    pub fn new() -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration: None,
            target_fps: 0.0,
            max_frames: None,
            gpu_id: None,
            auto_fallback_to_software: true,
            filter_expression: None,
            thread_count: None,
            keyframes_only: false,
            resize_bounds: None,
            progress: Arc::new(NoOpProgress),
            has_progress: false,
            cancel_check: None,
        }
    }

    /// Set the time window in seconds. At most two of the three values may
    /// be given; the third is derived.
    #[must_use]
    pub fn with_time_range(
        mut self,
        start_time: Option<f64>,
        end_time: Option<f64>,
        duration: Option<f64>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self.duration = duration;
        self
    }

    /// Set the window start in seconds.
    #[must_use]
    pub fn with_start_time(mut self, seconds: f64) -> Self {
        self.start_time = Some(seconds);
        self
    }

    /// Set the window end in seconds.
    #[must_use]
    pub fn with_end_time(mut self, seconds: f64) -> Self {
        self.end_time = Some(seconds);
        self
    }

    /// Set the window length in seconds.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Set the sampling rate. Values `<= 0` keep every frame.
    #[must_use]
    pub fn with_target_fps(mut self, fps: f64) -> Self {
        self.target_fps = fps;
        self
    }

    /// Cap the number of sampled frames.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Request hardware decoding on the given GPU.
    #[must_use]
    pub fn with_gpu(mut self, gpu_id: u32) -> Self {
        self.gpu_id = Some(gpu_id);
        self
    }

    /// Control whether a failed hardware setup falls back to software
    /// decoding (the default) or fails the call.
    #[must_use]
    pub fn with_software_fallback(mut self, enabled: bool) -> Self {
        self.auto_fallback_to_software = enabled;
        self
    }

    /// Apply a geometric filter expression (e.g. `"scale=640:-2,hflip"`).
    #[must_use]
    pub fn with_filter(mut self, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        self.filter_expression = if expression.trim().is_empty() {
            None
        } else {
            Some(expression)
        };
        self
    }

    /// Apply the expression built by a [`FilterChain`].
    #[must_use]
    pub fn with_filter_chain(self, chain: &FilterChain) -> Self {
        self.with_filter(chain.build())
    }

    /// Set the decoder thread count. `0` lets the codec decide.
    #[must_use]
    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = (threads > 0).then_some(threads);
        self
    }

    /// Decode keyframes only.
    #[must_use]
    pub fn with_keyframes_only(mut self, keyframes_only: bool) -> Self {
        self.keyframes_only = keyframes_only;
        self
    }

    /// Resize every emitted frame into the given pixel budget.
    #[must_use]
    pub fn with_resize_bounds(mut self, bounds: ResizeBounds) -> Self {
        self.resize_bounds = Some(bounds);
        self
    }

    /// Attach a progress callback, invoked after each decoded frame.
    #[must_use]
    pub fn with_progress<P: ProgressCallback + 'static>(mut self, callback: P) -> Self {
        self.progress = Arc::new(callback);
        self.has_progress = true;
        self
    }

    /// Attach a shared progress callback.
    #[must_use]
    pub fn with_progress_arc(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self.has_progress = true;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the decode stops at the next frame
    /// boundary and reports [`DecodeStatus::Cancelled`](crate::DecodeStatus)
    /// with the frames produced so far.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_check = Some(token.as_cancel_check());
        self
    }

    /// Attach an arbitrary cancel predicate.
    #[must_use]
    pub fn with_cancel_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.cancel_check = Some(Arc::new(check));
        self
    }

    /// Window start in seconds, if set.
    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Window end in seconds, if set.
    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Window length in seconds, if set.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Sampling rate.
    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    /// Frame cap.
    pub fn max_frames(&self) -> Option<u64> {
        self.max_frames
    }

    /// Requested GPU.
    pub fn gpu_id(&self) -> Option<u32> {
        self.gpu_id
    }

    /// Whether a hardware failure falls back to software.
    pub fn auto_fallback_to_software(&self) -> bool {
        self.auto_fallback_to_software
    }

    /// Geometric filter expression.
    pub fn filter_expression(&self) -> Option<&str> {
        self.filter_expression.as_deref()
    }

    /// Decoder thread count.
    pub fn thread_count(&self) -> Option<usize> {
        self.thread_count
    }

    /// Whether only keyframes are decoded.
    pub fn keyframes_only(&self) -> bool {
        self.keyframes_only
    }

    /// Resize budget.
    pub fn resize_bounds(&self) -> Option<&ResizeBounds> {
        self.resize_bounds.as_ref()
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_check.as_ref().is_some_and(|check| check())
    }

    /// Check the configuration for contradictions.
    ///
    /// Runs before any decode work. Container-dependent checks happen in
    /// [`validate_against`](DecodeConfig::validate_against) once the source
    /// is open.
    pub fn validate(&self) -> Result<(), SampleError> {
        if !self.target_fps.is_finite() {
            return Err(SampleError::InvalidConfig(format!(
                "target_fps must be finite, got {}",
                self.target_fps
            )));
        }

        if self.max_frames == Some(0) {
            return Err(SampleError::InvalidConfig(
                "max_frames must be at least 1".to_string(),
            ));
        }

        self.time_range()?;

        if let Some(bounds) = &self.resize_bounds {
            if let (Some(min), Some(max)) = (bounds.min_pixels, bounds.max_pixels) {
                if min > max {
                    return Err(SampleError::InvalidConfig(format!(
                        "min_pixels ({min}) exceeds max_pixels ({max})"
                    )));
                }
            }
            if bounds.alignment == 0 {
                return Err(SampleError::InvalidConfig(
                    "resize alignment must be at least 1".to_string(),
                ));
            }
        }

        if let Some(expression) = &self.filter_expression {
            validate_filter_expression(expression)?;
        }

        Ok(())
    }

    /// Check the time window against the opened stream.
    ///
    /// Fails when the window starts at or beyond the end of the stream, or
    /// ends more than one frame interval past it. Streams without a known
    /// duration are not checked.
    pub fn validate_against(&self, metadata: &StreamMetadata) -> Result<(), SampleError> {
        let range = self.time_range()?;
        let length = metadata.duration_seconds;
        if length.is_nan() || length <= 0.0 {
            return Ok(());
        }

        if range.start >= length {
            return Err(SampleError::InvalidConfig(format!(
                "start time {:.3}s is beyond the stream length {length:.3}s",
                range.start
            )));
        }

        if let Some(end) = range.end {
            if end > length + metadata.frame_interval() {
                return Err(SampleError::InvalidConfig(format!(
                    "end time {end:.3}s is beyond the stream length {length:.3}s"
                )));
            }
        }

        Ok(())
    }

    /// Resolve start/end/duration into a [`TimeRange`].
    pub fn time_range(&self) -> Result<TimeRange, SampleError> {
        TimeRange::resolve(self.start_time, self.end_time, self.duration)
    }

    /// Returns `true` if the configuration restricts decoding to part of
    /// the stream.
    pub fn has_time_window(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.duration.is_some()
    }
}

/// A resolved time window in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    /// Window start.
    pub start: f64,
    /// Window end (exclusive). `None` runs to the end of the stream.
    pub end: Option<f64>,
}

impl TimeRange {
    /// The whole stream.
    pub const FULL: TimeRange = TimeRange {
        start: 0.0,
        end: None,
    };

    /// Derive a window from up to two of start, end, and duration.
    pub fn resolve(
        start: Option<f64>,
        end: Option<f64>,
        duration: Option<f64>,
    ) -> Result<Self, SampleError> {
        if start.is_some() && end.is_some() && duration.is_some() {
            return Err(SampleError::InvalidConfig(
                "at most two of start_time, end_time and duration may be set".to_string(),
            ));
        }

        for (name, value) in [("start_time", start), ("end_time", end), ("duration", duration)] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(SampleError::InvalidConfig(format!(
                        "{name} must be a non-negative number of seconds, got {value}"
                    )));
                }
            }
        }

        if duration.is_some_and(|d| d <= 0.0) {
            return Err(SampleError::InvalidConfig(
                "duration must be positive".to_string(),
            ));
        }

        let range = match (start, end, duration) {
            (None, Some(end), Some(duration)) => {
                let start = end - duration;
                if start < 0.0 {
                    return Err(SampleError::InvalidConfig(format!(
                        "duration {duration}s is longer than end_time {end}s"
                    )));
                }
                TimeRange {
                    start,
                    end: Some(end),
                }
            }
            (start, None, Some(duration)) => {
                let start = start.unwrap_or(0.0);
                TimeRange {
                    start,
                    end: Some(start + duration),
                }
            }
            (start, end, _) => TimeRange {
                start: start.unwrap_or(0.0),
                end,
            },
        };

        if let Some(end) = range.end {
            if end <= range.start {
                return Err(SampleError::InvalidConfig(format!(
                    "start_time ({}s) must be before end_time ({end}s)",
                    range.start
                )));
            }
        }

        Ok(range)
    }

    /// Window length in seconds, if bounded.
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start)
    }

    /// Convert to a frame window over the given stream.
    pub fn frame_window(&self, metadata: &StreamMetadata) -> FrameWindow {
        let fps = metadata.effective_fps();
        let total = metadata.total_frames;

        let start_frame = ((self.start * fps) as u64).min(total);
        let end_frame = match self.end {
            Some(end) => ((end * fps) as u64).clamp(start_frame, total),
            None => total,
        };

        FrameWindow {
            start_frame,
            end_frame,
            start_seconds: self.start,
            end_seconds: self.end,
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// A time window expressed in source frame indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameWindow {
    /// First frame inside the window.
    pub start_frame: u64,
    /// First frame past the window.
    pub end_frame: u64,
    /// Window start in seconds.
    pub start_seconds: f64,
    /// Window end in seconds, if bounded.
    pub end_seconds: Option<f64>,
}

impl FrameWindow {
    /// Number of frames in the window.
    pub fn len(&self) -> u64 {
        self.end_frame - self.start_frame
    }

    /// Returns `true` if the window holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `index` lies inside the window.
    pub fn contains(&self, index: u64) -> bool {
        (self.start_frame..self.end_frame).contains(&index)
    }
}

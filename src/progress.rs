//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring decode progress,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`]
//! for detailed progress snapshots.
//!
//! # Example
//!
//! ```no_run
//! use vidsample::{
//!     CancellationToken, DecodeConfig, DecodeMethod, FrameSampler, ProgressInfo,
//!     SampleError, VideoSource,
//! };
//!
//! let token = CancellationToken::new();
//! let config = DecodeConfig::new()
//!     .with_target_fps(2.0)
//!     .with_progress(|info: &ProgressInfo| {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     })
//!     .with_cancellation(token.clone());
//!
//! let source = VideoSource::from_path("input.mp4")?;
//! let output = FrameSampler::new(DecodeMethod::Codec, config).sample(&source)?;
//! println!("{} frames, status {:?}", output.frames.len(), output.status);
//! # Ok::<(), SampleError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding planned frames from a source.
    FrameDecoding,
    /// Re-encoding frames into a video buffer.
    ReEncoding,
}

/// A snapshot of decode or encode progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many frames have been produced so far.
    pub current: u64,
    /// Frames expected in total, if known ahead of time. For decoding this
    /// is the plan length, which may overshoot when the frame count was
    /// estimated.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Source index of the frame just produced.
    pub current_frame: Option<u64>,
    /// Presentation time of the frame just produced.
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because configurations are
/// shared across threads when decoding several sources in parallel.
///
/// Progress callbacks observe but cannot halt the operation. Use
/// [`CancellationToken`] or a cancel check for that.
///
/// Any `Fn(&ProgressInfo) + Send + Sync` closure implements this trait.
pub trait ProgressCallback: Send + Sync {
    /// Called after each produced frame.
    fn on_progress(&self, info: &ProgressInfo);
}

impl<F> ProgressCallback for F
where
    F: Fn(&ProgressInfo) + Send + Sync,
{
    fn on_progress(&self, info: &ProgressInfo) {
        self(info)
    }
}

/// A no-op implementation that discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// A shared cancellation predicate, polled at frame and batch boundaries.
pub type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to request
/// cancellation. The decode loop checks
/// [`is_cancelled`](CancellationToken::is_cancelled) before each frame.
///
/// # Example
///
/// ```
/// use vidsample::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wrap this token as a [`CancelCheck`].
    pub fn as_cancel_check(&self) -> CancelCheck {
        let token = self.clone();
        Arc::new(move || token.is_cancelled())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Number of items recorded so far.
    pub(crate) fn current(&self) -> u64 {
        self.current
    }

    /// Record one produced item and fire the callback.
    pub(crate) fn advance(&mut self, frame_index: Option<u64>, timestamp: Option<Duration>) {
        self.current += 1;
        self.report(frame_index, timestamp);
    }

    fn report(&self, frame_index: Option<u64>, timestamp: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32 * 100.0).min(100.0));

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame_index,
            current_timestamp: timestamp,
        };

        self.callback.on_progress(&info);
    }
}

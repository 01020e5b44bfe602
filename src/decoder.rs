//! The decoder contract shared by every backend.
//!
//! A backend implements [`VideoBackend`]: it reports its [`Capabilities`],
//! says whether it can run in this environment, and opens a
//! [`DecodeSession`] over a borrowed [`VideoSource`]. The session drives a
//! backend-private frame pump through the
//! `Opened -> Planning -> Streaming -> {Completed | Cancelled | Failed}`
//! lifecycle described by [`DecodeState`].
//!
//! Backends never fail silently. Anything that lowers the fidelity of the
//! result (software fallback, an estimated frame count, planned frames the
//! stream did not deliver, options the backend cannot honour) is logged and
//! recorded as a [`Degradation`] on the output.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::configuration::DecodeConfig;
use crate::error::SampleError;
use crate::frame::DecodedFrame;
use crate::metadata::StreamMetadata;
use crate::session::DecodeSession;
use crate::source::VideoSource;

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecodeMethod {
    /// Container demux and decode from memory, counting frames in decode
    /// order.
    Native,
    /// Decode through a temporary file on disk.
    FrameGrab,
    /// Timestamp-indexed decoding with seeking, hardware, filters and
    /// keyframe skipping.
    Codec,
    /// Pick a backend from the configuration.
    #[default]
    Auto,
}

impl DecodeMethod {
    /// Every concrete backend, in fallback order.
    pub const CONCRETE: [DecodeMethod; 3] =
        [DecodeMethod::Codec, DecodeMethod::Native, DecodeMethod::FrameGrab];

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            DecodeMethod::Native => "native",
            DecodeMethod::FrameGrab => "frame-grab",
            DecodeMethod::Codec => "codec",
            DecodeMethod::Auto => "auto",
        }
    }
}

impl Display for DecodeMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecodeMethod {
    type Err = SampleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "native" | "container" => Ok(DecodeMethod::Native),
            "frame-grab" | "frame_grab" | "framegrab" => Ok(DecodeMethod::FrameGrab),
            "codec" | "hardware" => Ok(DecodeMethod::Codec),
            "auto" => Ok(DecodeMethod::Auto),
            other => Err(SampleError::InvalidConfig(format!(
                "unknown decode method '{other}' (expected native, frame-grab, codec or auto)"
            ))),
        }
    }
}

/// What a backend can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Decodes straight from memory without touching the filesystem.
    pub memory_only_input: bool,
    /// Supports timestamp seeking, and therefore
    /// [`decode_specific_frames`](DecodeSession::decode_specific_frames) and
    /// [`decode_time_range`](DecodeSession::decode_time_range).
    pub precise_seek: bool,
    /// Can decode on a GPU.
    pub hardware_decode: bool,
    /// Supports [`decode_batches`](DecodeSession::decode_batches).
    pub streaming_batches: bool,
    /// Runs geometric filter expressions.
    pub filter_passthrough: bool,
    /// Can skip non-key frames inside the codec.
    pub keyframes_only: bool,
}

/// Lifecycle of a decode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Backend chosen, nothing opened yet.
    Created,
    /// Container open, metadata known.
    Opened,
    /// Computing the frame plan.
    Planning,
    /// Frames are being produced.
    Streaming,
    /// Every planned frame was produced (or reported missing).
    Completed,
    /// Stopped by the cancel check.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl DecodeState {
    /// Returns `true` for states that release the container.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DecodeState::Completed | DecodeState::Cancelled | DecodeState::Failed
        )
    }
}

/// How a successful decode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Ran to the end of the plan.
    Completed,
    /// Stopped early by the cancel check; the frames are a prefix of the
    /// full result.
    Cancelled,
}

/// A recorded loss of fidelity.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    /// Hardware decoding was requested but software was used.
    SoftwareFallback {
        /// Why the hardware path was not used.
        reason: String,
    },
    /// The container has no frame rate; one frame per second was assumed.
    UnknownFrameRate,
    /// The frame count was derived from duration and frame rate.
    EstimatedFrameCount,
    /// Planned frames the stream did not deliver.
    MissingFrames {
        /// Number of planned frames not produced.
        count: u64,
    },
    /// A filter expression was set but the backend cannot run it.
    FilterIgnored,
    /// Keyframes-only decoding was requested but the backend cannot do it.
    KeyframesOnlyIgnored,
}

impl Display for Degradation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Degradation::SoftwareFallback { reason } => {
                write!(f, "fell back to software decoding ({reason})")
            }
            Degradation::UnknownFrameRate => f.write_str("unknown frame rate, assumed 1 fps"),
            Degradation::EstimatedFrameCount => f.write_str("frame count estimated from duration"),
            Degradation::MissingFrames { count } => write!(f, "{count} planned frame(s) missing"),
            Degradation::FilterIgnored => f.write_str("filter expression ignored"),
            Degradation::KeyframesOnlyIgnored => f.write_str("keyframes-only option ignored"),
        }
    }
}

/// Result of a decode call.
#[derive(Debug, Clone)]
#[must_use]
pub struct DecodeOutput {
    /// Frames in strictly increasing source order.
    pub frames: Vec<DecodedFrame>,
    /// Whether the plan ran to completion.
    pub status: DecodeStatus,
    /// Metadata of the decoded stream.
    pub metadata: StreamMetadata,
    /// Everything that lowered the fidelity of the result.
    pub degradations: Vec<Degradation>,
}

impl DecodeOutput {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frame was produced.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns `true` if decoding was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status == DecodeStatus::Cancelled
    }

    /// Returns `true` if any degradation was recorded.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Source indices of the produced frames.
    pub fn source_indices(&self) -> Vec<u64> {
        self.frames.iter().map(|frame| frame.source_index).collect()
    }
}

/// A decode backend.
///
/// Implementations are stateless and shareable; every
/// [`open`](VideoBackend::open) call creates an independent session with its
/// own demuxer.
pub trait VideoBackend: Send + Sync {
    /// The selector this backend answers to.
    fn method(&self) -> DecodeMethod;

    /// Feature matrix of this backend.
    fn capabilities(&self) -> Capabilities;

    /// Returns `true` if the backend can run in this environment.
    fn is_available(&self) -> bool;

    /// Validate `config`, open `source` and read its metadata.
    ///
    /// # Errors
    ///
    /// - [`SampleError::InvalidConfig`] for contradictory settings or a
    ///   window outside the stream.
    /// - [`SampleError::UnsupportedFormat`] if the container is not
    ///   recognised.
    /// - [`SampleError::NoVideoStream`] if there is no video track.
    /// - [`SampleError::HardwareAccelUnavailable`] if a GPU was requested,
    ///   could not be used, and fallback is disabled.
    fn open<'a>(
        &self,
        source: &'a VideoSource,
        config: &DecodeConfig,
    ) -> Result<DecodeSession<'a>, SampleError>;
}

/// Backend-private frame producer driven by a [`DecodeSession`].
pub(crate) trait FramePump {
    fn metadata(&self) -> &StreamMetadata;

    /// Prepare to deliver frames for `targets`, sorted absolute source
    /// indices.
    fn start(&mut self, targets: Vec<u64>) -> Result<(), SampleError>;

    /// Decode up to the next planned frame. `None` once the plan is
    /// exhausted or the stream ends.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, SampleError>;

    /// Drain the degradations recorded since the last call.
    fn take_degradations(&mut self) -> Vec<Degradation>;
}

/// Matches decoded frames against the planned indices.
///
/// A frame fills the latest pending target at or before its index; earlier
/// targets it jumped over are counted as missing. In lenient mode (used for
/// keyframes-only decoding, where most planned indices can never be hit
/// exactly) jumped-over targets are dropped without being counted.
#[derive(Debug, Default)]
pub(crate) struct TargetCursor {
    targets: Vec<u64>,
    position: usize,
    missed: u64,
    lenient: bool,
}

impl TargetCursor {
    pub(crate) fn new(targets: Vec<u64>, lenient: bool) -> Self {
        Self {
            targets,
            position: 0,
            missed: 0,
            lenient,
        }
    }

    /// Next target still waiting for a frame.
    pub(crate) fn pending(&self) -> Option<u64> {
        self.targets.get(self.position).copied()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.position >= self.targets.len()
    }

    /// Offer a decoded frame. Returns `true` if it fills a target and should
    /// be emitted.
    pub(crate) fn offer(&mut self, index: u64) -> bool {
        match self.pending() {
            Some(target) if index >= target => {}
            _ => return false,
        }

        while let Some(&next) = self.targets.get(self.position + 1) {
            if next > index {
                break;
            }
            if !self.lenient {
                self.missed += 1;
            }
            self.position += 1;
        }
        self.position += 1;
        true
    }

    /// Returns `true` if `index` lies within `radius` frames of the pending
    /// target.
    pub(crate) fn is_near(&self, index: u64, radius: u64) -> bool {
        self.pending()
            .is_some_and(|target| target.abs_diff(index) <= radius)
    }

    /// Count every remaining target as missing and return the total missed.
    pub(crate) fn finish(&mut self) -> u64 {
        if !self.lenient {
            self.missed += (self.targets.len() - self.position.min(self.targets.len())) as u64;
        }
        self.position = self.targets.len();
        std::mem::take(&mut self.missed)
    }
}

/// Apply the hardware fallback policy for a backend without a GPU path.
pub(crate) fn software_only_policy(
    config: &DecodeConfig,
    method: DecodeMethod,
    degradations: &mut Vec<Degradation>,
) -> Result<(), SampleError> {
    let Some(gpu_id) = config.gpu_id() else {
        return Ok(());
    };

    let reason = format!("the {method} backend has no hardware decode path (GPU {gpu_id})");
    fallback_or_fail(config, reason, degradations)
}

/// Record a software fallback, or fail if the configuration forbids it.
pub(crate) fn fallback_or_fail(
    config: &DecodeConfig,
    reason: String,
    degradations: &mut Vec<Degradation>,
) -> Result<(), SampleError> {
    if !config.auto_fallback_to_software() {
        return Err(SampleError::HardwareAccelUnavailable(reason));
    }
    log::warn!("Hardware decoding unavailable, using software: {reason}");
    degradations.push(Degradation::SoftwareFallback { reason });
    Ok(())
}

/// Record options the backend cannot honour.
pub(crate) fn note_ignored_options(
    config: &DecodeConfig,
    capabilities: Capabilities,
    method: DecodeMethod,
    degradations: &mut Vec<Degradation>,
) {
    if config.filter_expression().is_some() && !capabilities.filter_passthrough {
        log::warn!("The {method} backend cannot run filters; ignoring the filter expression");
        degradations.push(Degradation::FilterIgnored);
    }
    if config.keyframes_only() && !capabilities.keyframes_only {
        log::warn!("The {method} backend decodes every frame; ignoring keyframes-only");
        degradations.push(Degradation::KeyframesOnlyIgnored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_is_case_insensitive() {
        assert_eq!("NATIVE".parse::<DecodeMethod>().unwrap(), DecodeMethod::Native);
        assert_eq!(" Frame_Grab ".parse::<DecodeMethod>().unwrap(), DecodeMethod::FrameGrab);
        assert_eq!("codec".parse::<DecodeMethod>().unwrap(), DecodeMethod::Codec);
        assert!(matches!(
            "gstreamer".parse::<DecodeMethod>(),
            Err(SampleError::InvalidConfig(_))
        ));
        for method in DecodeMethod::CONCRETE {
            assert_eq!(method.to_string().parse::<DecodeMethod>().unwrap(), method);
        }
    }

    #[test]
    fn cursor_fills_exact_targets() {
        let mut cursor = TargetCursor::new(vec![2, 5], false);
        assert!(!cursor.offer(0));
        assert!(!cursor.offer(1));
        assert!(cursor.offer(2));
        assert!(!cursor.offer(3));
        assert!(cursor.offer(5));
        assert!(cursor.is_finished());
        assert_eq!(cursor.finish(), 0);
    }

    #[test]
    fn cursor_counts_jumped_targets() {
        let mut cursor = TargetCursor::new(vec![2, 3, 4, 9], false);
        assert!(cursor.offer(4));
        assert_eq!(cursor.pending(), Some(9));
        assert_eq!(cursor.finish(), 3);
    }

    #[test]
    fn lenient_cursor_drops_jumped_targets() {
        let mut cursor = TargetCursor::new(vec![2, 3, 4, 9], true);
        assert!(cursor.offer(4));
        assert_eq!(cursor.finish(), 0);
    }

    #[test]
    fn nearness_is_measured_against_the_pending_target() {
        let cursor = TargetCursor::new(vec![10], false);
        assert!(cursor.is_near(9, 1));
        assert!(cursor.is_near(11, 1));
        assert!(!cursor.is_near(12, 1));
    }

    #[test]
    fn fallback_policy_follows_configuration() {
        let mut degradations = Vec::new();
        let config = DecodeConfig::new().with_gpu(0);
        software_only_policy(&config, DecodeMethod::Native, &mut degradations).unwrap();
        assert!(matches!(degradations[0], Degradation::SoftwareFallback { .. }));

        let strict = config.with_software_fallback(false);
        assert!(matches!(
            software_only_policy(&strict, DecodeMethod::Native, &mut Vec::new()),
            Err(SampleError::HardwareAccelUnavailable(_))
        ));
    }
}

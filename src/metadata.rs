//! Stream metadata types.
//!
//! [`StreamMetadata`] describes the video track a decode session operates on
//! and is reported by every backend right after opening. [`VideoInfo`] is the
//! broader probe record returned by [`MediaProbe`](crate::MediaProbe), with
//! one [`StreamInfo`] per container stream.

/// Metadata for the video track of an opened source.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    /// Native frame rate. `0.0` when the container does not say.
    pub source_fps: f64,
    /// Frames in the track. May be estimated from duration and frame rate,
    /// see [`frame_count_estimated`](StreamMetadata::frame_count_estimated).
    pub total_frames: u64,
    /// `true` when `total_frames` was derived rather than read from the
    /// container index.
    pub frame_count_estimated: bool,
    /// Track duration in seconds (container duration when the track has
    /// none).
    pub duration_seconds: f64,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Decoder name (e.g. `"h264"`, `"hevc"`, `"vp9"`).
    pub codec_name: String,
    /// Decoder output pixel format (e.g. `"yuv420p"`).
    pub pixel_format: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub container_format: String,
    /// Presentation time of the first frame, in seconds.
    pub start_time_seconds: f64,
}

impl StreamMetadata {
    /// Returns `true` when the container reported a usable frame rate.
    pub fn has_known_frame_rate(&self) -> bool {
        self.source_fps.is_finite() && self.source_fps > 0.0
    }

    /// Frame rate used for index/time conversions.
    ///
    /// Falls back to one frame per second when the rate is unknown, matching
    /// the planner's fallback.
    pub fn effective_fps(&self) -> f64 {
        if self.has_known_frame_rate() {
            self.source_fps
        } else {
            1.0
        }
    }

    /// Duration of a single frame in seconds.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.effective_fps()
    }
}

/// Kind of a container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video track.
    Video,
    /// Audio track.
    Audio,
    /// Subtitle track.
    Subtitle,
    /// Data / timed metadata track.
    Data,
    /// Attachments and unknown media types.
    Other,
}

impl StreamKind {
    /// Lowercase name used in text and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "subtitle",
            StreamKind::Data => "data",
            StreamKind::Other => "other",
        }
    }
}

/// One stream of a probed container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Zero-based stream index in the container.
    pub index: usize,
    /// Media type.
    pub kind: StreamKind,
    /// Codec name, or `"unknown"`.
    pub codec: String,
    /// Width (video only).
    pub width: Option<u32>,
    /// Height (video only).
    pub height: Option<u32>,
    /// Pixel format (video only).
    pub pixel_format: Option<String>,
    /// Frame rate (video only).
    pub frames_per_second: Option<f64>,
    /// Frame count from the container index, if present.
    pub frame_count: Option<u64>,
    /// Sample rate in Hz (audio only).
    pub sample_rate: Option<u32>,
    /// Channel count (audio only).
    pub channels: Option<u16>,
    /// Language tag, if present.
    pub language: Option<String>,
}

/// Probe record for a whole source.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoInfo {
    /// Container format name.
    pub format: String,
    /// Container duration in seconds.
    pub duration_seconds: f64,
    /// Container bit rate in bits per second, when known.
    pub bit_rate: Option<u64>,
    /// Metadata of the best video track, if any.
    pub video: Option<StreamMetadata>,
    /// Codec of the best audio track, if any.
    pub audio_codec: Option<String>,
    /// Every stream in container order.
    pub streams: Vec<StreamInfo>,
}

impl VideoInfo {
    /// Returns `true` if the source carries a video track.
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Returns `true` if the source carries an audio track.
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

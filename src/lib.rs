//! # vidsample
//!
//! Deterministic frame sampling from in-memory video.
//!
//! `vidsample` takes the encoded bytes of a video, picks a reproducible set
//! of frame indices for a target frame rate, decodes only those frames,
//! resizes them to a pixel budget aligned to a patch grid, and can re-encode
//! the result into a clip whose timestamps reproduce the selection exactly.
//! Decoding is powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Sample Frames
//!
//! ```no_run
//! use vidsample::{DecodeConfig, DecodeMethod, FrameSampler, VideoSource};
//!
//! let source = VideoSource::from_path("input.mp4").unwrap();
//! let sampler = FrameSampler::new(DecodeMethod::Auto, DecodeConfig::new().with_target_fps(2.0));
//! let output = sampler.sample(&source).unwrap();
//! output.frames[0].image.save("first.png").unwrap();
//! ```
//!
//! ### Plan Without Decoding
//!
//! ```
//! use vidsample::plan_frame_indices;
//!
//! let plan = plan_frame_indices(125, 24.0, 0.5, None);
//! assert_eq!(plan.as_slice(), &[0, 41, 83, 124]);
//! ```
//!
//! ### Stream in Batches
//!
//! ```no_run
//! use vidsample::{DecodeConfig, DecodeMethod, FrameSampler, VideoSource};
//!
//! let source = VideoSource::from_path("input.mp4").unwrap();
//! let sampler = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new());
//! for batch in sampler.sample_batches(&source, 16).unwrap() {
//!     println!("{} frames", batch.unwrap().len());
//! }
//! ```
//!
//! ### Re-encode a Selection
//!
//! ```no_run
//! use vidsample::{DecodeConfig, DecodeMethod, FrameSampler, VideoSource};
//!
//! let source = VideoSource::from_path("input.mp4").unwrap();
//! let sampler = FrameSampler::new(DecodeMethod::Auto, DecodeConfig::new().with_target_fps(1.0));
//! sampler.sample_to_clip(&source).unwrap().save("sampled.mp4").unwrap();
//! ```
//!
//! ## Backends
//!
//! | Method | Input | Seek | GPU | Filters | Keyframes only |
//! |--------|-------|------|-----|---------|----------------|
//! | `native` | memory | no | no | no | no |
//! | `frame-grab` | temp file | no | no | no | no |
//! | `codec` | memory | yes | `hardware` feature | yes | yes |
//!
//! `auto` picks `codec` when the configuration needs one of its
//! capabilities and `native` otherwise. Options a backend cannot honour are
//! reported as [`Degradation`]s rather than silently dropped.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | [`decode_many`] samples several sources in parallel |
//! | `hardware` | Hardware-accelerated decoding (CUDA, VAAPI, DXVA2, D3D11VA, VideoToolbox, QSV) |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

mod batches;
pub mod codec_decoder;
pub mod configuration;
mod conversion;
pub mod decoder;
pub mod decoder_factory;
mod demuxer;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod filter;
pub mod frame;
pub mod frame_grab_decoder;
#[cfg(feature = "hardware")]
pub mod hardware_acceleration;
mod io;
pub mod metadata;
pub mod native_decoder;
#[cfg(feature = "rayon")]
mod parallel;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod resize;
pub mod sampler;
mod session;
pub mod source;

pub use batches::FrameBatches;
pub use codec_decoder::{CodecBackend, SEEK_GAP_FRAMES};
pub use configuration::{DecodeConfig, FrameWindow, TimeRange};
pub use decoder::{
    Capabilities, DecodeMethod, DecodeOutput, DecodeState, DecodeStatus, Degradation,
    VideoBackend,
};
pub use decoder_factory::DecoderFactory;
pub use encode::{
    ContainerFormat, EncodedVideoBuffer, FrameReEncoder, NOMINAL_FRAME_RATE, ReEncodeOptions,
    VideoCodec,
};
pub use error::SampleError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use filter::{FilterChain, TransposeDirection, validate_filter_expression};
pub use frame::{DecodedFrame, FrameImageFormat};
pub use frame_grab_decoder::FrameGrabBackend;
#[cfg(feature = "hardware")]
pub use hardware_acceleration::{HardwareDeviceType, available_hardware_devices};
pub use metadata::{StreamInfo, StreamKind, StreamMetadata, VideoInfo};
pub use native_decoder::NativeBackend;
#[cfg(feature = "rayon")]
pub use parallel::decode_many;
pub use planner::{FRAME_FACTOR, FrameIndexPlan, plan_frame_indices};
pub use probe::MediaProbe;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use resize::{PATCH_SIZE, ResizeBounds, resize_image, smart_resize};
pub use sampler::FrameSampler;
pub use session::DecodeSession;
pub use source::VideoSource;

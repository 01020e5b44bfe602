//! FFmpeg library setup and log level control.
//!
//! FFmpeg logs to stderr through its own system, independent of the Rust
//! [`log`](https://crates.io/crates/log) facade used by this crate. Decoding
//! damaged streams can make it very chatty, so callers usually lower the
//! level once at startup.
//!
//! # Example
//!
//! ```no_run
//! use vidsample::FfmpegLogLevel;
//!
//! vidsample::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! assert_eq!(vidsample::get_ffmpeg_log_level(), Some(FfmpegLogLevel::Error));
//! ```

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::SampleError;

/// FFmpeg internal log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// No output.
    Quiet,
    /// Conditions that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl From<Level> for FfmpegLogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set FFmpeg's own log verbosity. Does not affect `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// Current FFmpeg log verbosity, or `None` if FFmpeg reports a level outside
/// the known set.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from)
}

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise the FFmpeg libraries. Safe to call from any thread, any number
/// of times.
pub(crate) fn initialize() -> Result<(), SampleError> {
    INIT.get_or_init(|| {
        ffmpeg_next::init().map_err(|error| {
            log::error!("FFmpeg initialisation failed: {error}");
            error.to_string()
        })
    })
    .clone()
    .map_err(SampleError::FfmpegError)
}

//! Frame-grab backend.
//!
//! Writes the source to a temporary file and lets FFmpeg open it by path.
//! Useful for containers whose demuxers probe better with a real file (or
//! need to reopen it), at the cost of a disk round trip. Decoding itself
//! follows the native backend's sequential counting.

use std::io::Write;

use tempfile::NamedTempFile;

use crate::configuration::DecodeConfig;
use crate::decoder::{
    Capabilities, DecodeMethod, VideoBackend, note_ignored_options, software_only_policy,
};
use crate::demuxer::{InputHandle, VideoDemuxer};
use crate::error::SampleError;
use crate::native_decoder::SequentialPump;
use crate::session::DecodeSession;
use crate::source::VideoSource;

/// Decodes through a temporary file on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameGrabBackend;

impl FrameGrabBackend {
    const CAPABILITIES: Capabilities = Capabilities {
        memory_only_input: false,
        precise_seek: false,
        hardware_decode: false,
        streaming_batches: true,
        filter_passthrough: false,
        keyframes_only: false,
    };

    fn spill(source: &VideoSource) -> Result<NamedTempFile, SampleError> {
        let mut file = tempfile::Builder::new()
            .prefix("vidsample-")
            .suffix(".bin")
            .tempfile()?;
        file.write_all(source.as_bytes())?;
        file.flush()?;
        log::debug!(
            "Spilled {} byte(s) to {}",
            source.len(),
            file.path().display()
        );
        Ok(file)
    }
}

impl VideoBackend for FrameGrabBackend {
    fn method(&self) -> DecodeMethod {
        DecodeMethod::FrameGrab
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn is_available(&self) -> bool {
        crate::ffmpeg::initialize().is_ok() && tempfile::tempfile().is_ok()
    }

    fn open<'a>(
        &self,
        source: &'a VideoSource,
        config: &DecodeConfig,
    ) -> Result<DecodeSession<'a>, SampleError> {
        config.validate()?;
        crate::ffmpeg::initialize()?;

        let mut degradations = Vec::new();
        software_only_policy(config, self.method(), &mut degradations)?;
        note_ignored_options(config, Self::CAPABILITIES, self.method(), &mut degradations);

        if source.is_empty() {
            return Err(SampleError::UnsupportedFormat(
                "empty input buffer".to_string(),
            ));
        }

        let file = Self::spill(source)?;
        let path = file.path().to_path_buf();
        let input = ffmpeg_next::format::input(&path).map_err(|error| {
            SampleError::UnsupportedFormat(format!("unrecognised container: {error}"))
        })?;
        let demuxer = VideoDemuxer::open(
            InputHandle::File { input, _file: file },
            config.thread_count(),
        )?;

        DecodeSession::open(
            self.method(),
            Self::CAPABILITIES,
            config,
            Box::new(SequentialPump::new(demuxer)),
            degradations,
        )
    }
}

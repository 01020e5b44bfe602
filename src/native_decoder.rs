//! Container-native backend.
//!
//! Demuxes and decodes straight from memory in software. Frames are indexed
//! by their position in decode output, so no timestamp arithmetic is needed
//! and variable-frame-rate sources are indexed the same way the planner
//! counts them. Frames outside the plan are decoded (the codec needs them as
//! references) but never converted to images.

use crate::conversion::{FrameConverter, frame_index_to_seconds};
use crate::configuration::DecodeConfig;
use crate::decoder::{
    Capabilities, DecodeMethod, Degradation, FramePump, TargetCursor, VideoBackend,
    note_ignored_options, software_only_policy,
};
use crate::demuxer::{InputHandle, Pulled, VideoDemuxer};
use crate::error::SampleError;
use crate::frame::DecodedFrame;
use crate::io::MemoryInput;
use crate::metadata::StreamMetadata;
use crate::session::DecodeSession;
use crate::source::VideoSource;

/// Decodes in memory, counting frames sequentially.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    const CAPABILITIES: Capabilities = Capabilities {
        memory_only_input: true,
        precise_seek: false,
        hardware_decode: false,
        streaming_batches: true,
        filter_passthrough: false,
        keyframes_only: false,
    };
}

impl VideoBackend for NativeBackend {
    fn method(&self) -> DecodeMethod {
        DecodeMethod::Native
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn is_available(&self) -> bool {
        crate::ffmpeg::initialize().is_ok()
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

        let input = MemoryInput::open(source.as_bytes())?;
        let demuxer = VideoDemuxer::open(InputHandle::Memory(input), config.thread_count())?;
        let pump = SequentialPump::new(demuxer);

        DecodeSession::open(
            self.method(),
            Self::CAPABILITIES,
            config,
            Box::new(pump),
            degradations,
        )
    }
}

/// Feeds planned frames by counting decoder output.
///
/// Shared by the backends without seek support.
pub(crate) struct SequentialPump<'a> {
    demuxer: VideoDemuxer<'a>,
    converter: FrameConverter,
    cursor: TargetCursor,
    decoded: u64,
    degradations: Vec<Degradation>,
}

impl<'a> SequentialPump<'a> {
    pub(crate) fn new(demuxer: VideoDemuxer<'a>) -> Self {
        Self {
            demuxer,
            converter: FrameConverter::new(),
            cursor: TargetCursor::default(),
            decoded: 0,
            degradations: Vec::new(),
        }
    }

    fn record_missing(&mut self) {
        let missing = self.cursor.finish();
        if missing > 0 {
            log::warn!("Stream ended before {missing} planned frame(s) could be decoded");
            self.degradations
                .push(Degradation::MissingFrames { count: missing });
        }
    }
}

impl FramePump for SequentialPump<'_> {
    fn metadata(&self) -> &StreamMetadata {
        self.demuxer.metadata()
    }

    fn start(&mut self, targets: Vec<u64>) -> Result<(), SampleError> {
        self.cursor = TargetCursor::new(targets, false);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, SampleError> {
        let fps = self.demuxer.metadata().effective_fps();

        while !self.cursor.is_finished() {
            match self.demuxer.pull()? {
                Pulled::Frame(frame) => {
                    let index = self.decoded;
                    self.decoded += 1;
                    if !self.cursor.offer(index) {
                        continue;
                    }

                    let timestamp = self
                        .demuxer
                        .frame_seconds(&frame)
                        .unwrap_or_else(|| frame_index_to_seconds(index, fps))
                        .max(0.0);
                    let image = self.converter.to_image(&frame)?;
                    return Ok(Some(DecodedFrame {
                        source_index: index,
                        timestamp,
                        image,
                        is_keyframe: frame.is_key(),
                    }));
                }
                Pulled::Corrupt {
                    approx_index,
                    message,
                } => {
                    let index = approx_index.unwrap_or(self.decoded);
                    if self.cursor.is_near(index, 1) {
                        return Err(SampleError::DecodeFailure {
                            frame_index: index,
                            reason: message,
                        });
                    }
                    log::warn!("Skipping corrupt data near frame {index}: {message}");
                    // A rejected packet still occupies its slot in the stream.
                    if let Some(skipped) = approx_index {
                        self.decoded = self.decoded.max(skipped + 1);
                    }
                }
                Pulled::End => break,
            }
        }

        self.record_missing();
        Ok(None)
    }

    fn take_degradations(&mut self) -> Vec<Degradation> {
        std::mem::take(&mut self.degradations)
    }
}

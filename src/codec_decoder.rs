//! Codec backend.
//!
//! The most capable backend. Frames are indexed by presentation timestamp,
//! which lets it seek: to the start of the window, and again whenever the
//! next planned frame is more than [`SEEK_GAP_FRAMES`] ahead of the decode
//! position. It also decodes on a GPU (with the `hardware` feature), runs
//! geometric filters, and can tell the codec to drop non-key frames.
//!
//! A GPU that cannot be initialised, or whose first frame cannot be copied
//! back to system memory, triggers the software fallback policy.

use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_sys_next::AVDiscard;

use crate::configuration::DecodeConfig;
use crate::conversion::{FrameConverter, frame_index_to_seconds, seconds_to_frame_index};
use crate::decoder::{
    Capabilities, DecodeMethod, Degradation, FramePump, TargetCursor, VideoBackend,
    fallback_or_fail,
};
use crate::demuxer::{InputHandle, Pulled, VideoDemuxer, open_software_decoder};
use crate::error::SampleError;
use crate::filter::GeometricFilter;
use crate::frame::DecodedFrame;
use crate::io::MemoryInput;
use crate::metadata::StreamMetadata;
use crate::session::DecodeSession;
use crate::source::VideoSource;

/// Planned frames further ahead than this are reached by seeking rather
/// than decoding through the gap.
pub const SEEK_GAP_FRAMES: u64 = 30;

/// Timestamp-indexed decoding with seek, hardware, filter and keyframe
/// support.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecBackend;

impl CodecBackend {
    const CAPABILITIES: Capabilities = Capabilities {
        memory_only_input: true,
        precise_seek: true,
        hardware_decode: cfg!(feature = "hardware"),
        streaming_batches: true,
        filter_passthrough: true,
        keyframes_only: true,
    };
}

impl VideoBackend for CodecBackend {
    fn method(&self) -> DecodeMethod {
        DecodeMethod::Codec
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

        let input = MemoryInput::open(source.as_bytes())?;
        let mut demuxer = VideoDemuxer::open(InputHandle::Memory(input), config.thread_count())?;

        let mut degradations = Vec::new();
        let hardware = match config.gpu_id() {
            Some(gpu_id) => enable_hardware(&mut demuxer, gpu_id, config, &mut degradations)?,
            None => false,
        };

        if config.keyframes_only() {
            skip_non_key_frames(&mut demuxer);
        }

        let filter = config
            .filter_expression()
            .map(|expression| GeometricFilter::new(expression, demuxer.time_base()))
            .transpose()?;

        log::debug!(
            "Codec backend ready (hardware: {hardware}, filter: {}, keyframes only: {})",
            filter.is_some(),
            config.keyframes_only()
        );

        let pump = CodecPump {
            demuxer,
            converter: FrameConverter::new(),
            filter,
            cursor: TargetCursor::default(),
            hardware,
            thread_count: config.thread_count(),
            keyframes_only: config.keyframes_only(),
            allow_fallback: config.auto_fallback_to_software(),
            last_index: None,
            seeked_for: None,
            emitted: 0,
            dropped: 0,
            degradations: Vec::new(),
        };

        DecodeSession::open(
            self.method(),
            Self::CAPABILITIES,
            config,
            Box::new(pump),
            degradations,
        )
    }
}

#[cfg(feature = "hardware")]
fn enable_hardware(
    demuxer: &mut VideoDemuxer<'_>,
    gpu_id: u32,
    config: &DecodeConfig,
    degradations: &mut Vec<Degradation>,
) -> Result<bool, SampleError> {
    use crate::hardware_acceleration::open_hardware_decoder;

    match open_hardware_decoder(demuxer.parameters(), gpu_id, config.thread_count()) {
        Ok(hardware) => {
            log::debug!("Decoding on {} device", hardware.device);
            demuxer.replace_decoder(hardware.decoder);
            Ok(true)
        }
        Err(SampleError::HardwareAccelUnavailable(reason)) => {
            fallback_or_fail(config, reason, degradations)?;
            Ok(false)
        }
        Err(error) => Err(error),
    }
}

#[cfg(not(feature = "hardware"))]
fn enable_hardware(
    _demuxer: &mut VideoDemuxer<'_>,
    gpu_id: u32,
    config: &DecodeConfig,
    degradations: &mut Vec<Degradation>,
) -> Result<bool, SampleError> {
    let reason = format!("built without the `hardware` feature (GPU {gpu_id} requested)");
    fallback_or_fail(config, reason, degradations)?;
    Ok(false)
}

fn skip_non_key_frames(demuxer: &mut VideoDemuxer<'_>) {
    unsafe {
        (*demuxer.decoder_mut().as_mut_ptr()).skip_frame = AVDiscard::AVDISCARD_NONKEY;
    }
}

struct CodecPump<'a> {
    demuxer: VideoDemuxer<'a>,
    converter: FrameConverter,
    filter: Option<GeometricFilter>,
    cursor: TargetCursor,
    #[cfg_attr(not(feature = "hardware"), allow(dead_code))]
    hardware: bool,
    thread_count: Option<usize>,
    keyframes_only: bool,
    #[cfg_attr(not(feature = "hardware"), allow(dead_code))]
    allow_fallback: bool,
    last_index: Option<u64>,
    seeked_for: Option<u64>,
    #[cfg_attr(not(feature = "hardware"), allow(dead_code))]
    emitted: u64,
    dropped: u64,
    degradations: Vec<Degradation>,
}

impl CodecPump<'_> {
    fn seek_to(&mut self, target: u64) {
        let seconds = frame_index_to_seconds(target, self.demuxer.metadata().effective_fps());
        match self.demuxer.seek(seconds) {
            Ok(()) => {
                self.last_index = None;
                self.seeked_for = Some(target);
            }
            Err(error) => {
                log::debug!("Seek to frame {target} failed, decoding forward: {error}");
                self.seeked_for = Some(target);
            }
        }
    }

    fn should_seek(&self, target: u64) -> bool {
        self.seeked_for != Some(target)
            && self
                .last_index
                .is_some_and(|last| target > last + SEEK_GAP_FRAMES)
    }

    fn frame_index(&self, seconds: Option<f64>) -> u64 {
        match seconds {
            Some(seconds) => {
                seconds_to_frame_index(seconds, 0.0, self.demuxer.metadata().effective_fps())
            }
            None => self.last_index.map_or(0, |last| last + 1),
        }
    }

    /// Bring a frame into system memory. `None` means the decoder was
    /// replaced and decoding restarts.
    #[cfg(feature = "hardware")]
    fn to_system_memory(&mut self, frame: VideoFrame) -> Result<Option<VideoFrame>, SampleError> {
        use crate::hardware_acceleration::transfer_hardware_frame;

        if !self.hardware {
            return Ok(Some(frame));
        }
        match transfer_hardware_frame(&frame) {
            Ok(Some(software)) => Ok(Some(software)),
            Ok(None) => Ok(Some(frame)),
            Err(error) if self.emitted == 0 => {
                if !self.allow_fallback {
                    return Err(SampleError::HardwareAccelUnavailable(error.to_string()));
                }
                self.switch_to_software(error.to_string())?;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    #[cfg(not(feature = "hardware"))]
    fn to_system_memory(&mut self, frame: VideoFrame) -> Result<Option<VideoFrame>, SampleError> {
        Ok(Some(frame))
    }

    #[cfg_attr(not(feature = "hardware"), allow(dead_code))]
    fn switch_to_software(&mut self, reason: String) -> Result<(), SampleError> {
        log::warn!("Hardware decoding failed, restarting in software: {reason}");
        self.degradations
            .push(Degradation::SoftwareFallback { reason });

        let decoder = open_software_decoder(self.demuxer.parameters(), self.thread_count)?;
        self.demuxer.replace_decoder(decoder);
        if self.keyframes_only {
            skip_non_key_frames(&mut self.demuxer);
        }
        self.hardware = false;

        let restart = self.cursor.pending().unwrap_or(0);
        self.seeked_for = None;
        self.seek_to(restart);
        Ok(())
    }

    fn finish(&mut self) -> Option<DecodedFrame> {
        let missing = self.cursor.finish() + std::mem::take(&mut self.dropped);
        if missing > 0 {
            log::warn!("{missing} planned frame(s) could not be decoded");
            self.degradations
                .push(Degradation::MissingFrames { count: missing });
        }
        None
    }
}

impl FramePump for CodecPump<'_> {
    fn metadata(&self) -> &StreamMetadata {
        self.demuxer.metadata()
    }

    fn start(&mut self, targets: Vec<u64>) -> Result<(), SampleError> {
        self.cursor = TargetCursor::new(targets, self.keyframes_only);
        if let Some(first) = self.cursor.pending().filter(|&first| first > 0) {
            self.seek_to(first);
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, SampleError> {
        let fps = self.demuxer.metadata().effective_fps();

        while let Some(target) = self.cursor.pending() {
            if self.should_seek(target) {
                self.seek_to(target);
            }

            match self.demuxer.pull()? {
                Pulled::Frame(frame) => {
                    let seconds = self.demuxer.frame_seconds(&frame);
                    let index = self.frame_index(seconds);
                    self.last_index = Some(index);
                    if index < target {
                        continue;
                    }

                    let is_keyframe = frame.is_key();
                    let Some(frame) = self.to_system_memory(frame)? else {
                        continue;
                    };
                    if !self.cursor.offer(index) {
                        continue;
                    }

                    let frame = match self.filter.as_mut() {
                        Some(filter) => match filter.apply(&frame)? {
                            Some(filtered) => filtered,
                            None => {
                                self.dropped += 1;
                                continue;
                            }
                        },
                        None => frame,
                    };

                    let image = self.converter.to_image(&frame)?;
                    self.emitted += 1;
                    return Ok(Some(DecodedFrame {
                        source_index: index,
                        timestamp: seconds
                            .unwrap_or_else(|| frame_index_to_seconds(index, fps))
                            .max(0.0),
                        image,
                        is_keyframe,
                    }));
                }
                Pulled::Corrupt {
                    approx_index,
                    message,
                } => {
                    let index = approx_index
                        .or_else(|| self.last_index.map(|last| last + 1))
                        .unwrap_or(target);
                    if self.cursor.is_near(index, 1) {
                        return Err(SampleError::DecodeFailure {
                            frame_index: index,
                            reason: message,
                        });
                    }
                    log::warn!("Skipping corrupt data near frame {index}: {message}");
                }
                Pulled::End => break,
            }
        }

        Ok(self.finish())
    }

    fn take_degradations(&mut self) -> Vec<Degradation> {
        std::mem::take(&mut self.degradations)
    }
}

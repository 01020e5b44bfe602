//! Shared demux/decode loop.
//!
//! [`VideoDemuxer`] owns an opened container, the best video stream, and a
//! decoder for it. Backends pull decoded frames one at a time with
//! [`pull`](VideoDemuxer::pull); packets from other streams are skipped and
//! the decoder is drained at end of stream.

use std::ffi::c_int;

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{Parameters, context::Context as CodecContext},
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
};
use tempfile::NamedTempFile;

use crate::conversion::{pts_to_seconds, seconds_to_frame_index, seconds_to_seek_timestamp};
use crate::error::SampleError;
use crate::io::MemoryInput;
use crate::metadata::StreamMetadata;

/// Consecutive demuxer read errors tolerated before the stream is treated
/// as ended.
const MAX_READ_ERRORS: u32 = 16;

/// An opened container, from memory or from a file on disk.
pub(crate) enum InputHandle<'a> {
    Memory(MemoryInput<'a>),
    File {
        input: Input,
        // Declared after `input` so the container closes before the file
        // is deleted.
        _file: NamedTempFile,
    },
}

impl InputHandle<'_> {
    fn input(&self) -> &Input {
        match self {
            InputHandle::Memory(input) => &**input,
            InputHandle::File { input, .. } => input,
        }
    }

    fn input_mut(&mut self) -> &mut Input {
        match self {
            InputHandle::Memory(input) => &mut **input,
            InputHandle::File { input, .. } => input,
        }
    }
}

/// One step of the pull loop.
pub(crate) enum Pulled {
    Frame(VideoFrame),
    /// A packet or frame failed to decode. `approx_index` is the frame
    /// index the damaged data belongs to, as far as it can be told.
    Corrupt {
        approx_index: Option<u64>,
        message: String,
    },
    End,
}

pub(crate) struct VideoDemuxer<'a> {
    input: InputHandle<'a>,
    stream_index: usize,
    time_base: Rational,
    parameters: Parameters,
    decoder: VideoDecoder,
    metadata: StreamMetadata,
    eof_sent: bool,
    read_errors: u32,
}

impl<'a> VideoDemuxer<'a> {
    /// Locate the best video stream and open a software decoder for it.
    pub(crate) fn open(
        input: InputHandle<'a>,
        thread_count: Option<usize>,
    ) -> Result<Self, SampleError> {
        let context = input.input();
        let stream = context
            .streams()
            .best(Type::Video)
            .ok_or(SampleError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let parameters = stream.parameters().clone();

        let decoder = open_software_decoder(parameters.clone(), thread_count)?;
        let metadata = read_metadata(context, stream_index, &decoder)?;

        log::debug!(
            "Opened {} stream #{stream_index} in {}: {}x{} @ {:.3} fps, {} frames{}",
            metadata.codec_name,
            metadata.container_format,
            metadata.width,
            metadata.height,
            metadata.source_fps,
            metadata.total_frames,
            if metadata.frame_count_estimated { " (estimated)" } else { "" }
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            parameters,
            decoder,
            metadata,
            eof_sent: false,
            read_errors: 0,
        })
    }

    pub(crate) fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub(crate) fn time_base(&self) -> Rational {
        self.time_base
    }

    pub(crate) fn parameters(&self) -> Parameters {
        self.parameters.clone()
    }

    pub(crate) fn decoder_mut(&mut self) -> &mut VideoDecoder {
        &mut self.decoder
    }

    /// Swap in another decoder for the same stream (e.g. a hardware one).
    pub(crate) fn replace_decoder(&mut self, decoder: VideoDecoder) {
        self.decoder = decoder;
    }

    /// Presentation time of a frame in seconds from the stream start, if it
    /// carries a timestamp.
    pub(crate) fn frame_seconds(&self, frame: &VideoFrame) -> Option<f64> {
        frame
            .timestamp()
            .or_else(|| frame.pts())
            .map(|pts| pts_to_seconds(pts, self.time_base) - self.metadata.start_time_seconds)
    }

    /// Seek to the keyframe at or before `seconds` (relative to the stream
    /// start) and reset the decoder.
    pub(crate) fn seek(&mut self, seconds: f64) -> Result<(), SampleError> {
        let target = seconds_to_seek_timestamp(seconds + self.metadata.start_time_seconds);
        log::debug!("Seeking to {seconds:.3}s (ts {target})");
        self.input.input_mut().seek(target, ..target)?;
        self.decoder.flush();
        self.eof_sent = false;
        self.read_errors = 0;
        Ok(())
    }

    /// Decode until the next frame is available.
    pub(crate) fn pull(&mut self) -> Result<Pulled, SampleError> {
        let mut frame = VideoFrame::empty();

        loop {
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Pulled::Frame(frame)),
                Err(FfmpegError::Eof) => return Ok(Pulled::End),
                Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {}
                Err(error) => {
                    return Ok(Pulled::Corrupt {
                        approx_index: None,
                        message: error.to_string(),
                    });
                }
            }

            if self.eof_sent {
                return Ok(Pulled::End);
            }

            let mut packet = Packet::empty();
            match packet.read(self.input.input_mut()) {
                Ok(()) => {
                    self.read_errors = 0;
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(error) = self.decoder.send_packet(&packet) {
                        return Ok(Pulled::Corrupt {
                            approx_index: self.packet_index(&packet),
                            message: error.to_string(),
                        });
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    self.read_errors += 1;
                    if self.read_errors >= MAX_READ_ERRORS {
                        log::warn!("Giving up after {MAX_READ_ERRORS} demuxer errors: {error}");
                        self.decoder.send_eof()?;
                        self.eof_sent = true;
                    } else {
                        log::debug!("Demuxer read error: {error}");
                    }
                }
            }
        }
    }

    fn packet_index(&self, packet: &Packet) -> Option<u64> {
        let pts = packet.pts().or_else(|| packet.dts())?;
        let seconds = pts_to_seconds(pts, self.time_base);
        Some(seconds_to_frame_index(
            seconds,
            self.metadata.start_time_seconds,
            self.metadata.effective_fps(),
        ))
    }
}

/// Open a software decoder with an optional thread count.
pub(crate) fn open_software_decoder(
    parameters: Parameters,
    thread_count: Option<usize>,
) -> Result<VideoDecoder, SampleError> {
    let mut context = CodecContext::from_parameters(parameters)?;
    unsafe {
        report_corruption(context.as_mut_ptr());
        if let Some(threads) = thread_count {
            (*context.as_mut_ptr()).thread_count = clamp_thread_count(threads);
        }
    }
    context
        .decoder()
        .video()
        .map_err(|error| SampleError::UnsupportedFormat(format!("cannot open video decoder: {error}")))
}

/// Make the decoder fail on damaged bitstreams instead of concealing them,
/// so corrupt packets surface as errors next to their frame index.
///
/// # Safety
///
/// `context` must point to a valid, not yet opened codec context.
pub(crate) unsafe fn report_corruption(context: *mut ffmpeg_sys_next::AVCodecContext) {
    unsafe {
        (*context).err_recognition |= ffmpeg_sys_next::AV_EF_EXPLODE as c_int;
    }
}

pub(crate) fn clamp_thread_count(threads: usize) -> c_int {
    c_int::try_from(threads).unwrap_or(c_int::MAX)
}

pub(crate) fn rational_to_fps(rate: Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0)
        .then(|| rate.numerator() as f64 / rate.denominator() as f64)
}

pub(crate) fn read_metadata(
    context: &Input,
    stream_index: usize,
    decoder: &VideoDecoder,
) -> Result<StreamMetadata, SampleError> {
    let stream = context
        .stream(stream_index)
        .ok_or(SampleError::NoVideoStream)?;
    let time_base = stream.time_base();

    let source_fps = rational_to_fps(stream.rate())
        .or_else(|| rational_to_fps(stream.avg_frame_rate()))
        .unwrap_or(0.0);

    let duration_seconds = if stream.duration() > 0 {
        pts_to_seconds(stream.duration(), time_base)
    } else if context.duration() > 0 {
        context.duration() as f64 / f64::from(ffmpeg_sys_next::AV_TIME_BASE)
    } else {
        0.0
    };

    let start_time_seconds = match stream.start_time() {
        ffmpeg_sys_next::AV_NOPTS_VALUE => 0.0,
        start => pts_to_seconds(start, time_base).max(0.0),
    };

    let (total_frames, frame_count_estimated) = if stream.frames() > 0 {
        (stream.frames() as u64, false)
    } else if source_fps > 0.0 && duration_seconds > 0.0 {
        ((duration_seconds * source_fps).round() as u64, true)
    } else {
        (0, true)
    };

    if source_fps <= 0.0 {
        log::warn!("Stream #{stream_index} reports no frame rate");
    }

    let codec_name = decoder
        .codec()
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let pixel_format = decoder
        .format()
        .descriptor()
        .map(|descriptor| descriptor.name().to_string())
        .unwrap_or_else(|| format!("{:?}", decoder.format()).to_lowercase());

    Ok(StreamMetadata {
        source_fps,
        total_frames,
        frame_count_estimated,
        duration_seconds,
        width: decoder.width(),
        height: decoder.height(),
        codec_name,
        pixel_format,
        container_format: context.format().name().to_string(),
        start_time_seconds,
    })
}

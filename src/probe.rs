//! Lightweight media probing.
//!
//! [`MediaProbe`] opens a container, reads its stream table, and closes it
//! again without decoding any frames. Use it to inspect sources before
//! choosing a sampling configuration.

use std::path::Path;

use ffmpeg_next::{
    codec::context::Context as CodecContext, format::context::Input, media::Type,
};

use crate::demuxer::{open_software_decoder, rational_to_fps, read_metadata};
use crate::error::SampleError;
use crate::io::MemoryInput;
use crate::metadata::{StreamInfo, StreamKind, VideoInfo};
use crate::source::VideoSource;

/// Container probe.
///
/// # Example
///
/// ```no_run
/// use vidsample::MediaProbe;
///
/// let info = MediaProbe::probe_file("input.mp4")?;
/// println!("{} for {:.2}s", info.format, info.duration_seconds);
/// if let Some(video) = &info.video {
///     println!("{}x{} @ {:.3} fps", video.width, video.height, video.source_fps);
/// }
/// # Ok::<(), vidsample::SampleError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaProbe;

impl MediaProbe {
    /// Probe an in-memory source.
    ///
    /// # Errors
    ///
    /// [`SampleError::UnsupportedFormat`] if the bytes are not a recognised
    /// container.
    pub fn probe(source: &VideoSource) -> Result<VideoInfo, SampleError> {
        crate::ffmpeg::initialize()?;
        let input = MemoryInput::open(source.as_bytes())?;
        describe(&input)
    }

    /// Probe a file on disk.
    pub fn probe_file<P: AsRef<Path>>(path: P) -> Result<VideoInfo, SampleError> {
        crate::ffmpeg::initialize()?;
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SampleError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }
        let input = ffmpeg_next::format::input(&path).map_err(|error| {
            SampleError::UnsupportedFormat(format!("cannot open {}: {error}", path.display()))
        })?;
        describe(&input)
    }

    /// Probe several files. Results come back in input order; one failing
    /// file does not stop the others.
    pub fn probe_many<P: AsRef<Path>>(paths: &[P]) -> Vec<Result<VideoInfo, SampleError>> {
        paths.iter().map(Self::probe_file).collect()
    }
}

fn describe(input: &Input) -> Result<VideoInfo, SampleError> {
    let video = match input.streams().best(Type::Video) {
        Some(stream) => {
            let decoder = open_software_decoder(stream.parameters().clone(), None)?;
            Some(read_metadata(input, stream.index(), &decoder)?)
        }
        None => None,
    };

    let streams: Vec<StreamInfo> = input.streams().map(|stream| describe_stream(&stream)).collect();

    let audio_codec = input
        .streams()
        .best(Type::Audio)
        .and_then(|best| streams.iter().find(|info| info.index == best.index()))
        .map(|info| info.codec.clone());

    let duration_seconds = if input.duration() > 0 {
        input.duration() as f64 / f64::from(ffmpeg_sys_next::AV_TIME_BASE)
    } else {
        video.as_ref().map_or(0.0, |video| video.duration_seconds)
    };
    let bit_rate = (input.bit_rate() > 0).then(|| input.bit_rate() as u64);

    let info = VideoInfo {
        format: input.format().name().to_string(),
        duration_seconds,
        bit_rate,
        video,
        audio_codec,
        streams,
    };
    log::debug!(
        "Probed {} container: {} stream(s), {:.3}s",
        info.format,
        info.streams.len(),
        info.duration_seconds
    );
    Ok(info)
}

fn describe_stream(stream: &ffmpeg_next::format::stream::Stream<'_>) -> StreamInfo {
    let parameters = stream.parameters();
    let kind = match parameters.medium() {
        Type::Video => StreamKind::Video,
        Type::Audio => StreamKind::Audio,
        Type::Subtitle => StreamKind::Subtitle,
        Type::Data => StreamKind::Data,
        _ => StreamKind::Other,
    };

    let mut info = StreamInfo {
        index: stream.index(),
        kind,
        codec: codec_name(parameters.id().name()),
        width: None,
        height: None,
        pixel_format: None,
        frames_per_second: None,
        frame_count: (stream.frames() > 0).then(|| stream.frames() as u64),
        sample_rate: None,
        channels: None,
        language: stream.metadata().get("language").map(str::to_string),
    };

    let Ok(context) = CodecContext::from_parameters(parameters) else {
        return info;
    };
    match kind {
        StreamKind::Video => {
            if let Ok(video) = context.decoder().video() {
                info.width = Some(video.width());
                info.height = Some(video.height());
                info.pixel_format = video
                    .format()
                    .descriptor()
                    .map(|descriptor| descriptor.name().to_string());
            }
            info.frames_per_second =
                rational_to_fps(stream.avg_frame_rate()).or_else(|| rational_to_fps(stream.rate()));
        }
        StreamKind::Audio => {
            if let Ok(audio) = context.decoder().audio() {
                info.sample_rate = Some(audio.rate());
                info.channels = Some(audio.channels());
            }
        }
        _ => {}
    }
    info
}

fn codec_name(name: &str) -> String {
    if name.is_empty() || name == "none" {
        "unknown".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_not_a_container() {
        let source = VideoSource::from_bytes(vec![0x42; 512]);
        assert!(matches!(
            MediaProbe::probe(&source),
            Err(SampleError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let results = MediaProbe::probe_many(&["/nonexistent/vidsample/clip.mp4"]);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(SampleError::IoError(_))));
    }

    #[test]
    fn empty_codec_names_read_as_unknown() {
        assert_eq!(codec_name(""), "unknown");
        assert_eq!(codec_name("h264"), "h264");
    }
}

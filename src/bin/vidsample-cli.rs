use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use vidsample::{
    ContainerFormat, DecodeConfig, DecodeMethod, DecodedFrame, FfmpegLogLevel, FrameImageFormat,
    FrameSampler, MediaProbe, ProgressCallback, ProgressInfo, ReEncodeOptions, ResizeBounds,
    VideoCodec, VideoSource, plan_frame_indices,
};

const CLI_AFTER_HELP: &str = "Examples:\n  vidsample probe input.mp4 --json\n  vidsample plan --frames 125 --fps 24 --target 0.5\n  vidsample extract input.mp4 --out frames --target-fps 2 --max-frames 32 --progress\n  vidsample reencode input.mp4 --out sampled.mp4 --target-fps 1\n  vidsample completions zsh > _vidsample";

#[derive(Debug, Parser)]
#[command(
    name = "vidsample",
    version,
    about = "Sample, resize and re-encode frames from video",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Decode backend (auto, native, frame-grab, codec).
    #[arg(long, global = true, default_value = "auto")]
    method: String,

    /// Decoder thread count.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Decode on this GPU (needs the `hardware` feature).
    #[arg(long, global = true)]
    gpu: Option<u32>,

    /// Fail instead of falling back to software when the GPU is unusable.
    #[arg(long, global = true)]
    no_fallback: bool,
}

/// Sampling options shared by `extract` and `reencode`.
#[derive(Debug, Parser, Clone, Default)]
struct SamplingOptions {
    /// Target frame rate; 0 keeps every frame.
    #[arg(long, default_value_t = 0.0)]
    target_fps: f64,

    /// Upper bound on the number of frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Window start (seconds or [HH:]MM:SS[.ms]).
    #[arg(long)]
    start: Option<String>,

    /// Window end (seconds or [HH:]MM:SS[.ms]).
    #[arg(long)]
    end: Option<String>,

    /// Lower pixel budget for resizing.
    #[arg(long)]
    min_pixels: Option<u64>,

    /// Upper pixel budget for resizing.
    #[arg(long)]
    max_pixels: Option<u64>,

    /// Geometric filter expression (e.g. "scale=640:-1,hflip").
    #[arg(long)]
    filter: Option<String>,

    /// Decode keyframes only.
    #[arg(long)]
    keyframes_only: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print container and stream information.
    #[command(
        visible_alias = "info",
        after_help = "Examples:\n  vidsample probe input.mp4\n  vidsample probe input.mp4 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the frame indices a sampling run would decode.
    #[command(after_help = "Examples:\n  vidsample plan --frames 125 --fps 24 --target 0.5")]
    Plan {
        /// Total frames in the source.
        #[arg(long)]
        frames: u64,
        /// Source frame rate.
        #[arg(long)]
        fps: f64,
        /// Target frame rate; 0 keeps every frame.
        #[arg(long, default_value_t = 0.0)]
        target: f64,
        /// Upper bound on the number of frames.
        #[arg(long)]
        max_frames: Option<u64>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode sampled frames to image files.
    #[command(
        after_help = "Examples:\n  vidsample extract input.mp4 --out frames --target-fps 2 --ext jpg\n  vidsample extract input.mp4 --out frames --start 0:10 --end 0:20 --batch-size 16 --progress"
    )]
    Extract {
        /// Input video path.
        input: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        sampling: SamplingOptions,
        /// Stream frames in batches of this size instead of all at once.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Output image extension (png, jpg, jpeg).
        #[arg(long, default_value = "png")]
        ext: String,
        /// JPEG quality (1-100).
        #[arg(long, default_value_t = 85)]
        quality: u8,
    },

    /// Sample frames and re-encode them into a clip at the target rate.
    #[command(
        after_help = "Examples:\n  vidsample reencode input.mp4 --out sampled.mp4 --target-fps 1\n  vidsample reencode input.mp4 --out sampled.mkv --target-fps 2 --codec mpeg4"
    )]
    Reencode {
        /// Input video path.
        input: PathBuf,
        /// Output file; `.mkv` selects Matroska.
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        sampling: SamplingOptions,
        /// Output codec (h264, mpeg4).
        #[arg(long, default_value = "h264")]
        codec: String,
        /// libx264 constant rate factor.
        #[arg(long, default_value_t = 4)]
        crf: u8,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn parse_image_format(ext: &str, quality: u8) -> Option<FrameImageFormat> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some(FrameImageFormat::Png),
        "jpg" | "jpeg" => Some(FrameImageFormat::Jpeg {
            quality: quality.clamp(1, 100),
        }),
        _ => None,
    }
}

fn parse_codec(value: &str) -> Option<VideoCodec> {
    match value.to_ascii_lowercase().as_str() {
        "h264" | "avc" | "libx264" => Some(VideoCodec::H264),
        "mpeg4" | "mp4v" => Some(VideoCodec::Mpeg4),
        _ => None,
    }
}

fn container_for(path: &Path) -> ContainerFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mkv") => ContainerFormat::Matroska,
        _ => ContainerFormat::Mp4,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        vidsample::set_ffmpeg_log_level(parsed);
    }

    #[cfg(not(feature = "hardware"))]
    if global.gpu.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--gpu requires building with the `hardware` feature".yellow()
        );
    }

    Ok(())
}

fn build_config(
    global: &GlobalOptions,
    sampling: &SamplingOptions,
    progress: Option<&ProgressBar>,
) -> Result<DecodeConfig, Box<dyn std::error::Error>> {
    let mut config = DecodeConfig::new()
        .with_target_fps(sampling.target_fps)
        .with_keyframes_only(sampling.keyframes_only)
        .with_software_fallback(!global.no_fallback);

    if let Some(start) = &sampling.start {
        config = config.with_start_time(parse_timecode(start)?.as_secs_f64());
    }
    if let Some(end) = &sampling.end {
        config = config.with_end_time(parse_timecode(end)?.as_secs_f64());
    }
    if let Some(max_frames) = sampling.max_frames {
        config = config.with_max_frames(max_frames);
    }
    if sampling.min_pixels.is_some() || sampling.max_pixels.is_some() {
        let mut bounds = ResizeBounds::default();
        if let Some(min_pixels) = sampling.min_pixels {
            bounds = bounds.with_min_pixels(min_pixels);
        }
        if let Some(max_pixels) = sampling.max_pixels {
            bounds = bounds.with_max_pixels(max_pixels);
        }
        config = config.with_resize_bounds(bounds);
    }
    if let Some(filter) = &sampling.filter {
        config = config.with_filter(filter.clone());
    }
    if let Some(threads) = global.threads {
        config = config.with_thread_count(threads);
    }
    if let Some(gpu) = global.gpu {
        config = config.with_gpu(gpu);
    }
    if let Some(bar) = progress {
        config = config.with_progress(TerminalProgress { bar: bar.clone() });
    }

    config.validate()?;
    Ok(config)
}

fn progress_bar(enabled: bool) -> Result<Option<ProgressBar>, Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(None);
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
    bar.set_style(style.progress_chars("##-"));
    Ok(Some(bar))
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(frame) = info.current_frame {
            self.bar.set_message(format!("frame {frame}"));
        }
    }
}

fn write_frames(
    frames: &[DecodedFrame],
    out: &Path,
    format: FrameImageFormat,
    ext: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    for frame in frames {
        let path = out.join(format!("frame_{:06}.{ext}", frame.source_index));
        fs::write(&path, frame.encode(format)?)?;
    }
    Ok(frames.len())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;
    let method: DecodeMethod = cli.global.method.parse()?;

    match cli.command {
        Commands::Probe { input, json } => {
            let info = MediaProbe::probe_file(&input)?;
            if json {
                let payload = json!({
                    "format": info.format,
                    "duration_seconds": info.duration_seconds,
                    "bit_rate": info.bit_rate,
                    "video": info.video.as_ref().map(|video| json!({
                        "width": video.width,
                        "height": video.height,
                        "fps": video.source_fps,
                        "total_frames": video.total_frames,
                        "frame_count_estimated": video.frame_count_estimated,
                        "codec": video.codec_name,
                        "pixel_format": video.pixel_format,
                    })),
                    "audio_codec": info.audio_codec,
                    "streams": info.streams.iter().map(|stream| json!({
                        "index": stream.index,
                        "type": stream.kind.as_str(),
                        "codec": stream.codec,
                        "width": stream.width,
                        "height": stream.height,
                        "fps": stream.frames_per_second,
                        "frame_count": stream.frame_count,
                        "sample_rate": stream.sample_rate,
                        "channels": stream.channels,
                        "language": stream.language,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", info.format);
                println!("Duration: {:.3}s", info.duration_seconds);
                if let Some(video) = &info.video {
                    println!(
                        "Video: {}x{} @ {:.3} fps, {} frames{} [{}]",
                        video.width,
                        video.height,
                        video.source_fps,
                        video.total_frames,
                        if video.frame_count_estimated { " (estimated)" } else { "" },
                        video.codec_name,
                    );
                }
                if let Some(audio) = &info.audio_codec {
                    println!("Audio: {audio}");
                }
                if cli.global.verbose {
                    for stream in &info.streams {
                        println!("  #{} {} [{}]", stream.index, stream.kind.as_str(), stream.codec);
                    }
                }
            }
        }
        Commands::Plan {
            frames,
            fps,
            target,
            max_frames,
            json,
        } => {
            if max_frames == Some(0) {
                return Err("--max-frames must be greater than 0".into());
            }
            let plan = plan_frame_indices(frames, fps, target, max_frames);
            if json {
                println!("{}", serde_json::to_string(plan.as_slice())?);
            } else {
                println!(
                    "{} {}",
                    format!("{} frame(s):", plan.len()).bold(),
                    plan.iter().map(|index| index.to_string()).collect::<Vec<_>>().join(" ")
                );
            }
        }
        Commands::Extract {
            input,
            out,
            sampling,
            batch_size,
            ext,
            quality,
        } => {
            let format = parse_image_format(&ext, quality).ok_or(format!("unsupported --ext: {ext}"))?;
            if out.exists() && !cli.global.overwrite {
                return Err(format!(
                    "output directory already exists: {} (use --overwrite)",
                    out.display()
                )
                .into());
            }
            fs::create_dir_all(&out)?;

            let bar = progress_bar(cli.global.progress)?;
            let config = build_config(&cli.global, &sampling, bar.as_ref())?;
            let source = VideoSource::from_path(&input)?;
            let sampler = FrameSampler::new(method, config);

            let written = match batch_size {
                Some(size) => {
                    let mut batches = sampler.sample_batches(&source, size)?;
                    let mut written = 0;
                    while let Some(batch) = batches.next_batch()? {
                        written += write_frames(&batch, &out, format, &ext)?;
                        if cli.global.verbose {
                            eprintln!("{} {} frame(s)", "batch".cyan().bold(), batch.len());
                        }
                    }
                    for degradation in batches.degradations() {
                        eprintln!("{} {degradation}", "degraded:".yellow().bold());
                    }
                    written
                }
                None => {
                    let output = sampler.sample(&source)?;
                    for degradation in &output.degradations {
                        eprintln!("{} {degradation}", "degraded:".yellow().bold());
                    }
                    write_frames(&output.frames, &out, format, &ext)?
                }
            };

            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            println!(
                "{} {written} frame(s) to {}",
                "saved".green().bold(),
                out.display()
            );
        }
        Commands::Reencode {
            input,
            out,
            sampling,
            codec,
            crf,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let codec = parse_codec(&codec).ok_or(format!("unsupported --codec: {codec}"))?;

            let bar = progress_bar(cli.global.progress)?;
            let config = build_config(&cli.global, &sampling, bar.as_ref())?;
            let source = VideoSource::from_path(&input)?;
            let options = ReEncodeOptions::default()
                .with_codec(codec)
                .with_crf(crf)
                .with_container(container_for(&out));

            let clip = FrameSampler::new(method, config)
                .with_encode_options(options)
                .sample_to_clip(&source)?;
            clip.save(&out)?;

            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            println!(
                "{} {} frame(s) at {:.3} fps [{}] to {}",
                "saved".green().bold(),
                clip.frame_count,
                clip.target_fps(),
                clip.codec_name,
                out.display()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "vidsample", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{container_for, parse_codec, parse_image_format, parse_timecode};
    use std::path::Path;
    use vidsample::{ContainerFormat, FrameImageFormat, VideoCodec};

    #[test]
    fn parse_image_format_aliases() {
        assert_eq!(parse_image_format("PNG", 85), Some(FrameImageFormat::Png));
        assert_eq!(
            parse_image_format("jpeg", 0),
            Some(FrameImageFormat::Jpeg { quality: 1 })
        );
        assert!(parse_image_format("bmp", 85).is_none());
    }

    #[test]
    fn parse_codec_aliases() {
        assert_eq!(parse_codec("libx264"), Some(VideoCodec::H264));
        assert_eq!(parse_codec("MPEG4"), Some(VideoCodec::Mpeg4));
        assert!(parse_codec("vp9").is_none());
    }

    #[test]
    fn container_follows_extension() {
        assert_eq!(container_for(Path::new("a.MKV")), ContainerFormat::Matroska);
        assert_eq!(container_for(Path::new("a.mp4")), ContainerFormat::Mp4);
        assert_eq!(container_for(Path::new("clip")), ContainerFormat::Mp4);
    }

    #[test]
    fn parse_timecode_formats() {
        assert_eq!(parse_timecode("75").unwrap().as_secs(), 75);
        assert_eq!(parse_timecode("01:15").unwrap().as_secs(), 75);
        assert_eq!(parse_timecode("00:01:15.5").unwrap().as_secs(), 75);
        assert!(parse_timecode("1:2:3:4").is_err());
    }
}

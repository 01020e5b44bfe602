//! Decode configuration tests.

use vidsample::{
    DecodeConfig, FilterChain, ResizeBounds, SampleError, StreamMetadata, TimeRange,
    TransposeDirection, validate_filter_expression,
};

fn metadata(total_frames: u64, fps: f64) -> StreamMetadata {
    StreamMetadata {
        source_fps: fps,
        total_frames,
        frame_count_estimated: false,
        duration_seconds: total_frames as f64 / fps,
        width: 640,
        height: 480,
        codec_name: "h264".to_string(),
        pixel_format: "yuv420p".to_string(),
        container_format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        start_time_seconds: 0.0,
    }
}

fn assert_invalid(config: DecodeConfig) {
    assert!(
        matches!(config.validate(), Err(SampleError::InvalidConfig(_))),
        "expected InvalidConfig for {config:?}"
    );
}

// ── defaults ───────────────────────────────────────────────────────

#[test]
fn defaults_keep_everything_in_software() {
    let config = DecodeConfig::new();
    assert_eq!(config.target_fps(), 0.0);
    assert_eq!(config.max_frames(), None);
    assert_eq!(config.gpu_id(), None);
    assert!(config.auto_fallback_to_software());
    assert!(!config.keyframes_only());
    assert!(config.filter_expression().is_none());
    assert!(config.resize_bounds().is_none());
    assert!(!config.has_time_window());
    assert!(config.validate().is_ok());
}

#[test]
fn builder_sets_every_field() {
    let config = DecodeConfig::new()
        .with_start_time(1.5)
        .with_duration(2.0)
        .with_target_fps(2.0)
        .with_max_frames(16)
        .with_gpu(1)
        .with_software_fallback(false)
        .with_filter("hflip")
        .with_thread_count(4)
        .with_keyframes_only(true)
        .with_resize_bounds(ResizeBounds::new(3136, 602_112));

    assert_eq!(config.start_time(), Some(1.5));
    assert_eq!(config.duration(), Some(2.0));
    assert_eq!(config.max_frames(), Some(16));
    assert_eq!(config.gpu_id(), Some(1));
    assert!(!config.auto_fallback_to_software());
    assert_eq!(config.filter_expression(), Some("hflip"));
    assert_eq!(config.thread_count(), Some(4));
    assert!(config.keyframes_only());
    assert!(config.has_time_window());
    assert!(config.validate().is_ok());
}

#[test]
fn zero_threads_means_codec_default() {
    assert_eq!(DecodeConfig::new().with_thread_count(0).thread_count(), None);
}

#[test]
fn blank_filter_is_no_filter() {
    assert!(DecodeConfig::new().with_filter("  ").filter_expression().is_none());
}

// ── eager validation ───────────────────────────────────────────────

#[test]
fn contradictory_settings_are_rejected() {
    assert_invalid(DecodeConfig::new().with_start_time(5.0).with_end_time(2.0));
    assert_invalid(DecodeConfig::new().with_start_time(2.0).with_end_time(2.0));
    assert_invalid(DecodeConfig::new().with_duration(0.0));
    assert_invalid(DecodeConfig::new().with_duration(-1.0));
    assert_invalid(
        DecodeConfig::new()
            .with_start_time(0.0)
            .with_end_time(1.0)
            .with_duration(1.0),
    );
    assert_invalid(DecodeConfig::new().with_max_frames(0));
    assert_invalid(DecodeConfig::new().with_target_fps(f64::INFINITY));
    assert_invalid(DecodeConfig::new().with_resize_bounds(ResizeBounds::new(1000, 10)));
    assert_invalid(DecodeConfig::new().with_filter("drawtext=text=hi"));
}

#[test]
fn time_range_derives_the_missing_field() {
    let range = TimeRange::resolve(Some(2.0), None, Some(3.0)).unwrap();
    assert_eq!(range, TimeRange { start: 2.0, end: Some(5.0) });

    let range = TimeRange::resolve(None, Some(10.0), Some(4.0)).unwrap();
    assert_eq!(range, TimeRange { start: 6.0, end: Some(10.0) });
    assert_eq!(range.duration(), Some(4.0));

    assert!(TimeRange::resolve(None, Some(1.0), Some(4.0)).is_err());
    assert_eq!(TimeRange::resolve(None, None, None).unwrap(), TimeRange::FULL);
}

// ── container checks ───────────────────────────────────────────────

#[test]
fn window_must_start_inside_the_stream() {
    let meta = metadata(300, 30.0);
    assert!(DecodeConfig::new().with_start_time(9.9).validate_against(&meta).is_ok());
    assert!(matches!(
        DecodeConfig::new().with_start_time(10.0).validate_against(&meta),
        Err(SampleError::InvalidConfig(_))
    ));
}

#[test]
fn window_may_overshoot_by_one_frame() {
    let meta = metadata(300, 30.0);
    let one_frame = 1.0 / 30.0;
    assert!(
        DecodeConfig::new()
            .with_end_time(10.0 + one_frame * 0.5)
            .validate_against(&meta)
            .is_ok()
    );
    assert!(
        DecodeConfig::new()
            .with_end_time(10.0 + one_frame * 2.0)
            .validate_against(&meta)
            .is_err()
    );
}

#[test]
fn frame_window_is_half_open_and_clamped() {
    let meta = metadata(300, 30.0);
    let window = TimeRange::resolve(Some(1.0), Some(2.0), None)
        .unwrap()
        .frame_window(&meta);
    assert_eq!((window.start_frame, window.end_frame), (30, 60));
    assert_eq!(window.len(), 30);
    assert!(window.contains(30));
    assert!(!window.contains(60));

    let window = TimeRange::resolve(Some(9.0), Some(20.0), None)
        .unwrap()
        .frame_window(&meta);
    assert_eq!(window.end_frame, 300);
}

// ── filters ────────────────────────────────────────────────────────

#[test]
fn filter_chain_renders_allowed_steps() {
    let chain = FilterChain::new()
        .scale(640, -2)
        .crop(10, 20, 320, 240)
        .transpose(TransposeDirection::Clockwise)
        .horizontal_flip()
        .vertical_flip();
    let expression = chain.build();
    assert_eq!(
        expression,
        "scale=640:-2,crop=320:240:10:20,transpose=1,hflip,vflip"
    );
    assert!(validate_filter_expression(&expression).is_ok());

    let config = DecodeConfig::new().with_filter_chain(&chain);
    assert_eq!(config.filter_expression(), Some(expression.as_str()));
}

#[test]
fn rotation_is_rendered_in_radians() {
    let expression = FilterChain::new().rotate(90.0).build();
    assert!(expression.starts_with("rotate=1.57"));
    assert!(validate_filter_expression(&expression).is_ok());
}

#[test]
fn filter_graphs_are_rejected() {
    assert!(validate_filter_expression("hflip;vflip").is_err());
    assert!(validate_filter_expression("[in]hflip[out]").is_err());
    assert!(validate_filter_expression("hflip,,vflip").is_err());
    assert!(validate_filter_expression("eq=contrast=2").is_err());
}

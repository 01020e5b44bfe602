//! Backend, session and batch streaming tests.
//!
//! Every test builds its own clip in memory and returns early when FFmpeg
//! has no encoder to build it with.

mod common;

use vidsample::{
    DecodeConfig, DecodeMethod, DecodeState, DecodeStatus, DecoderFactory, Degradation,
    FrameImageFormat, FrameSampler, MediaProbe, ResizeBounds, SEEK_GAP_FRAMES, SampleError,
    VideoSource,
};

fn indices_for(method: DecodeMethod, source: &VideoSource, config: DecodeConfig) -> Vec<u64> {
    FrameSampler::new(method, config)
        .sample(source)
        .expect("decode failed")
        .source_indices()
}

// ── full decode ────────────────────────────────────────────────────

#[test]
fn every_backend_decodes_every_frame() {
    let Some(source) = common::synthetic_clip(20, 10.0) else {
        return;
    };

    for method in DecodeMethod::CONCRETE {
        let output = FrameSampler::new(method, DecodeConfig::new())
            .sample(&source)
            .expect("decode failed");
        assert_eq!(output.status, DecodeStatus::Completed, "{method}");
        assert_eq!(output.source_indices(), (0..20).collect::<Vec<_>>(), "{method}");
        assert_eq!((output.frames[0].width(), output.frames[0].height()), (64, 48));
        assert!(output.frames[0].is_keyframe);
    }
}

#[test]
fn timestamps_are_non_decreasing() {
    let Some(source) = common::synthetic_clip(30, 15.0) else {
        return;
    };

    for method in DecodeMethod::CONCRETE {
        let output = FrameSampler::new(method, DecodeConfig::new())
            .sample(&source)
            .expect("decode failed");
        let timestamps: Vec<f64> = output.frames.iter().map(|frame| frame.timestamp).collect();
        assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]), "{method}");
        assert!(timestamps[0] >= 0.0);
        let last = timestamps[timestamps.len() - 1];
        assert!((last - 29.0 / 15.0).abs() < 0.05, "{method}: last timestamp {last}");
    }
}

#[test]
fn backends_agree_on_the_plan() {
    let Some(source) = common::synthetic_clip(40, 10.0) else {
        return;
    };

    let config = DecodeConfig::new().with_target_fps(2.0);
    let expected = vidsample::plan_frame_indices(40, 10.0, 2.0, None).into_vec();
    for method in DecodeMethod::CONCRETE {
        assert_eq!(indices_for(method, &source, config.clone()), expected, "{method}");
    }
}

#[test]
fn max_frames_caps_the_output() {
    let Some(source) = common::synthetic_clip(40, 10.0) else {
        return;
    };

    let config = DecodeConfig::new().with_target_fps(5.0).with_max_frames(5);
    let indices = indices_for(DecodeMethod::Native, &source, config);
    assert_eq!(indices.len(), 4);
    assert_eq!(indices.first(), Some(&0));
    assert_eq!(indices.last(), Some(&39));
}

// ── batches ────────────────────────────────────────────────────────

#[test]
fn twenty_frames_in_batches_of_eight() {
    let Some(source) = common::synthetic_clip(20, 10.0) else {
        return;
    };

    for method in DecodeMethod::CONCRETE {
        let sampler = FrameSampler::new(method, DecodeConfig::new());
        let full = sampler.sample(&source).expect("decode failed").source_indices();

        let mut batches = sampler.sample_batches(&source, 8).expect("open failed");
        let mut sizes = Vec::new();
        let mut streamed = Vec::new();
        while let Some(batch) = batches.next_batch().expect("batch failed") {
            sizes.push(batch.len());
            streamed.extend(batch.iter().map(|frame| frame.source_index));
        }

        assert_eq!(sizes, vec![8, 8, 4], "{method}");
        assert_eq!(streamed, full, "{method}");
        assert!(batches.is_exhausted());
        assert_eq!(batches.status(), Some(DecodeStatus::Completed));
        assert_eq!(batches.frames_emitted(), 20);
        assert!(batches.next_batch().expect("exhausted").is_none());
    }
}

#[test]
fn batches_work_as_an_iterator() {
    let Some(source) = common::synthetic_clip(12, 12.0) else {
        return;
    };

    let sampler = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new());
    let sizes: Vec<usize> = sampler
        .sample_batches(&source, 5)
        .expect("open failed")
        .map(|batch| batch.expect("batch failed").len())
        .collect();
    assert_eq!(sizes, vec![5, 5, 2]);
}

#[test]
fn zero_batch_size_is_rejected() {
    let Some(source) = common::synthetic_clip(4, 4.0) else {
        return;
    };

    let result = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new()).sample_batches(&source, 0);
    assert!(matches!(result, Err(SampleError::InvalidConfig(_))));
}

// ── windows and specific frames ────────────────────────────────────

#[test]
fn time_window_selects_a_frame_range() {
    let Some(source) = common::synthetic_clip(30, 10.0) else {
        return;
    };

    let config = DecodeConfig::new().with_start_time(1.0).with_duration(1.0);
    let indices = indices_for(DecodeMethod::Codec, &source, config);
    assert_eq!(indices, (10..20).collect::<Vec<_>>());
}

#[test]
fn decode_time_range_overrides_the_window() {
    let Some(source) = common::synthetic_clip(30, 10.0) else {
        return;
    };

    let session = FrameSampler::new(DecodeMethod::Codec, DecodeConfig::new())
        .open(&source)
        .expect("open failed");
    let output = session.decode_time_range(2.0, Some(0.5)).expect("decode failed");
    assert_eq!(output.source_indices(), vec![20, 21, 22, 23, 24]);
}

#[test]
fn specific_frames_across_a_seek_gap() {
    let total = SEEK_GAP_FRAMES as usize * 3;
    let Some(source) = common::synthetic_clip(total, 30.0) else {
        return;
    };

    let session = FrameSampler::new(DecodeMethod::Codec, DecodeConfig::new())
        .open(&source)
        .expect("open failed");
    let wanted = [2, 3, total as u64 - 5, 1, 3];
    let output = session.decode_specific_frames(&wanted).expect("decode failed");
    assert_eq!(output.source_indices(), vec![1, 2, 3, total as u64 - 5]);
    assert!(!output.is_degraded());
}

#[test]
fn sequential_backends_cannot_pick_frames() {
    let Some(source) = common::synthetic_clip(10, 10.0) else {
        return;
    };

    for method in [DecodeMethod::Native, DecodeMethod::FrameGrab] {
        let session = FrameSampler::new(method, DecodeConfig::new())
            .open(&source)
            .expect("open failed");
        assert!(!session.capabilities().precise_seek);
        assert!(matches!(
            session.decode_specific_frames(&[1, 2]),
            Err(SampleError::UnsupportedOperation { .. })
        ));
    }
}

#[test]
fn window_past_the_end_is_rejected_at_open() {
    let Some(source) = common::synthetic_clip(10, 10.0) else {
        return;
    };

    let config = DecodeConfig::new().with_start_time(60.0);
    assert!(matches!(
        FrameSampler::new(DecodeMethod::Codec, config).open(&source),
        Err(SampleError::InvalidConfig(_))
    ));
}

// ── session state ──────────────────────────────────────────────────

#[test]
fn opened_session_reports_metadata_and_plan() {
    let Some(source) = common::synthetic_clip(25, 25.0) else {
        return;
    };

    let config = DecodeConfig::new().with_target_fps(4.0);
    let session = FrameSampler::new(DecodeMethod::Native, config)
        .open(&source)
        .expect("open failed");
    assert_eq!(session.method(), DecodeMethod::Native);
    assert_eq!(session.state(), DecodeState::Opened);

    let info = session.stream_info();
    assert_eq!((info.width, info.height), (64, 48));
    assert_eq!(info.total_frames, 25);
    assert!((info.source_fps - 25.0).abs() < 0.01);

    let plan = session.plan().expect("plan failed");
    assert_eq!(plan.len(), 4);
}

// ── codec-only capabilities ────────────────────────────────────────

#[test]
fn filters_run_on_the_codec_backend() {
    let Some(source) = common::synthetic_clip(6, 6.0) else {
        return;
    };

    let config = DecodeConfig::new().with_filter("transpose=1");
    let output = FrameSampler::new(DecodeMethod::Codec, config)
        .sample(&source)
        .expect("decode failed");
    assert_eq!(output.len(), 6);
    assert_eq!((output.frames[0].width(), output.frames[0].height()), (48, 64));
}

#[test]
fn filters_are_ignored_elsewhere_with_a_degradation() {
    let Some(source) = common::synthetic_clip(6, 6.0) else {
        return;
    };

    let config = DecodeConfig::new().with_filter("hflip").with_keyframes_only(true);
    let output = FrameSampler::new(DecodeMethod::Native, config)
        .sample(&source)
        .expect("decode failed");
    assert_eq!(output.len(), 6);
    assert!(output.degradations.contains(&Degradation::FilterIgnored));
    assert!(output.degradations.contains(&Degradation::KeyframesOnlyIgnored));
}

#[test]
fn keyframes_only_emits_keyframes() {
    let Some(source) = common::synthetic_clip(60, 30.0) else {
        return;
    };

    let output = FrameSampler::new(DecodeMethod::Codec, DecodeConfig::new().with_keyframes_only(true))
        .sample(&source)
        .expect("decode failed");
    assert!(!output.is_empty());
    assert!(output.len() < 60);
    assert!(output.frames.iter().all(|frame| frame.is_keyframe));
    assert!(!output.degradations.iter().any(|d| matches!(d, Degradation::MissingFrames { .. })));
}

#[test]
fn resize_bounds_apply_to_every_frame() {
    let Some(source) = common::synthetic_clip(4, 4.0) else {
        return;
    };

    let config = DecodeConfig::new().with_resize_bounds(ResizeBounds::default());
    let output = FrameSampler::new(DecodeMethod::Native, config)
        .sample(&source)
        .expect("decode failed");
    assert!(output.frames.iter().all(|frame| (frame.width(), frame.height()) == (56, 56)));
}

// ── hardware fallback ──────────────────────────────────────────────

#[test]
fn gpu_request_on_software_backend_falls_back() {
    let Some(source) = common::synthetic_clip(4, 4.0) else {
        return;
    };

    let output = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new().with_gpu(0))
        .sample(&source)
        .expect("fallback should succeed");
    assert_eq!(output.len(), 4);
    assert!(output.is_degraded());
    assert!(output.degradations.iter().any(|d| matches!(d, Degradation::SoftwareFallback { .. })));
}

#[test]
fn gpu_request_without_fallback_fails() {
    let Some(source) = common::synthetic_clip(4, 4.0) else {
        return;
    };

    let config = DecodeConfig::new().with_gpu(0).with_software_fallback(false);
    assert!(matches!(
        FrameSampler::new(DecodeMethod::Native, config).open(&source),
        Err(SampleError::HardwareAccelUnavailable(_))
    ));
}

#[cfg(not(feature = "hardware"))]
#[test]
fn codec_backend_without_hardware_support() {
    let Some(source) = common::synthetic_clip(4, 4.0) else {
        return;
    };

    let output = FrameSampler::new(DecodeMethod::Auto, DecodeConfig::new().with_gpu(0))
        .sample(&source)
        .expect("fallback should succeed");
    assert_eq!(output.len(), 4);
    assert!(output.degradations.iter().any(|d| matches!(d, Degradation::SoftwareFallback { .. })));

    let strict = DecodeConfig::new().with_gpu(0).with_software_fallback(false);
    assert!(matches!(
        DecoderFactory::create(DecodeMethod::Codec, &strict)
            .expect("codec backend")
            .open(&source, &strict),
        Err(SampleError::HardwareAccelUnavailable(_))
    ));
}

// ── inputs and outputs ─────────────────────────────────────────────

#[test]
fn base64_sources_decode_like_bytes() {
    let Some(source) = common::synthetic_clip(6, 6.0) else {
        return;
    };

    let uri = format!("data:video/mp4;base64,{}", source.to_base64());
    let decoded = VideoSource::from_base64(&uri).expect("valid base64");
    assert_eq!(decoded.as_bytes(), source.as_bytes());
    assert_eq!(
        indices_for(DecodeMethod::Native, &decoded, DecodeConfig::new()),
        (0..6).collect::<Vec<_>>()
    );
}

#[test]
fn frames_encode_to_images() {
    let Some(source) = common::synthetic_clip(4, 4.0) else {
        return;
    };

    let sampler = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new());
    let pngs = sampler
        .sample_to_images(&source, FrameImageFormat::Png)
        .expect("encode failed");
    assert_eq!(pngs.len(), 4);
    assert!(pngs.iter().all(|png| png.starts_with(&[0x89, b'P', b'N', b'G'])));

    let jpegs = sampler
        .sample_to_base64(&source, FrameImageFormat::default())
        .expect("encode failed");
    assert!(jpegs.iter().all(|text| text.starts_with("/9j/")));
}

#[test]
fn probe_reports_the_video_track() {
    let Some(source) = common::synthetic_clip(20, 10.0) else {
        return;
    };

    let info = MediaProbe::probe(&source).expect("probe failed");
    let video = info.video.expect("video track");
    assert_eq!((video.width, video.height), (64, 48));
    assert_eq!(video.total_frames, 20);
    assert!(!info.has_audio());
    assert_eq!(info.streams.len(), 1);
    assert!((info.duration_seconds - 2.0).abs() < 0.2);
}

#[test]
fn invalid_input_is_rejected() {
    let empty = VideoSource::from_bytes(Vec::new());
    let garbage = VideoSource::from_bytes(vec![0_u8; 1024]);
    for method in DecodeMethod::CONCRETE {
        let sampler = FrameSampler::new(method, DecodeConfig::new());
        assert!(
            matches!(sampler.open(&empty), Err(SampleError::UnsupportedFormat(_))),
            "{method}"
        );
        assert!(
            matches!(
                sampler.open(&garbage),
                Err(SampleError::UnsupportedFormat(_) | SampleError::NoVideoStream)
            ),
            "{method}"
        );
    }
}

// ── corrupt data ───────────────────────────────────────────────────

#[test]
fn corruption_at_a_planned_frame_fails_the_call() {
    let Some(clip) = common::synthetic_clip(30, 30.0) else {
        return;
    };
    let Some(damaged) = common::damage_frame(&clip, 0) else {
        return;
    };

    for method in DecodeMethod::CONCRETE {
        match FrameSampler::new(method, DecodeConfig::new()).sample(&damaged) {
            Err(SampleError::DecodeFailure { frame_index, .. }) => {
                assert!(frame_index <= 1, "{method}: failure reported at {frame_index}");
            }
            other => panic!("{method}: expected a decode failure, got {other:?}"),
        }
    }
}

#[test]
fn corruption_away_from_the_plan_is_skipped() {
    let Some(clip) = common::synthetic_clip(60, 30.0) else {
        return;
    };
    // Frame 12 starts the second group of pictures; the 2 fps plan is
    // [0, 20, 39, 59].
    let Some(damaged) = common::damage_frame(&clip, 12) else {
        return;
    };

    for method in DecodeMethod::CONCRETE {
        let output = FrameSampler::new(method, DecodeConfig::new().with_target_fps(2.0))
            .sample(&damaged)
            .unwrap_or_else(|error| panic!("{method}: {error}"));
        assert_eq!(output.status, DecodeStatus::Completed, "{method}");
        assert_eq!(output.source_indices(), vec![0, 20, 39, 59], "{method}");
    }
}

// ── audio-only input ───────────────────────────────────────────────

#[test]
fn audio_only_container_has_no_video_stream() {
    let source = common::audio_only_wav(8_000, 1);

    for method in DecodeMethod::CONCRETE {
        let result = FrameSampler::new(method, DecodeConfig::new()).open(&source);
        assert!(
            matches!(result, Err(SampleError::NoVideoStream)),
            "{method}: {:?}",
            result.err()
        );
    }
    assert!(matches!(
        FrameSampler::new(DecodeMethod::Auto, DecodeConfig::new()).sample(&source),
        Err(SampleError::NoVideoStream)
    ));

    let info = MediaProbe::probe(&source).expect("audio-only containers still probe");
    assert!(info.video.is_none());
    assert!(info.has_audio());
    assert_eq!(info.audio_codec.as_deref(), Some("pcm_s16le"));
    assert_eq!(info.streams.len(), 1);
    assert_eq!(info.streams[0].sample_rate, Some(8_000));
    assert_eq!(info.streams[0].channels, Some(1));
}

// ── parallel ───────────────────────────────────────────────────────

#[cfg(feature = "rayon")]
#[test]
fn decode_many_keeps_input_order_and_isolates_failures() {
    let (Some(short), Some(long)) = (
        common::synthetic_clip(6, 6.0),
        common::synthetic_clip(12, 6.0),
    ) else {
        return;
    };
    let garbage = VideoSource::from_bytes(vec![0x13; 256]);

    let results = vidsample::decode_many(
        &[short, garbage, long],
        DecodeMethod::Native,
        &DecodeConfig::new(),
    );
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().expect("short clip").len(), 6);
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().expect("long clip").len(), 12);
}

//! Progress and cancellation tests.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use vidsample::{
    CancellationToken, DecodeConfig, DecodeMethod, DecodeStatus, FrameSampler, OperationType,
    ProgressInfo,
};

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_default_not_cancelled() {
    assert!(!CancellationToken::new().is_cancelled());
    assert!(!CancellationToken::default().is_cancelled());
}

#[test]
fn cancellation_token_clone_shares_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    let check = token.as_cancel_check();
    assert!(!check());

    token.cancel();
    assert!(clone.is_cancelled());
    assert!(check());
}

// ── progress during decode ─────────────────────────────────────────

#[test]
fn progress_reports_every_planned_frame() {
    let Some(source) = common::synthetic_clip(24, 12.0) else {
        return;
    };

    let seen: Arc<Mutex<Vec<ProgressInfo>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let config = DecodeConfig::new()
        .with_target_fps(2.0)
        .with_progress(move |info: &ProgressInfo| sink.lock().unwrap().push(info.clone()));

    let output = FrameSampler::new(DecodeMethod::Native, config)
        .sample(&source)
        .expect("decode failed");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), output.len());
    for (position, info) in seen.iter().enumerate() {
        assert_eq!(info.operation, OperationType::FrameDecoding);
        assert_eq!(info.current, position as u64 + 1);
        assert_eq!(info.total, Some(output.len() as u64));
        assert_eq!(info.current_frame, Some(output.frames[position].source_index));
    }
    assert_eq!(seen.last().and_then(|info| info.percentage), Some(100.0));
}

#[test]
fn cancellation_stops_after_the_current_frame() {
    let Some(source) = common::synthetic_clip(30, 10.0) else {
        return;
    };

    const STOP_AFTER: u64 = 5;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let config = DecodeConfig::new()
        .with_cancellation(token)
        .with_progress(move |info: &ProgressInfo| {
            if info.current >= STOP_AFTER {
                trigger.cancel();
            }
        });

    let output = FrameSampler::new(DecodeMethod::Native, config)
        .sample(&source)
        .expect("cancelled decodes are not errors");

    assert_eq!(output.status, DecodeStatus::Cancelled);
    assert!(output.is_cancelled());
    assert!(output.len() as u64 <= STOP_AFTER + 1);
    assert!(output.len() as u64 >= STOP_AFTER);
    assert_eq!(output.source_indices(), (0..output.len() as u64).collect::<Vec<_>>());
}

#[test]
fn cancel_check_closure_is_honoured_between_batches() {
    let Some(source) = common::synthetic_clip(20, 10.0) else {
        return;
    };

    let produced = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&produced);
    let limit = Arc::clone(&produced);
    let config = DecodeConfig::new()
        .with_progress(move |_: &ProgressInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_cancel_check(move || limit.load(Ordering::SeqCst) >= 8);

    let mut batches = FrameSampler::new(DecodeMethod::Native, config)
        .sample_batches(&source, 8)
        .expect("open failed");

    let first = batches.next_batch().expect("batch failed").expect("first batch");
    assert_eq!(first.len(), 8);
    assert!(batches.next_batch().expect("batch failed").is_none());
    assert!(batches.is_exhausted());
    assert_eq!(batches.status(), Some(DecodeStatus::Cancelled));
    assert_eq!(batches.frames_emitted(), 8);
}

#[test]
fn already_cancelled_token_yields_no_frames() {
    let Some(source) = common::synthetic_clip(10, 10.0) else {
        return;
    };

    let token = CancellationToken::new();
    token.cancel();
    let output = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new().with_cancellation(token))
        .sample(&source)
        .expect("decode failed");
    assert!(output.is_empty());
    assert_eq!(output.status, DecodeStatus::Cancelled);
}

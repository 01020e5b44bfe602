//! Error type and backend selection tests.

use std::str::FromStr;

use vidsample::{
    DecodeConfig, DecodeMethod, DecoderFactory, SampleError, VideoSource,
};

#[test]
fn error_messages_carry_context() {
    let error = SampleError::DecodeFailure {
        frame_index: 41,
        reason: "invalid NAL unit".to_string(),
    };
    assert_eq!(error.to_string(), "Failed to decode frame 41: invalid NAL unit");

    let error = SampleError::UnsupportedOperation {
        method: DecodeMethod::Native,
        operation: "decode_specific_frames",
    };
    assert_eq!(
        error.to_string(),
        "decode_specific_frames is not supported by the native backend"
    );

    let error = SampleError::BackendUnavailable(DecodeMethod::Auto);
    assert!(error.to_string().contains("auto"));
}

#[test]
fn recoverable_errors() {
    assert!(SampleError::HardwareAccelUnavailable("no device".to_string()).is_recoverable());
    assert!(SampleError::BackendUnavailable(DecodeMethod::Codec).is_recoverable());
    assert!(!SampleError::NoVideoStream.is_recoverable());
    assert!(!SampleError::EmptyFrameSequence.is_recoverable());
}

#[test]
fn io_and_base64_errors_convert() {
    let missing = VideoSource::from_path("/nonexistent/vidsample/input.mp4");
    assert!(matches!(missing, Err(SampleError::IoError(_))));

    let garbage = VideoSource::from_base64("not base64 at all!");
    assert!(matches!(garbage, Err(SampleError::Base64Error(_))));
}

#[test]
fn method_names_parse() {
    assert_eq!(DecodeMethod::from_str("Native").unwrap(), DecodeMethod::Native);
    assert_eq!(DecodeMethod::from_str("frame_grab").unwrap(), DecodeMethod::FrameGrab);
    assert_eq!(DecodeMethod::from_str(" CODEC ").unwrap(), DecodeMethod::Codec);
    assert_eq!("auto".parse::<DecodeMethod>().unwrap(), DecodeMethod::Auto);
    assert!(matches!(
        "opencv".parse::<DecodeMethod>(),
        Err(SampleError::InvalidConfig(_))
    ));

    for method in DecodeMethod::CONCRETE {
        assert_eq!(method.as_str().parse::<DecodeMethod>().unwrap(), method);
    }
}

#[test]
fn factory_creates_available_backends() {
    let available = DecoderFactory::available_methods();
    if available.is_empty() {
        return;
    }

    let config = DecodeConfig::new();
    let backend = DecoderFactory::create(DecodeMethod::Auto, &config).expect("a backend");
    assert!(backend.is_available());
    assert_eq!(backend.method(), DecodeMethod::Native);

    for method in available {
        let backend = DecoderFactory::create(method, &config).expect("available backend");
        assert_eq!(backend.method(), method);
    }
}

#[test]
fn capability_matrix() {
    let codec = DecoderFactory::backend(DecodeMethod::Codec).expect("codec").capabilities();
    assert!(codec.precise_seek && codec.filter_passthrough && codec.keyframes_only);
    assert_eq!(codec.hardware_decode, cfg!(feature = "hardware"));

    let native = DecoderFactory::backend(DecodeMethod::Native).expect("native").capabilities();
    assert!(native.memory_only_input && native.streaming_batches);
    assert!(!native.precise_seek && !native.hardware_decode);

    let grab = DecoderFactory::backend(DecodeMethod::FrameGrab).expect("frame grab").capabilities();
    assert!(!grab.memory_only_input);
}

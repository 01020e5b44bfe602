//! Error types for the `vidsample` crate.
//!
//! This module defines [`SampleError`], the unified error type returned by
//! all fallible operations in the crate. Variants carry enough context (frame
//! indices, codec messages, offending configuration values) to diagnose a
//! failure without additional logging at the call site.
//!
//! Cancellation is deliberately absent: a cancelled decode is reported through
//! [`DecodeStatus::Cancelled`](crate::DecodeStatus) with the partial results,
//! not as an error.

use std::io::Error as IoError;

use base64::DecodeError as Base64DecodeError;
use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::decoder::DecodeMethod;

/// The unified error type for all `vidsample` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SampleError {
    /// The container or codec is not recognised.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container holds no video track.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// Hardware decoding was requested but could not be initialised and
    /// software fallback is disabled.
    #[error("Hardware acceleration unavailable: {0}")]
    HardwareAccelUnavailable(String),

    /// A frame needed by the plan could not be decoded.
    #[error("Failed to decode frame {frame_index}: {reason}")]
    DecodeFailure {
        /// Source frame index at (or nearest to) the failure.
        frame_index: u64,
        /// Codec or demuxer message.
        reason: String,
    },

    /// The re-encoder was handed zero frames.
    #[error("Cannot encode an empty frame sequence")]
    EmptyFrameSequence,

    /// The configuration is contradictory or out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend does not implement the requested operation.
    #[error("{operation} is not supported by the {method} backend")]
    UnsupportedOperation {
        /// Backend that rejected the call.
        method: DecodeMethod,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// No decode backend could be initialised in this environment.
    #[error("No usable decode backend (requested {0})")]
    BackendUnavailable(DecodeMethod),

    /// Re-encoding or in-memory muxing failed.
    #[error("Video encoding error: {0}")]
    EncodeFailure(String),

    /// FFmpeg filter graph setup or processing failed.
    #[error("Filter graph error: {0}")]
    FilterGraphError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame conversion or encoding.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// Base64 transport text could not be decoded.
    #[error("Invalid base64 payload: {0}")]
    Base64Error(#[from] Base64DecodeError),
}

impl From<FfmpegError> for SampleError {
    fn from(error: FfmpegError) -> Self {
        SampleError::FfmpegError(error.to_string())
    }
}

impl SampleError {
    /// Returns `true` for errors the caller can recover from by changing the
    /// configuration (for example enabling software fallback).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SampleError::HardwareAccelUnavailable(_)
                | SampleError::BackendUnavailable(_)
                | SampleError::UnsupportedOperation { .. }
        )
    }
}

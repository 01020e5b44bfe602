//! Encoded video input.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::error::SampleError;

/// An immutable buffer holding an encoded video.
///
/// Decode sessions borrow the source for their whole lifetime and never keep
/// it beyond that.
///
/// # Example
///
/// ```no_run
/// use vidsample::VideoSource;
///
/// let from_disk = VideoSource::from_path("clip.mp4")?;
/// let from_text = VideoSource::from_base64("data:video/mp4;base64,AAAAHGZ0eXA=")?;
/// assert!(!from_disk.is_empty());
/// # let _ = from_text;
/// # Ok::<(), vidsample::SampleError>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct VideoSource {
    bytes: Vec<u8>,
}

impl Debug for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoSource")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl VideoSource {
    /// Wrap encoded bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Read a whole file into memory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SampleError> {
        let path = path.as_ref();
        log::debug!("Reading video source from {}", path.display());
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    /// Decode base64 transport text. A `data:<mime>;base64,` prefix and
    /// surrounding whitespace are accepted.
    pub fn from_base64(text: &str) -> Result<Self, SampleError> {
        let trimmed = text.trim();
        let payload = match trimmed.split_once(";base64,") {
            Some((prefix, payload)) if prefix.starts_with("data:") => payload,
            _ => trimmed,
        };
        let compact: String = payload.split_whitespace().collect();
        Ok(Self::from_bytes(STANDARD.decode(compact)?))
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encode the bytes as base64 text.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Consume the source and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for VideoSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&[u8]> for VideoSource {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

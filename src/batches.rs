//! Pull-based batch streaming.
//!
//! [`FrameBatches`] is returned by
//! [`DecodeSession::decode_batches`](crate::DecodeSession::decode_batches).
//! No decoding happens ahead of a [`next_batch`](FrameBatches::next_batch)
//! call, so at most one batch of decoded frames is held in memory. The
//! sequence is finite and cannot be restarted; dropping it early releases
//! the container.
//!
//! # Example
//!
//! ```no_run
//! use vidsample::{DecodeConfig, FrameSampler, DecodeMethod, VideoSource};
//!
//! let source = VideoSource::from_path("clip.mp4")?;
//! let sampler = FrameSampler::new(DecodeMethod::Native, DecodeConfig::new());
//! let mut batches = sampler.sample_batches(&source, 8)?;
//!
//! while let Some(batch) = batches.next_batch()? {
//!     println!("{} frames", batch.len());
//! }
//! assert!(batches.is_exhausted());
//! # Ok::<(), vidsample::SampleError>(())
//! ```

use crate::decoder::{DecodeStatus, Degradation};
use crate::error::SampleError;
use crate::frame::DecodedFrame;
use crate::metadata::StreamMetadata;
use crate::session::DecodeSession;

/// A lazy sequence of frame batches.
#[derive(Debug)]
pub struct FrameBatches<'a> {
    session: DecodeSession<'a>,
    batch_size: usize,
    exhausted: bool,
    failed: bool,
    emitted: u64,
}

impl<'a> FrameBatches<'a> {
    pub(crate) fn new(session: DecodeSession<'a>, batch_size: usize) -> Self {
        Self {
            session,
            batch_size,
            exhausted: false,
            failed: false,
            emitted: 0,
        }
    }

    /// Decode the next batch of up to `batch_size` frames.
    ///
    /// Returns `Ok(None)` once every planned frame has been delivered or the
    /// cancel check fired. Only the last batch may be shorter than
    /// `batch_size`. After an error the sequence is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<Vec<DecodedFrame>>, SampleError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.session.next_frame() {
                Ok(Some(frame)) => batch.push(frame),
                Ok(None) => {
                    self.exhausted = true;
                    break;
                }
                Err(error) => {
                    self.exhausted = true;
                    self.failed = true;
                    return Err(error);
                }
            }
        }

        if batch.is_empty() {
            return Ok(None);
        }
        self.emitted += batch.len() as u64;
        log::debug!(
            "Batch of {} frame(s) ready ({} so far)",
            batch.len(),
            self.emitted
        );
        Ok(Some(batch))
    }

    /// Returns `true` once no further batch will be produced.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// How the sequence ended: `None` while frames remain or after an
    /// error.
    pub fn status(&self) -> Option<DecodeStatus> {
        if self.failed {
            None
        } else {
            self.session.status()
        }
    }

    /// Frames delivered so far.
    pub fn frames_emitted(&self) -> u64 {
        self.emitted
    }

    /// Metadata of the decoded stream.
    pub fn metadata(&self) -> &StreamMetadata {
        self.session.stream_info()
    }

    /// Degradations recorded so far.
    pub fn degradations(&self) -> &[Degradation] {
        self.session.degradations()
    }
}

impl Iterator for FrameBatches<'_> {
    type Item = Result<Vec<DecodedFrame>, SampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

impl std::iter::FusedIterator for FrameBatches<'_> {}

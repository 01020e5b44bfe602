//! Parallel multi-source decoding.
//!
//! [`decode_many`] samples several sources at once on the rayon thread pool.
//! Each worker selects its own backend and opens its own demuxer, so sources
//! never share decoder state.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::configuration::DecodeConfig;
use crate::decoder::{DecodeMethod, DecodeOutput};
use crate::decoder_factory::DecoderFactory;
use crate::error::SampleError;
use crate::source::VideoSource;

/// Decode every source with the same method and configuration.
///
/// Results come back in input order. A failing source does not abort the
/// others. Progress callbacks and cancellation checks in `config` are shared
/// by all workers.
///
/// # Example
///
/// ```no_run
/// use vidsample::{DecodeConfig, DecodeMethod, VideoSource, decode_many};
///
/// let sources = vec![
///     VideoSource::from_path("a.mp4")?,
///     VideoSource::from_path("b.mp4")?,
/// ];
/// let config = DecodeConfig::new().with_target_fps(1.0);
/// for result in decode_many(&sources, DecodeMethod::Auto, &config) {
///     println!("{} frames", result?.len());
/// }
/// # Ok::<(), vidsample::SampleError>(())
/// ```
pub fn decode_many(
    sources: &[VideoSource],
    method: DecodeMethod,
    config: &DecodeConfig,
) -> Vec<Result<DecodeOutput, SampleError>> {
    log::debug!(
        "Decoding {} source(s) on {} thread(s)",
        sources.len(),
        rayon::current_num_threads()
    );

    sources
        .par_iter()
        .map(|source| {
            DecoderFactory::create(method, config)?
                .open(source, config)?
                .decode_all()
        })
        .collect()
}

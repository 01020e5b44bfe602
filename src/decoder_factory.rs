//! Backend selection.
//!
//! [`DecoderFactory::create`] turns a [`DecodeMethod`] into a ready backend.
//! `Auto` resolves to the codec backend when the configuration needs one of
//! its capabilities (a time window, a filter, keyframes-only or a GPU) and to
//! the native backend otherwise. When the chosen backend cannot run here, the
//! factory walks `codec -> native -> frame-grab` and takes the first one that
//! can.

use crate::codec_decoder::CodecBackend;
use crate::configuration::DecodeConfig;
use crate::decoder::{DecodeMethod, VideoBackend};
use crate::error::SampleError;
use crate::frame_grab_decoder::FrameGrabBackend;
use crate::native_decoder::NativeBackend;

/// Creates decode backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderFactory;

impl DecoderFactory {
    /// The backend for a concrete method. `None` for [`DecodeMethod::Auto`].
    pub fn backend(method: DecodeMethod) -> Option<Box<dyn VideoBackend>> {
        match method {
            DecodeMethod::Native => Some(Box::new(NativeBackend)),
            DecodeMethod::FrameGrab => Some(Box::new(FrameGrabBackend)),
            DecodeMethod::Codec => Some(Box::new(CodecBackend)),
            DecodeMethod::Auto => None,
        }
    }

    /// Resolve `Auto` for the given configuration. Concrete methods are
    /// returned unchanged.
    pub fn resolve(method: DecodeMethod, config: &DecodeConfig) -> DecodeMethod {
        if method != DecodeMethod::Auto {
            return method;
        }

        let needs_codec = config.has_time_window()
            || config.filter_expression().is_some()
            || config.keyframes_only()
            || config.gpu_id().is_some();
        if needs_codec {
            DecodeMethod::Codec
        } else {
            DecodeMethod::Native
        }
    }

    /// Create a backend, falling back across backends if the requested one
    /// is unavailable.
    ///
    /// # Errors
    ///
    /// [`SampleError::BackendUnavailable`] if no backend can run.
    pub fn create(
        method: DecodeMethod,
        config: &DecodeConfig,
    ) -> Result<Box<dyn VideoBackend>, SampleError> {
        let resolved = Self::resolve(method, config);
        if method == DecodeMethod::Auto {
            log::debug!("Auto-selected the {resolved} backend");
        }

        let preferred = std::iter::once(resolved).chain(
            DecodeMethod::CONCRETE
                .into_iter()
                .filter(move |&candidate| candidate != resolved),
        );

        for candidate in preferred {
            let Some(backend) = Self::backend(candidate) else {
                continue;
            };
            if backend.is_available() {
                if candidate != resolved {
                    log::warn!("The {resolved} backend is unavailable; using {candidate}");
                }
                return Ok(backend);
            }
            log::debug!("The {candidate} backend is unavailable");
        }

        Err(SampleError::BackendUnavailable(method))
    }

    /// Concrete methods whose backend can run in this environment.
    pub fn available_methods() -> Vec<DecodeMethod> {
        DecodeMethod::CONCRETE
            .into_iter()
            .filter(|&method| Self::backend(method).is_some_and(|backend| backend.is_available()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prefers_native_for_plain_sampling() {
        let config = DecodeConfig::new().with_target_fps(2.0);
        assert_eq!(
            DecoderFactory::resolve(DecodeMethod::Auto, &config),
            DecodeMethod::Native
        );
    }

    #[test]
    fn auto_picks_codec_when_its_capabilities_are_needed() {
        for config in [
            DecodeConfig::new().with_start_time(1.0),
            DecodeConfig::new().with_filter("hflip"),
            DecodeConfig::new().with_keyframes_only(true),
            DecodeConfig::new().with_gpu(0),
        ] {
            assert_eq!(
                DecoderFactory::resolve(DecodeMethod::Auto, &config),
                DecodeMethod::Codec
            );
        }
    }

    #[test]
    fn concrete_methods_are_not_rewritten() {
        let config = DecodeConfig::new().with_filter("vflip");
        assert_eq!(
            DecoderFactory::resolve(DecodeMethod::Native, &config),
            DecodeMethod::Native
        );
        assert!(DecoderFactory::backend(DecodeMethod::Auto).is_none());
        assert_eq!(
            DecoderFactory::backend(DecodeMethod::FrameGrab)
                .map(|backend| backend.method()),
            Some(DecodeMethod::FrameGrab)
        );
    }
}

//! Geometric filter pass-through.
//!
//! Only a small fixed set of FFmpeg filters is accepted: `scale`, `crop`,
//! `rotate`, `transpose`, `hflip` and `vflip`, joined into a single linear
//! chain with commas. [`FilterChain`] builds such an expression; the codec
//! backend runs it through an FFmpeg filter graph on every emitted frame,
//! before resizing.
//!
//! # Example
//!
//! ```
//! use vidsample::{FilterChain, TransposeDirection};
//!
//! let chain = FilterChain::new()
//!     .crop(0, 0, 1280, 720)
//!     .transpose(TransposeDirection::Clockwise)
//!     .horizontal_flip();
//! assert_eq!(chain.build(), "crop=1280:720:0:0,transpose=1,hflip");
//! ```

use ffmpeg_next::{Rational, filter::Graph as FilterGraph, frame::Video as VideoFrame};
use ffmpeg_sys_next::AVPixelFormat;

use crate::error::SampleError;

/// Filter names accepted in an expression.
pub const ALLOWED_FILTERS: &[&str] = &["scale", "crop", "rotate", "transpose", "hflip", "vflip"];

/// Rotation applied by `transpose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposeDirection {
    /// Rotate 90° counter-clockwise and flip vertically.
    CounterClockwiseFlip,
    /// Rotate 90° clockwise.
    Clockwise,
    /// Rotate 90° counter-clockwise.
    CounterClockwise,
    /// Rotate 90° clockwise and flip vertically.
    ClockwiseFlip,
}

impl TransposeDirection {
    fn code(self) -> u8 {
        match self {
            TransposeDirection::CounterClockwiseFlip => 0,
            TransposeDirection::Clockwise => 1,
            TransposeDirection::CounterClockwise => 2,
            TransposeDirection::ClockwiseFlip => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FilterStep {
    Scale { width: i32, height: i32 },
    Crop { x: u32, y: u32, width: u32, height: u32 },
    Rotate { degrees: f64 },
    Transpose(TransposeDirection),
    HorizontalFlip,
    VerticalFlip,
}

impl FilterStep {
    fn render(&self) -> String {
        match self {
            FilterStep::Scale { width, height } => format!("scale={width}:{height}"),
            FilterStep::Crop {
                x,
                y,
                width,
                height,
            } => format!("crop={width}:{height}:{x}:{y}"),
            FilterStep::Rotate { degrees } => {
                let radians = degrees.to_radians();
                format!("rotate={radians}:ow=rotw({radians}):oh=roth({radians})")
            }
            FilterStep::Transpose(direction) => format!("transpose={}", direction.code()),
            FilterStep::HorizontalFlip => "hflip".to_string(),
            FilterStep::VerticalFlip => "vflip".to_string(),
        }
    }
}

/// Builder for a geometric filter expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    steps: Vec<FilterStep>,
}

impl FilterChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale to `width` x `height`. Pass `-1` (or `-2` for an even result)
    /// for one side to keep the aspect ratio.
    #[must_use]
    pub fn scale(mut self, width: i32, height: i32) -> Self {
        self.steps.push(FilterStep::Scale { width, height });
        self
    }

    /// Crop a `width` x `height` region whose top-left corner is at
    /// `(x, y)`.
    #[must_use]
    pub fn crop(mut self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.steps.push(FilterStep::Crop {
            x,
            y,
            width,
            height,
        });
        self
    }

    /// Rotate clockwise by `degrees`, growing the canvas to fit.
    #[must_use]
    pub fn rotate(mut self, degrees: f64) -> Self {
        self.steps.push(FilterStep::Rotate { degrees });
        self
    }

    /// Rotate by a quarter turn.
    #[must_use]
    pub fn transpose(mut self, direction: TransposeDirection) -> Self {
        self.steps.push(FilterStep::Transpose(direction));
        self
    }

    /// Mirror left to right.
    #[must_use]
    pub fn horizontal_flip(mut self) -> Self {
        self.steps.push(FilterStep::HorizontalFlip);
        self
    }

    /// Mirror top to bottom.
    #[must_use]
    pub fn vertical_flip(mut self) -> Self {
        self.steps.push(FilterStep::VerticalFlip);
        self
    }

    /// Returns `true` if no step was added.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the chain as an FFmpeg filter expression.
    pub fn build(&self) -> String {
        self.steps
            .iter()
            .map(FilterStep::render)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Check that `expression` is a linear chain of allowed geometric filters.
pub fn validate_filter_expression(expression: &str) -> Result<(), SampleError> {
    if expression.contains(';') || expression.contains('[') {
        return Err(SampleError::InvalidConfig(format!(
            "filter expression must be a single linear chain: {expression}"
        )));
    }

    for segment in expression.split(',') {
        let name = segment.split('=').next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(SampleError::InvalidConfig(format!(
                "empty filter in expression: {expression}"
            )));
        }
        if !ALLOWED_FILTERS.contains(&name) {
            return Err(SampleError::InvalidConfig(format!(
                "unsupported filter '{name}' (allowed: {})",
                ALLOWED_FILTERS.join(", ")
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameShape {
    width: u32,
    height: u32,
    format: i32,
}

impl FrameShape {
    fn of(frame: &VideoFrame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            format: AVPixelFormat::from(frame.format()) as i32,
        }
    }
}

/// A `buffer -> expression -> buffersink` graph, built lazily from the first
/// frame so the source matches the decoder's real output format.
pub(crate) struct GeometricFilter {
    expression: String,
    time_base: Rational,
    graph: Option<(FilterGraph, FrameShape)>,
    filtered: VideoFrame,
}

impl GeometricFilter {
    pub(crate) fn new(expression: &str, time_base: Rational) -> Result<Self, SampleError> {
        validate_filter_expression(expression)?;
        Ok(Self {
            expression: expression.to_string(),
            time_base,
            graph: None,
            filtered: VideoFrame::empty(),
        })
    }

    /// Run one frame through the graph.
    ///
    /// Returns `None` if the graph produced no output for this frame.
    pub(crate) fn apply(&mut self, frame: &VideoFrame) -> Result<Option<VideoFrame>, SampleError> {
        let shape = FrameShape::of(frame);
        let rebuild = self
            .graph
            .as_ref()
            .is_none_or(|(_, built_for)| *built_for != shape);
        if rebuild {
            log::debug!(
                "Building filter graph '{}' for {}x{} (format {})",
                self.expression,
                shape.width,
                shape.height,
                shape.format
            );
            self.graph = Some((self.build_graph(shape)?, shape));
        }

        let Some((graph, _)) = self.graph.as_mut() else {
            return Ok(None);
        };

        graph
            .get("in")
            .ok_or_else(|| SampleError::FilterGraphError("filter 'in' not found".to_string()))?
            .source()
            .add(frame)
            .map_err(|e| SampleError::FilterGraphError(format!("failed to feed filter: {e}")))?;

        let received = graph
            .get("out")
            .ok_or_else(|| SampleError::FilterGraphError("filter 'out' not found".to_string()))?
            .sink()
            .frame(&mut self.filtered)
            .is_ok();

        if !received {
            return Ok(None);
        }

        let mut output = VideoFrame::empty();
        std::mem::swap(&mut output, &mut self.filtered);
        Ok(Some(output))
    }

    fn build_graph(&self, shape: FrameShape) -> Result<FilterGraph, SampleError> {
        let mut graph = FilterGraph::new();

        let buffer_args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1",
            shape.width,
            shape.height,
            shape.format,
            self.time_base.numerator(),
            self.time_base.denominator().max(1),
        );

        graph
            .add(
                &ffmpeg_next::filter::find("buffer").ok_or_else(|| {
                    SampleError::FilterGraphError("FFmpeg 'buffer' filter not found".to_string())
                })?,
                "in",
                &buffer_args,
            )
            .map_err(|e| SampleError::FilterGraphError(format!("failed to add buffer: {e}")))?;

        graph
            .add(
                &ffmpeg_next::filter::find("buffersink").ok_or_else(|| {
                    SampleError::FilterGraphError(
                        "FFmpeg 'buffersink' filter not found".to_string(),
                    )
                })?,
                "out",
                "",
            )
            .map_err(|e| {
                SampleError::FilterGraphError(format!("failed to add buffersink: {e}"))
            })?;

        graph
            .output("in", 0)
            .map_err(|e| SampleError::FilterGraphError(format!("graph output error: {e}")))?
            .input("out", 0)
            .map_err(|e| SampleError::FilterGraphError(format!("graph input error: {e}")))?
            .parse(&self.expression)
            .map_err(|e| SampleError::FilterGraphError(format!("graph parse error: {e}")))?;

        graph
            .validate()
            .map_err(|e| SampleError::FilterGraphError(format!("graph validation: {e}")))?;

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_filters_outside_the_geometric_set() {
        assert!(validate_filter_expression("scale=320:-2,hflip").is_ok());
        assert!(validate_filter_expression("eq=brightness=0.1").is_err());
        assert!(validate_filter_expression("scale=320:-2;vflip").is_err());
        assert!(validate_filter_expression("[in]hflip[out]").is_err());
        assert!(validate_filter_expression("hflip,,vflip").is_err());
    }

    #[test]
    fn rotate_renders_radians() {
        let expression = FilterChain::new().rotate(180.0).build();
        assert!(expression.starts_with("rotate=3.14159"));
        assert!(validate_filter_expression(&expression).is_ok());
    }
}

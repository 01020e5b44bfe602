//! Pixel-budget resizing.
//!
//! [`smart_resize`] picks output dimensions that keep the source aspect
//! ratio, are multiples of an alignment unit (the consumer's patch size), and
//! whose pixel count stays inside an optional `[min_pixels, max_pixels]`
//! budget. [`resize_image`] applies the result to a decoded frame.

use image::DynamicImage;
use image::imageops::FilterType;

/// Default alignment unit for output dimensions.
pub const PATCH_SIZE: u32 = 28;

/// Pixel budget applied to every decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeBounds {
    /// Lower bound on `width * height`. `None` disables upscaling.
    pub min_pixels: Option<u64>,
    /// Upper bound on `width * height`. `None` disables downscaling.
    pub max_pixels: Option<u64>,
    /// Output dimensions are multiples of this unit.
    pub alignment: u32,
}

impl Default for ResizeBounds {
    fn default() -> Self {
        Self {
            min_pixels: None,
            max_pixels: None,
            alignment: PATCH_SIZE,
        }
    }
}

impl ResizeBounds {
    /// Bounds with both limits set and the default alignment.
    pub fn new(min_pixels: u64, max_pixels: u64) -> Self {
        Self {
            min_pixels: Some(min_pixels),
            max_pixels: Some(max_pixels),
            alignment: PATCH_SIZE,
        }
    }

    /// Set the lower pixel bound.
    #[must_use]
    pub fn with_min_pixels(mut self, min_pixels: u64) -> Self {
        self.min_pixels = Some(min_pixels);
        self
    }

    /// Set the upper pixel bound.
    #[must_use]
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = Some(max_pixels);
        self
    }

    /// Set the alignment unit. Zero is treated as one.
    #[must_use]
    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    /// Output dimensions for a `width` x `height` source.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        smart_resize(
            width,
            height,
            self.min_pixels,
            self.max_pixels,
            self.alignment,
        )
    }
}

/// Compute aligned output dimensions inside a pixel budget.
///
/// Each side is first rounded to the nearest multiple of `alignment` (never
/// below one unit). If the result exceeds `max_pixels`, both sides are scaled
/// by `sqrt(w * h / max_pixels)` and floored to the alignment, and the longer
/// side is cut further when the one-unit minimum on the shorter side still
/// leaves it over budget. If it falls
/// below `min_pixels`, both sides are scaled by `sqrt(min_pixels / (w * h))`
/// and ceiled. Zero-sized inputs are returned unchanged.
///
/// The function is idempotent on sizes that are already aligned and within
/// budget.
///
/// # Example
///
/// ```
/// use vidsample::smart_resize;
///
/// // 1920x1080 squeezed under ~0.5 MP with 28-pixel alignment.
/// let (w, h) = smart_resize(1920, 1080, None, Some(512 * 28 * 28), 28);
/// assert_eq!((w % 28, h % 28), (0, 0));
/// assert!(u64::from(w) * u64::from(h) <= 512 * 28 * 28);
/// ```
pub fn smart_resize(
    width: u32,
    height: u32,
    min_pixels: Option<u64>,
    max_pixels: Option<u64>,
    alignment: u32,
) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let unit = f64::from(alignment.max(1));
    let w = f64::from(width);
    let h = f64::from(height);
    let area = w * h;

    let mut w_bar = align_round(w, unit);
    let mut h_bar = align_round(h, unit);
    let aligned_area = w_bar * h_bar;

    match (min_pixels, max_pixels) {
        (_, Some(max)) if max > 0 && aligned_area > max as f64 => {
            let beta = (area / max as f64).sqrt();
            w_bar = align_floor(w / beta, unit);
            h_bar = align_floor(h / beta, unit);
            // The one-unit floor can leave extreme aspect ratios over budget.
            let budget = max as f64;
            if w_bar * h_bar > budget {
                if w_bar >= h_bar {
                    w_bar = align_floor(budget / h_bar, unit);
                } else {
                    h_bar = align_floor(budget / w_bar, unit);
                }
            }
        }
        (Some(min), _) if min > 0 && aligned_area < min as f64 => {
            let beta = (min as f64 / area).sqrt();
            w_bar = align_ceil(w * beta, unit);
            h_bar = align_ceil(h * beta, unit);
        }
        _ => {}
    }

    (to_dimension(w_bar), to_dimension(h_bar))
}

/// Resize `image` to the dimensions chosen by `bounds`.
///
/// Returns the image untouched when it already has the target size.
pub fn resize_image(image: DynamicImage, bounds: &ResizeBounds) -> DynamicImage {
    let (width, height) = bounds.target_dimensions(image.width(), image.height());
    if (width, height) == (image.width(), image.height()) {
        return image;
    }

    log::trace!(
        "Resizing frame {}x{} -> {width}x{height}",
        image.width(),
        image.height()
    );
    image.resize_exact(width, height, FilterType::Lanczos3)
}

fn align_round(value: f64, unit: f64) -> f64 {
    ((value / unit).round_ties_even() * unit).max(unit)
}

fn align_floor(value: f64, unit: f64) -> f64 {
    ((value / unit).floor() * unit).max(unit)
}

fn align_ceil(value: f64, unit: f64) -> f64 {
    ((value / unit).ceil() * unit).max(unit)
}

fn to_dimension(value: f64) -> u32 {
    value.min(f64::from(u32::MAX)) as u32
}

//! Smart resizer tests.

use image::{DynamicImage, RgbImage};
use vidsample::{PATCH_SIZE, ResizeBounds, resize_image, smart_resize};

const MIN_PIXELS: u64 = 4 * 28 * 28;
const MAX_PIXELS: u64 = 768 * 28 * 28;

#[test]
fn patch_size_is_28() {
    assert_eq!(PATCH_SIZE, 28);
    assert_eq!(ResizeBounds::default().alignment, PATCH_SIZE);
    assert_eq!(ResizeBounds::new(1, 2).alignment, PATCH_SIZE);
}

#[test]
fn output_is_aligned_and_within_budget() {
    let sizes = [
        (1920, 1080),
        (1080, 1920),
        (640, 480),
        (3840, 2160),
        (333, 777),
        (28, 28),
        (100, 30),
    ];
    for (width, height) in sizes {
        let (w, h) = smart_resize(width, height, Some(MIN_PIXELS), Some(MAX_PIXELS), PATCH_SIZE);
        assert_eq!(w % PATCH_SIZE, 0, "{width}x{height} -> {w}x{h}");
        assert_eq!(h % PATCH_SIZE, 0, "{width}x{height} -> {w}x{h}");
        let area = u64::from(w) * u64::from(h);
        assert!(area <= MAX_PIXELS, "{width}x{height} -> {w}x{h}");
        assert!(area >= MIN_PIXELS, "{width}x{height} -> {w}x{h}");
    }
}

#[test]
fn downscale_keeps_aspect_ratio_roughly() {
    let (w, h) = smart_resize(1920, 1080, None, Some(512 * 28 * 28), PATCH_SIZE);
    assert_eq!((w, h), (840, 448));
}

#[test]
fn upscale_reaches_the_minimum() {
    let (w, h) = smart_resize(10, 10, Some(56 * 56), None, PATCH_SIZE);
    assert_eq!((w, h), (56, 56));
}

#[test]
fn alignment_only_rounds_to_nearest_unit() {
    assert_eq!(smart_resize(100, 50, None, None, PATCH_SIZE), (112, 56));
    assert_eq!(smart_resize(5, 5, None, None, PATCH_SIZE), (28, 28));
}

#[test]
fn resize_is_idempotent() {
    for (width, height) in [(1920, 1080), (640, 360), (10, 10), (4000, 30)] {
        let first = smart_resize(width, height, Some(MIN_PIXELS), Some(MAX_PIXELS), PATCH_SIZE);
        let second = smart_resize(first.0, first.1, Some(MIN_PIXELS), Some(MAX_PIXELS), PATCH_SIZE);
        assert_eq!(first, second, "{width}x{height}");
    }
}

#[test]
fn zero_sized_input_is_returned_unchanged() {
    assert_eq!(smart_resize(0, 480, None, Some(MAX_PIXELS), PATCH_SIZE), (0, 480));
}

#[test]
fn resize_image_applies_bounds() {
    let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
    let resized = resize_image(image, &ResizeBounds::default());
    assert_eq!((resized.width(), resized.height()), (56, 56));

    let image = DynamicImage::ImageRgb8(RgbImage::new(56, 56));
    let same = resize_image(image, &ResizeBounds::default());
    assert_eq!((same.width(), same.height()), (56, 56));
}

#[test]
fn custom_alignment() {
    let bounds = ResizeBounds::default().with_alignment(16).with_max_pixels(256 * 256);
    let (w, h) = bounds.target_dimensions(1280, 720);
    assert_eq!((w % 16, h % 16), (0, 0));
    assert!(u64::from(w) * u64::from(h) <= 256 * 256);
}

#[test]
fn extreme_aspect_ratios_stay_within_budget() {
    let budget = 28 * 28;
    assert_eq!(smart_resize(100, 10, None, Some(budget), PATCH_SIZE), (28, 28));
    assert_eq!(smart_resize(1, 5000, None, Some(budget), PATCH_SIZE), (28, 28));

    let (w, h) = smart_resize(20000, 20, None, Some(4 * budget), PATCH_SIZE);
    assert_eq!((w, h), (112, 28));

    for (width, height) in [(100, 10), (1, 5000), (20000, 20)] {
        let first = smart_resize(width, height, None, Some(budget), PATCH_SIZE);
        let second = smart_resize(first.0, first.1, None, Some(budget), PATCH_SIZE);
        assert_eq!(first, second, "{width}x{height}");
    }
}

#[test]
fn budget_below_one_unit_yields_a_single_unit() {
    assert_eq!(smart_resize(500, 50, None, Some(100), PATCH_SIZE), (28, 28));
}

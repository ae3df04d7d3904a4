use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{self, ThresholdType};
use imageproc::definitions::Image;
use imageproc::filter::{box_filter, filter3x3};
use imageproc::map::map_subpixels;

/// 3×3 edge-emphasis (Laplacian-style) kernel.
pub const EDGE_KERNEL: [i32; 9] = [-1, -1, -1, -1, 8, -1, -1, -1, -1];

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Box blur with a (2r+1)×(2r+1) window
pub fn apply_blur(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    box_filter(img, radius, radius)
}

/// Signed 3×3 edge-kernel response, borders replicated.
fn kernel_response(img: &GrayImage) -> Image<Luma<i16>> {
    filter3x3::<_, i32, i16>(img, &EDGE_KERNEL)
}

/// Edge-kernel response clamped to the displayable range.
pub fn edge_response(img: &GrayImage) -> GrayImage {
    map_subpixels(&kernel_response(img), |r: i16| r.clamp(0, 255) as u8)
}

/// Binary edge map: 255 where the response reaches `threshold`, 0 elsewhere.
///
/// `ThresholdType::Binary` is strictly greater-than, so the cut is shifted
/// down by one; a zero threshold marks every pixel.
pub fn threshold(img: &GrayImage, threshold: u8) -> GrayImage {
    match threshold.checked_sub(1) {
        Some(cut) => contrast::threshold(img, cut, ThresholdType::Binary),
        None => GrayImage::from_pixel(img.width(), img.height(), Luma([255u8])),
    }
}

/// Full preprocessing chain used by both locators.
pub fn detect_edges(gray: &GrayImage, blur_radius: u32, edge_threshold: u8) -> GrayImage {
    let blurred = apply_blur(gray, blur_radius);
    let response = edge_response(&blurred);
    threshold(&response, edge_threshold)
}

/// Sharpness score: intensity standard deviation plus the mean absolute
/// edge-kernel response, where the response is offset to 128 and clamped to
/// a byte before measuring its distance from 128.
pub fn sharpness(gray: &GrayImage) -> f64 {
    let count = gray.width() as f64 * gray.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for pixel in gray.pixels() {
        let v = pixel[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / count;
    let variance = (sum_sq / count - mean * mean).max(0.0);

    let edge_sum: f64 = kernel_response(gray)
        .pixels()
        .map(|p| ((p[0] as i32 + 128).clamp(0, 255) - 128).abs() as f64)
        .sum();

    variance.sqrt() + edge_sum / count
}

use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;
use volumescan::RawImageInput;

/// Traced outline of a filled block: `(left, top, right, bottom)`.
///
/// The block itself is painted one pixel wider on every side, which is where
/// the edge detector puts the outline after blurring.
pub type Outline = (u32, u32, u32, u32);

/// Reference sheet whose outline is 300×212 px (landscape A4 shape).
pub const REFERENCE: Outline = (100, 30, 400, 242);

/// Square package outline of 400×400 px, clear of the reference. The left
/// edge and top row sit on both locators' sampling grids.
pub const PACKAGE: Outline = (330, 360, 730, 760);

/// Black canvas with filled white blocks.
pub fn render_scene(width: u32, height: u32, outlines: &[Outline]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let inside = outlines
            .iter()
            .any(|&(l, t, r, b)| x + 1 >= l && x <= r + 1 && y + 1 >= t && y <= b + 1);
        if inside { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
    })
}

pub fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format)
        .expect("Failed to encode test image");
    out.into_inner()
}

/// The standard 800×800 scene: one reference sheet and one package.
pub fn standard_scene_png() -> Vec<u8> {
    encode(&render_scene(800, 800, &[REFERENCE, PACKAGE]), ImageFormat::Png)
}

pub fn scene_input(outlines: &[Outline]) -> RawImageInput {
    RawImageInput::from_bytes(encode(&render_scene(800, 800, outlines), ImageFormat::Png))
}

/// Uniform mid-grey frame: passes format and size checks, fails sharpness.
pub fn flat_gray_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([128u8]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode test image");
    out.into_inner()
}

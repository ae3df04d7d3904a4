use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

use crate::config::AdmissionConfig;
use crate::detection::preprocessing;
use crate::error::{ErrorCode, StageFailure, StageResult};
use crate::models::{AdmittedImage, ImageFormatTag, ImagePayload};

/// Turn the payload into raw image bytes, stripping any `data:` URL prefix.
pub fn payload_bytes(payload: &ImagePayload) -> StageResult<Vec<u8>> {
    match payload {
        ImagePayload::Binary(bytes) => Ok(bytes.clone()),
        ImagePayload::Encoded(text) => {
            let trimmed = text.trim();
            let body = match trimmed.strip_prefix("data:") {
                Some(rest) => rest.split_once(',').map(|(_, data)| data).ok_or_else(|| {
                    StageFailure::new(
                        ErrorCode::InvalidImageFormat,
                        "Malformed data URL: missing ',' before the image data",
                    )
                })?,
                None => trimmed,
            };
            STANDARD.decode(body.trim()).map_err(|e| {
                StageFailure::new(
                    ErrorCode::InvalidImageFormat,
                    format!("Image data is not valid base64: {}", e),
                )
            })
        }
    }
}

fn format_tag(format: ImageFormat) -> Option<ImageFormatTag> {
    match format {
        ImageFormat::Jpeg => Some(ImageFormatTag::Jpeg),
        ImageFormat::Png => Some(ImageFormatTag::Png),
        ImageFormat::WebP => Some(ImageFormatTag::Webp),
        _ => None,
    }
}

fn check_dimension(axis: &str, value: u32, config: &AdmissionConfig) -> StageResult<()> {
    if value < config.min_dimension {
        return Err(StageFailure::new(
            ErrorCode::ImageTooSmall,
            format!(
                "Image {} is {}px, minimum is {}px",
                axis, value, config.min_dimension
            ),
        ));
    }
    if value > config.max_dimension {
        return Err(StageFailure::new(
            ErrorCode::ImageTooLarge,
            format!(
                "Image {} is {}px, maximum is {}px",
                axis, value, config.max_dimension
            ),
        ));
    }
    Ok(())
}

/// Decode the photo and enforce the format, size and sharpness gates.
pub fn admit_image(bytes: &[u8], config: &AdmissionConfig) -> StageResult<AdmittedImage> {
    let invalid = |detail: String| {
        StageFailure::new(
            ErrorCode::InvalidImageFormat,
            format!("Unsupported or unreadable image ({}). Use JPEG, PNG or WebP", detail),
        )
    };

    let format = image::guess_format(bytes).map_err(|e| invalid(e.to_string()))?;
    let tag = format_tag(format).ok_or_else(|| invalid(format!("{:?}", format)))?;

    // Header-only read so oversized uploads are rejected before decoding.
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| invalid(e.to_string()))?;
    check_dimension("width", width, config)?;
    check_dimension("height", height, config)?;

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| invalid(e.to_string()))?;
    let gray = preprocessing::to_grayscale(&decoded);
    let sharpness = preprocessing::sharpness(&gray);
    debug!(width, height, ?tag, sharpness, "Decoded image");

    if sharpness < config.min_sharpness {
        return Err(StageFailure::new(
            ErrorCode::ImageBlurry,
            format!(
                "Image sharpness {:.1} is below the minimum of {:.1}. Hold the camera steady \
                 and make sure the package is in focus",
                sharpness, config.min_sharpness
            ),
        ));
    }

    Ok(AdmittedImage {
        gray,
        width,
        height,
        format: tag,
        sharpness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn encode(img: &GrayImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn stripes(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| if (x / 40) % 2 == 0 { Luma([0]) } else { Luma([255]) })
    }

    #[test]
    fn test_sharp_png_is_admitted() {
        let bytes = encode(&stripes(800, 640), ImageFormat::Png);
        let admitted = admit_image(&bytes, &AdmissionConfig::default()).unwrap();
        assert_eq!((admitted.width, admitted.height), (800, 640));
        assert_eq!(admitted.format, ImageFormatTag::Png);
        assert!(admitted.sharpness >= 100.0);
    }

    #[test]
    fn test_lossless_webp_is_admitted() {
        let bytes = encode(&stripes(700, 660), ImageFormat::WebP);
        let admitted = admit_image(&bytes, &AdmissionConfig::default()).unwrap();
        assert_eq!((admitted.width, admitted.height), (700, 660));
        assert_eq!(admitted.format, ImageFormatTag::Webp);
        assert!(admitted.sharpness >= 100.0);
    }

    #[test]
    fn test_dimension_bounds_are_inclusive() {
        let config = AdmissionConfig::default();
        assert!(check_dimension("width", 640, &config).is_ok());
        assert!(check_dimension("width", 4096, &config).is_ok());
        assert_eq!(check_dimension("width", 639, &config).unwrap_err().code, ErrorCode::ImageTooSmall);
        assert_eq!(check_dimension("height", 4097, &config).unwrap_err().code, ErrorCode::ImageTooLarge);
    }

    #[test]
    fn test_small_image_reports_value_and_bound() {
        let bytes = encode(&stripes(320, 700), ImageFormat::Png);
        let err = admit_image(&bytes, &AdmissionConfig::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ImageTooSmall);
        assert!(err.message.contains("320"));
        assert!(err.message.contains("640"));
    }

    #[test]
    fn test_flat_image_is_blurry() {
        let bytes = encode(&GrayImage::from_pixel(800, 800, Luma([128])), ImageFormat::Png);
        let err = admit_image(&bytes, &AdmissionConfig::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ImageBlurry);
        assert!(err.message.contains("0.0"));
    }

    #[test]
    fn test_garbage_bytes_are_invalid() {
        let err = admit_image(b"definitely not an image", &AdmissionConfig::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidImageFormat);
    }

    #[test]
    fn test_unsupported_format_is_invalid() {
        let bytes = encode(&stripes(800, 800), ImageFormat::Bmp);
        let err = admit_image(&bytes, &AdmissionConfig::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidImageFormat);
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let raw = vec![1u8, 2, 3, 250];
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(&raw));
        assert_eq!(payload_bytes(&ImagePayload::Encoded(encoded)).unwrap(), raw);
        let bare = STANDARD.encode(&raw);
        assert_eq!(payload_bytes(&ImagePayload::Encoded(bare)).unwrap(), raw);
    }

    #[test]
    fn test_bad_base64_is_invalid_format() {
        let err = payload_bytes(&ImagePayload::Encoded("data:image/png;base64,@@@".to_string()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidImageFormat);
    }
}

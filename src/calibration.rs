use crate::config::ReferenceSheet;
use crate::error::{StageFailure, StageResult};
use crate::models::{ReferenceDetection, ScaleCalibration};

/// Lowest confidence the skew penalty alone can produce.
const MIN_SKEW_FACTOR: f64 = 0.5;

/// Derive pixels-per-millimetre from the detected reference sheet.
///
/// The longer detected side maps to the sheet's long edge. Disagreement
/// between the two sides indicates perspective skew and lowers the
/// confidence. The per-axis scales follow the box's orientation in the frame.
pub fn calibrate(reference: &ReferenceDetection, sheet: &ReferenceSheet) -> StageResult<ScaleCalibration> {
    let (long_px, short_px) = (reference.width_px, reference.height_px);
    if short_px <= 0.0 {
        return Err(StageFailure::processing(format!(
            "reference rectangle is degenerate ({}x{} px)",
            long_px, short_px
        )));
    }

    let px_per_mm_long = long_px / sheet.long_side_mm;
    let px_per_mm_short = short_px / sheet.short_side_mm;
    let px_per_mm = (px_per_mm_long + px_per_mm_short) / 2.0;

    let rectangle = reference.rectangle;
    let (px_per_mm_x, px_per_mm_y) = if rectangle.width() > rectangle.height() {
        (px_per_mm_long, px_per_mm_short)
    } else {
        (px_per_mm_short, px_per_mm_long)
    };

    let skew = (px_per_mm_long - px_per_mm_short).abs() / px_per_mm;
    let confidence = (1.0 - skew).max(MIN_SKEW_FACTOR) * rectangle.confidence;

    Ok(ScaleCalibration {
        px_per_mm_x,
        px_per_mm_y,
        px_per_mm,
        reference: rectangle,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectedRectangle;

    const EPS: f64 = 1e-9;

    fn detection(min_x: f64, min_y: f64, max_x: f64, max_y: f64, confidence: f64) -> ReferenceDetection {
        ReferenceDetection::from_rectangle(DetectedRectangle::axis_aligned(
            min_x, min_y, max_x, max_y, confidence,
        ))
    }

    #[test]
    fn test_landscape_sheet() {
        let rect = detection(0.0, 0.0, 297.0, 210.0, 1.0);
        let cal = calibrate(&rect, &ReferenceSheet::default()).unwrap();
        assert!((cal.px_per_mm_x - 1.0).abs() < EPS);
        assert!((cal.px_per_mm_y - 1.0).abs() < EPS);
        assert!((cal.px_per_mm - 1.0).abs() < EPS);
        assert!((cal.confidence - 1.0).abs() < EPS);
    }

    #[test]
    fn test_portrait_sheet_maps_width_to_short_side() {
        let rect = detection(10.0, 10.0, 430.0, 604.0, 0.9);
        let cal = calibrate(&rect, &ReferenceSheet::default()).unwrap();
        assert!((cal.px_per_mm_x - 420.0 / 210.0).abs() < EPS);
        assert!((cal.px_per_mm_y - 594.0 / 297.0).abs() < EPS);
        assert!((cal.px_per_mm - 2.0).abs() < EPS);
        assert!((cal.confidence - 0.9).abs() < EPS);
    }

    #[test]
    fn test_skew_lowers_confidence() {
        // x says 1.0 px/mm, y says 1.2 px/mm.
        let rect = detection(0.0, 0.0, 297.0, 252.0, 1.0);
        assert_eq!((rect.width_px, rect.height_px), (297.0, 252.0));
        let cal = calibrate(&rect, &ReferenceSheet::default()).unwrap();
        let expected = 1.0 - 0.2 / 1.1;
        assert!((cal.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_skew_penalty_is_floored() {
        let rect = detection(0.0, 0.0, 297.0, 209.0 * 4.0, 0.8);
        let cal = calibrate(&rect, &ReferenceSheet::default()).unwrap();
        assert!((cal.confidence - 0.4).abs() < EPS);
    }

    #[test]
    fn test_degenerate_reference_is_processing_error() {
        let rect = detection(5.0, 5.0, 5.0, 50.0, 1.0);
        assert_eq!(rect.width_px, 45.0);
        let err = calibrate(&rect, &ReferenceSheet::default()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ProcessingError);
    }
}

use image::GrayImage;
use tracing::debug;

use crate::config::ReferenceLocatorConfig;
use crate::detection::contours::{TracedRegion, trace_regions};
use crate::detection::preprocessing;
use crate::error::{ErrorCode, StageFailure, StageResult};
use crate::models::{DetectedRectangle, ReferenceDetection};

/// Share of traced points lying within `proximity` of the box outline,
/// normalised so that `fraction` of the points on the edge already scores 1.
fn edge_fit_confidence(region: &TracedRegion, proximity: f64, fraction: f64) -> f64 {
    let (min_x, min_y) = (region.min_x as f64, region.min_y as f64);
    let (max_x, max_y) = (region.max_x as f64, region.max_y as f64);

    let on_edge = region
        .points
        .iter()
        .filter(|&&(x, y)| {
            let (x, y) = (x as f64, y as f64);
            (x - min_x).abs() <= proximity
                || (x - max_x).abs() <= proximity
                || (y - min_y).abs() <= proximity
                || (y - max_y).abs() <= proximity
        })
        .count();

    let expected = (fraction * region.point_count() as f64).max(1.0);
    (on_edge as f64 / expected).min(1.0)
}

/// Whether the box matches the sheet's aspect ratio in either orientation.
pub fn matches_aspect(width: f64, height: f64, target: f64, tolerance: f64) -> bool {
    if width <= 0.0 || height <= 0.0 {
        return false;
    }
    let within = |ratio: f64| ((ratio - target) / target).abs() <= tolerance;
    within(width / height) || within(height / width)
}

/// Rectangles in the frame shaped and sized like the reference sheet.
pub fn find_reference_candidates(
    gray: &GrayImage,
    config: &ReferenceLocatorConfig,
) -> Vec<DetectedRectangle> {
    let image_area = gray.width() as f64 * gray.height() as f64;
    let edges = preprocessing::detect_edges(
        gray,
        config.tracing.blur_radius,
        config.tracing.edge_threshold,
    );
    let regions = trace_regions(&edges, &config.tracing);
    debug!(regions = regions.len(), "Traced reference regions");

    regions
        .iter()
        .filter(|r| !r.is_degenerate())
        .filter(|r| {
            let fraction = r.area() / image_area;
            fraction >= config.min_area_fraction && fraction <= config.max_area_fraction
        })
        .filter(|r| {
            matches_aspect(
                r.width() as f64,
                r.height() as f64,
                config.target_aspect_ratio,
                config.aspect_tolerance,
            )
        })
        .map(|r| {
            let confidence =
                edge_fit_confidence(r, config.edge_proximity_px, config.edge_point_fraction);
            r.to_rectangle(confidence)
        })
        .collect()
}

/// Locate exactly one reference sheet.
pub fn locate_reference(
    gray: &GrayImage,
    config: &ReferenceLocatorConfig,
) -> StageResult<ReferenceDetection> {
    let mut candidates = find_reference_candidates(gray, config);
    debug!(candidates = candidates.len(), "Reference candidates after shape filtering");

    match candidates.len() {
        0 => Err(StageFailure::new(
            ErrorCode::NoReferenceDetected,
            "No reference sheet detected. Place an A4 sheet fully visible next to the package \
             and retake the photo",
        )),
        1 => Ok(ReferenceDetection::from_rectangle(candidates.remove(0))),
        n => Err(StageFailure::new(
            ErrorCode::MultipleReferencesDetected,
            format!(
                "Detected {} reference-like rectangles, expected exactly 1. Remove other \
                 sheet-shaped objects from the frame and retake the photo",
                n
            ),
        )),
    }
}

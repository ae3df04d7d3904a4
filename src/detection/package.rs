use image::GrayImage;
use tracing::debug;

use crate::config::PackageLocatorConfig;
use crate::detection::contours::trace_regions;
use crate::detection::preprocessing;
use crate::error::{ErrorCode, StageFailure, StageResult};
use crate::height::HeightEstimator;
use crate::models::{DetectedRectangle, PackageMeasurement};

/// A traced footprint that may be the package.
#[derive(Debug, Clone)]
pub struct PackageCandidate {
    pub rectangle: DetectedRectangle,
    pub point_count: usize,
}

impl PackageCandidate {
    pub fn area(&self) -> f64 {
        self.rectangle.area()
    }
}

/// Confidence from how densely the outline was traced.
pub fn density_confidence(point_count: usize, area: f64, scale: f64) -> f64 {
    if area <= 0.0 {
        return 0.0;
    }
    (point_count as f64 / area * scale).min(1.0)
}

pub fn find_package_candidates(
    gray: &GrayImage,
    config: &PackageLocatorConfig,
) -> Vec<PackageCandidate> {
    let edges = preprocessing::detect_edges(
        gray,
        config.tracing.blur_radius,
        config.tracing.edge_threshold,
    );
    let regions = trace_regions(&edges, &config.tracing);
    debug!(regions = regions.len(), "Traced package regions");

    regions
        .into_iter()
        .filter(|r| !r.is_degenerate())
        .map(|r| {
            let confidence = density_confidence(r.point_count(), r.area(), config.density_scale);
            PackageCandidate {
                rectangle: r.to_rectangle(confidence),
                point_count: r.point_count(),
            }
        })
        .collect()
}

/// Pick the package footprint among the candidates.
///
/// Candidates that mostly cover the reference sheet are the sheet itself and
/// are dropped. The rest must be at least `min_area_vs_reference` of the
/// sheet, the largest must not fill the frame, and the runner-up must be
/// clearly smaller than the winner.
pub fn select_package(
    candidates: Vec<PackageCandidate>,
    reference: &DetectedRectangle,
    image_area: f64,
    config: &PackageLocatorConfig,
) -> StageResult<PackageCandidate> {
    let reference_area = reference.area();
    if reference_area <= 0.0 {
        return Err(StageFailure::processing("reference rectangle has no area"));
    }

    let mut remaining: Vec<PackageCandidate> = candidates
        .into_iter()
        .filter(|c| {
            c.rectangle.intersection_area(reference) / reference_area
                <= config.max_reference_overlap
        })
        .filter(|c| c.area() / reference_area >= config.min_area_vs_reference)
        .collect();

    if remaining.is_empty() {
        return Err(StageFailure::new(
            ErrorCode::NoPackageDetected,
            format!(
                "No package detected. The package outline must cover at least {:.0}% of the \
                 reference sheet's area; move the camera closer and retake the photo",
                config.min_area_vs_reference * 100.0
            ),
        ));
    }

    remaining.sort_by(|a, b| b.area().total_cmp(&a.area()));

    let largest = remaining.remove(0);
    let frame_share = largest.area() / image_area;
    if frame_share > config.max_area_vs_image {
        return Err(StageFailure::new(
            ErrorCode::AmbiguousPackage,
            format!(
                "Package fills {:.0}% of the frame (maximum {:.0}%). Step back so the package \
                 and the reference sheet are both fully visible",
                frame_share * 100.0,
                config.max_area_vs_image * 100.0
            ),
        ));
    }

    if let Some(runner_up) = remaining.first() {
        let ratio = runner_up.area() / largest.area();
        if ratio > config.ambiguity_ratio {
            return Err(StageFailure::new(
                ErrorCode::AmbiguousPackage,
                format!(
                    "Found {} package-sized objects; the second largest is {:.0}% of the \
                     largest (maximum {:.0}%). Photograph one package at a time",
                    remaining.len() + 1,
                    ratio * 100.0,
                    config.ambiguity_ratio * 100.0
                ),
            ));
        }
    }

    Ok(largest)
}

/// Locate the package footprint and turn it into pixel measurements.
pub fn locate_package(
    gray: &GrayImage,
    reference: &DetectedRectangle,
    config: &PackageLocatorConfig,
    height_estimator: &dyn HeightEstimator,
) -> StageResult<PackageMeasurement> {
    let image_area = gray.width() as f64 * gray.height() as f64;
    let candidates = find_package_candidates(gray, config);
    debug!(candidates = candidates.len(), "Package candidates before selection");

    let chosen = select_package(candidates, reference, image_area, config)?;
    let rectangle = chosen.rectangle;
    let (w, h) = (rectangle.width(), rectangle.height());

    Ok(PackageMeasurement {
        rectangle,
        length_px: w.max(h),
        width_px: w.min(h),
        height_px: height_estimator.estimate_height_px(&rectangle),
        confidence: rectangle.confidence,
    })
}

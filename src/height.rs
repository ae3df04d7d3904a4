//! Package height estimation.
//!
//! A single top-down photo does not show the package's height. The default
//! estimator is a placeholder heuristic; a second viewpoint, shadow analysis
//! or a depth sensor can be plugged in by implementing [`HeightEstimator`].

use crate::models::DetectedRectangle;

pub trait HeightEstimator: Send + Sync {
    /// Estimated height in pixels, in the same scale as the footprint.
    fn estimate_height_px(&self, footprint: &DetectedRectangle) -> f64;

    fn name(&self) -> &str;
}

/// Half of the footprint's shorter side.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfShortSide;

impl HeightEstimator for HalfShortSide {
    fn estimate_height_px(&self, footprint: &DetectedRectangle) -> f64 {
        0.5 * footprint.width().min(footprint.height())
    }

    fn name(&self) -> &str {
        "half-short-side"
    }
}

use crate::error::{StageFailure, StageResult};
use crate::models::{DimensionEstimate, DimensionsMm, PackageMeasurement};

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Convert pixel measurements to millimetres, volume and volumetric weight.
pub fn compute_dimensions(
    package: &PackageMeasurement,
    px_per_mm: f64,
    volumetric_divisor: f64,
) -> StageResult<DimensionEstimate> {
    if !px_per_mm.is_finite() || px_per_mm <= 0.0 {
        return Err(StageFailure::processing(format!("invalid scale {} px/mm", px_per_mm)));
    }

    let to_mm = |px: f64| (px / px_per_mm).round() as i64;
    let dimensions_mm = DimensionsMm {
        length: to_mm(package.length_px),
        width: to_mm(package.width_px),
        height: to_mm(package.height_px),
    };

    let volume_mm3 = dimensions_mm.length as f64 * dimensions_mm.width as f64 * dimensions_mm.height as f64;
    let volume_cm3 = (volume_mm3 / 1000.0).round() as i64;
    let weight_kg = round_to(volume_cm3 as f64 / volumetric_divisor, 2);

    Ok(DimensionEstimate {
        dimensions_mm,
        volume_cm3,
        weight_kg,
    })
}

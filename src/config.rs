use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScanError;

/// Tuned constants for every pipeline stage.
///
/// Defaults reproduce the calibrated behaviour of the classical detector.
/// Any subset may be overridden from a JSON file; missing keys keep their
/// default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub model_name: String,
    pub model_version: String,
    pub admission: AdmissionConfig,
    pub reference_sheet: ReferenceSheet,
    pub reference: ReferenceLocatorConfig,
    pub package: PackageLocatorConfig,
    pub confidence: ConfidenceConfig,
    /// Air-freight volumetric divisor (cm³ per kg).
    pub volumetric_divisor: f64,
    /// Upper bound on scans running at once in [`crate::ScanService`].
    /// `None` means one per available CPU.
    pub max_concurrent_scans: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub min_sharpness: f64,
}

/// Physical size of the calibration sheet (A4 unless overridden).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSheet {
    pub short_side_mm: f64,
    pub long_side_mm: f64,
}

/// Edge-map and flood-fill parameters shared by both locators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub blur_radius: u32,
    pub edge_threshold: u8,
    pub grid_stride: u32,
    pub flood_step: u32,
    pub max_region_points: usize,
    pub min_region_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLocatorConfig {
    pub tracing: TracingConfig,
    /// Short side / long side of the sheet.
    pub target_aspect_ratio: f64,
    pub aspect_tolerance: f64,
    pub min_area_fraction: f64,
    pub max_area_fraction: f64,
    /// Distance (px) within which a traced point counts as lying on the box edge.
    pub edge_proximity_px: f64,
    pub edge_point_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageLocatorConfig {
    pub tracing: TracingConfig,
    /// Candidates covering more than this share of the reference are the reference itself.
    pub max_reference_overlap: f64,
    pub min_area_vs_reference: f64,
    pub max_area_vs_image: f64,
    pub ambiguity_ratio: f64,
    pub density_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub reference_weight: f64,
    pub bounding_box_weight: f64,
    pub edge_clarity_weight: f64,
    /// Sharpness that maps to an edge-clarity factor of 1.0.
    pub sharpness_normalizer: f64,
    pub review_threshold: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            model_name: "volumescan-classical-cv".to_string(),
            model_version: "1.0.0".to_string(),
            admission: AdmissionConfig::default(),
            reference_sheet: ReferenceSheet::default(),
            reference: ReferenceLocatorConfig::default(),
            package: PackageLocatorConfig::default(),
            confidence: ConfidenceConfig::default(),
            volumetric_divisor: 5000.0,
            max_concurrent_scans: None,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_dimension: 640,
            max_dimension: 4096,
            min_sharpness: 100.0,
        }
    }
}

impl Default for ReferenceSheet {
    fn default() -> Self {
        Self {
            short_side_mm: 210.0,
            long_side_mm: 297.0,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            blur_radius: 1,
            edge_threshold: 50,
            grid_stride: 10,
            flood_step: 2,
            max_region_points: 1000,
            min_region_points: 1,
        }
    }
}

impl Default for ReferenceLocatorConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::default(),
            target_aspect_ratio: 0.707,
            aspect_tolerance: 0.15,
            min_area_fraction: 0.03,
            max_area_fraction: 0.50,
            edge_proximity_px: 5.0,
            edge_point_fraction: 0.3,
        }
    }
}

impl Default for PackageLocatorConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig {
                edge_threshold: 100,
                grid_stride: 15,
                max_region_points: 2000,
                min_region_points: 10,
                ..TracingConfig::default()
            },
            max_reference_overlap: 0.50,
            min_area_vs_reference: 0.10,
            max_area_vs_image: 0.80,
            ambiguity_ratio: 0.70,
            density_scale: 1000.0,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            reference_weight: 0.40,
            bounding_box_weight: 0.35,
            edge_clarity_weight: 0.25,
            sharpness_normalizer: 200.0,
            review_threshold: 0.70,
        }
    }
}

impl ScanConfig {
    /// Load a config from a JSON file, filling unspecified keys with defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: ScanConfig =
            serde_json::from_str(&text).map_err(|source| ScanError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a stage divide by zero or loop forever.
    pub fn validate(&self) -> Result<(), ScanError> {
        for (name, tracing) in [
            ("reference", &self.reference.tracing),
            ("package", &self.package.tracing),
        ] {
            if tracing.grid_stride == 0 || tracing.flood_step == 0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{} locator grid_stride and flood_step must be positive",
                    name
                )));
            }
        }
        if self.reference_sheet.short_side_mm <= 0.0 || self.reference_sheet.long_side_mm <= 0.0 {
            return Err(ScanError::InvalidConfig(
                "reference sheet dimensions must be positive".to_string(),
            ));
        }
        if self.admission.min_dimension > self.admission.max_dimension {
            return Err(ScanError::InvalidConfig(format!(
                "min_dimension {} exceeds max_dimension {}",
                self.admission.min_dimension, self.admission.max_dimension
            )));
        }
        if self.volumetric_divisor <= 0.0 || self.confidence.sharpness_normalizer <= 0.0 {
            return Err(ScanError::InvalidConfig(
                "volumetric_divisor and sharpness_normalizer must be positive".to_string(),
            ));
        }
        if self.max_concurrent_scans == Some(0) {
            return Err(ScanError::InvalidConfig(
                "max_concurrent_scans must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibrated_constants() {
        let config = ScanConfig::default();
        assert_eq!(config.reference.tracing.grid_stride, 10);
        assert_eq!(config.reference.tracing.max_region_points, 1000);
        assert_eq!(config.reference.tracing.edge_threshold, 50);
        assert_eq!(config.package.tracing.grid_stride, 15);
        assert_eq!(config.package.tracing.max_region_points, 2000);
        assert_eq!(config.package.tracing.edge_threshold, 100);
        assert_eq!(config.package.tracing.min_region_points, 10);
        assert_eq!(config.package.tracing.flood_step, 2);
        assert_eq!(config.model_name, "volumescan-classical-cv");
        assert_eq!(config.model_version, "1.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{ "package": { "ambiguity_ratio": 0.6 } }"#).unwrap();
        assert_eq!(config.package.ambiguity_ratio, 0.6);
        assert_eq!(config.package.tracing.grid_stride, 15);
        assert_eq!(config.admission.min_sharpness, 100.0);
    }

    #[test]
    fn test_zero_stride_rejected() {
        let mut config = ScanConfig::default();
        config.package.tracing.grid_stride = 0;
        assert!(matches!(config.validate(), Err(ScanError::InvalidConfig(_))));
    }
}

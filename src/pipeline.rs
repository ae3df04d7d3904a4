use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

use crate::admission::{admit_image, payload_bytes};
use crate::calibration::calibrate;
use crate::confidence::{assess, edge_clarity};
use crate::config::ScanConfig;
use crate::detection::{locate_package, locate_reference};
use crate::dimensions::compute_dimensions;
use crate::error::{StageFailure, StageResult};
use crate::height::{HalfShortSide, HeightEstimator};
use crate::models::{
    ConfidenceAssessment, ConfidenceFactors, DimensionEstimate, PipelineResult, RawImageInput,
    ScanFailure, ScanSuccess,
};

/// States the orchestrator moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Admitting,
    LocatingReference,
    Calibrating,
    LocatingPackage,
    ComputingDimensions,
    ScoringConfidence,
    Done,
}

impl PipelineStage {
    /// Human-readable name for this stage (used in log output)
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Admitting => "Image Admission",
            PipelineStage::LocatingReference => "Reference Detection",
            PipelineStage::Calibrating => "Scale Calibration",
            PipelineStage::LocatingPackage => "Package Detection",
            PipelineStage::ComputingDimensions => "Dimension Calculation",
            PipelineStage::ScoringConfidence => "Confidence Scoring",
            PipelineStage::Done => "Done",
        }
    }
}

/// Everything the stages produce on a successful run.
struct Measured {
    estimate: DimensionEstimate,
    assessment: ConfidenceAssessment,
    px_per_mm: f64,
}

/// Single-photo dimension scanner.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of threads. Every call allocates its own buffers and drops them on return.
pub struct VolumeScanner {
    config: ScanConfig,
    height_estimator: Box<dyn HeightEstimator>,
}

impl VolumeScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            height_estimator: Box::new(HalfShortSide),
        }
    }

    /// Replace the height heuristic
    pub fn with_height_estimator(mut self, estimator: Box<dyn HeightEstimator>) -> Self {
        self.height_estimator = estimator;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan one photo.
    pub fn run(&self, input: &RawImageInput) -> PipelineResult {
        self.run_traced(input).0
    }

    /// Scan one photo and also return the stages that were entered.
    pub fn run_traced(&self, input: &RawImageInput) -> (PipelineResult, Vec<PipelineStage>) {
        let span = info_span!(
            "scan",
            request_id = input.request_id.as_deref().unwrap_or("-"),
            filename = input.filename.as_deref().unwrap_or("-"),
        );
        let _guard = span.enter();

        let started = Instant::now();
        let mut trace = Vec::new();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(input, &mut trace)))
            .unwrap_or_else(|payload| {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stage panicked".to_string());
                Err(StageFailure::processing(detail))
            });

        let processing_time_ms = started.elapsed().as_millis() as u64;
        let result = self.assemble(outcome, processing_time_ms, &trace);
        (result, trace)
    }

    fn execute(&self, input: &RawImageInput, trace: &mut Vec<PipelineStage>) -> StageResult<Measured> {
        let config = &self.config;

        trace.push(PipelineStage::Admitting);
        let bytes = payload_bytes(&input.payload)?;
        let admitted = admit_image(&bytes, &config.admission)?;

        trace.push(PipelineStage::LocatingReference);
        let reference = locate_reference(&admitted.gray, &config.reference)?;

        trace.push(PipelineStage::Calibrating);
        let calibration = calibrate(&reference, &config.reference_sheet)?;
        debug!(
            long_side_px = reference.width_px,
            short_side_px = reference.height_px,
            px_per_mm = calibration.px_per_mm,
            confidence = calibration.confidence,
            "Calibrated scale"
        );

        trace.push(PipelineStage::LocatingPackage);
        debug!(height_estimator = self.height_estimator.name(), "Locating package");
        let package = locate_package(
            &admitted.gray,
            &calibration.reference,
            &config.package,
            self.height_estimator.as_ref(),
        )?;

        trace.push(PipelineStage::ComputingDimensions);
        let estimate = compute_dimensions(&package, calibration.px_per_mm, config.volumetric_divisor)?;

        trace.push(PipelineStage::ScoringConfidence);
        let factors = ConfidenceFactors {
            reference_detection: calibration.confidence,
            bounding_box: package.confidence,
            edge_clarity: edge_clarity(admitted.sharpness, config.confidence.sharpness_normalizer),
        };
        let assessment = assess(factors, &config.confidence);

        trace.push(PipelineStage::Done);
        Ok(Measured {
            estimate,
            assessment,
            px_per_mm: calibration.px_per_mm,
        })
    }

    fn assemble(
        &self,
        outcome: StageResult<Measured>,
        processing_time_ms: u64,
        trace: &[PipelineStage],
    ) -> PipelineResult {
        let model_name = self.config.model_name.clone();
        let model_version = self.config.model_version.clone();

        match outcome {
            Ok(measured) => {
                let dims = measured.estimate.dimensions_mm;
                info!(
                    length_mm = dims.length,
                    width_mm = dims.width,
                    height_mm = dims.height,
                    confidence = measured.assessment.score,
                    review = measured.assessment.requires_manual_review,
                    processing_time_ms,
                    "Scan succeeded"
                );
                PipelineResult::Success(ScanSuccess {
                    dimensions_mm: dims,
                    volume_cm3: measured.estimate.volume_cm3,
                    weight_kg: measured.estimate.weight_kg,
                    confidence_score: measured.assessment.score,
                    confidence_factors: measured.assessment.factors,
                    px_per_mm: measured.px_per_mm,
                    model_name,
                    model_version,
                    processing_time_ms,
                    requires_manual_review: measured.assessment.requires_manual_review,
                    review_reason: measured.assessment.review_reason,
                })
            }
            Err(failure) => {
                let stage = trace.last().map(|s| s.name()).unwrap_or("-");
                if failure.code.is_admission_failure() || failure.code.is_detection_failure() {
                    info!(stage, code = %failure.code, processing_time_ms, "Scan rejected: {}", failure.message);
                } else {
                    warn!(stage, code = %failure.code, processing_time_ms, "Scan failed: {}", failure.message);
                }
                PipelineResult::Failure(ScanFailure {
                    error_code: failure.code,
                    error_message: failure.message,
                    model_name,
                    model_version,
                    processing_time_ms,
                })
            }
        }
    }
}

impl Default for VolumeScanner {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::DetectedRectangle;

    struct PanickingEstimator;

    impl HeightEstimator for PanickingEstimator {
        fn estimate_height_px(&self, _footprint: &DetectedRectangle) -> f64 {
            panic!("estimator blew up")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[test]
    fn test_garbage_input_stops_at_admission() {
        let scanner = VolumeScanner::default();
        let (result, trace) = scanner.run_traced(&RawImageInput::from_bytes(vec![0u8; 16]));
        assert_eq!(result.error_code(), Some(ErrorCode::InvalidImageFormat));
        assert_eq!(trace, vec![PipelineStage::Admitting]);
        let failure = result.failure().unwrap();
        assert_eq!(failure.model_name, "volumescan-classical-cv");
        assert_eq!(failure.model_version, "1.0.0");
    }

    #[test]
    fn test_custom_estimator_is_used_and_panics_are_contained() {
        use image::{GrayImage, ImageFormat, Luma};
        use std::io::Cursor;

        // Reference outline 100..400 × 30..242, package outline 330..730 × 360..760.
        let blocks = [(100u32, 30u32, 400u32, 242u32), (330, 360, 730, 760)];
        let gray = GrayImage::from_fn(800, 800, |x, y| {
            let inside = blocks
                .iter()
                .any(|&(l, t, r, b)| x + 1 >= l && x <= r + 1 && y + 1 >= t && y <= b + 1);
            if inside { Luma([255]) } else { Luma([0]) }
        });
        let mut bytes = Cursor::new(Vec::new());
        gray.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let scanner = VolumeScanner::default().with_height_estimator(Box::new(PanickingEstimator));
        let (result, trace) = scanner.run_traced(&RawImageInput::from_bytes(bytes.into_inner()));
        assert_eq!(result.error_code(), Some(ErrorCode::ProcessingError));
        assert!(result.failure().unwrap().error_message.contains("estimator blew up"));
        assert_eq!(trace.last(), Some(&PipelineStage::LocatingPackage));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::Admitting.name(), "Image Admission");
        assert_eq!(PipelineStage::ScoringConfidence.name(), "Confidence Scoring");
    }
}

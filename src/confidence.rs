use crate::config::ConfidenceConfig;
use crate::dimensions::round_to;
use crate::models::{ConfidenceAssessment, ConfidenceFactors};

const REFERENCE_MESSAGE: &str = "Reference sheet detection is uncertain; make sure the whole sheet is flat and visible";
const BOUNDING_BOX_MESSAGE: &str = "Package boundaries may be unclear";
const EDGE_CLARITY_MESSAGE: &str = "Image is not sharp enough for precise edge detection";
const FALLBACK_MESSAGE: &str = "Overall confidence is below the automatic acceptance threshold";

/// Map measured sharpness onto [0, 1].
pub fn edge_clarity(sharpness: f64, normalizer: f64) -> f64 {
    (sharpness / normalizer).clamp(0.0, 1.0)
}

/// Float noise allowed when a score sits exactly on the threshold.
const SCORE_TOLERANCE: f64 = 4.0 * f64::EPSILON;

/// Unrounded weighted score.
pub fn weighted_score(factors: &ConfidenceFactors, config: &ConfidenceConfig) -> f64 {
    config.reference_weight * factors.reference_detection
        + config.bounding_box_weight * factors.bounding_box
        + config.edge_clarity_weight * factors.edge_clarity
}

/// Strictly below the threshold needs a human.
pub fn requires_review(score: f64, threshold: f64) -> bool {
    score < threshold - SCORE_TOLERANCE
}

fn build_review_reason(factors: &ConfidenceFactors, threshold: f64) -> String {
    let reasons: Vec<&str> = [
        (factors.reference_detection, REFERENCE_MESSAGE),
        (factors.bounding_box, BOUNDING_BOX_MESSAGE),
        (factors.edge_clarity, EDGE_CLARITY_MESSAGE),
    ]
    .into_iter()
    .filter(|(value, _)| *value < threshold)
    .map(|(_, message)| message)
    .collect();

    if reasons.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        reasons.join("; ")
    }
}

/// Combine per-stage confidences into one score and a review decision.
pub fn assess(factors: ConfidenceFactors, config: &ConfidenceConfig) -> ConfidenceAssessment {
    let raw = weighted_score(&factors, config);
    let requires_manual_review = requires_review(raw, config.review_threshold);
    let review_reason = requires_manual_review.then(|| build_review_reason(&factors, config.review_threshold));

    ConfidenceAssessment {
        score: round_to(raw, 4),
        factors,
        requires_manual_review,
        review_reason,
    }
}

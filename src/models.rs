use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Image bytes as handed over by the upload layer.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    Binary(Vec<u8>),
    /// Base64 text, optionally prefixed with `data:image/...;base64,`.
    Encoded(String),
}

/// One call's input. Filename and request id are for log correlation only.
#[derive(Debug, Clone)]
pub struct RawImageInput {
    pub payload: ImagePayload,
    pub filename: Option<String>,
    pub request_id: Option<String>,
}

impl RawImageInput {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: ImagePayload::Binary(bytes.into()),
            filename: None,
            request_id: None,
        }
    }

    pub fn from_encoded(text: impl Into<String>) -> Self {
        Self {
            payload: ImagePayload::Encoded(text.into()),
            filename: None,
            request_id: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatTag {
    Jpeg,
    Png,
    Webp,
}

/// A decoded photo that passed every admission gate.
#[derive(Debug, Clone)]
pub struct AdmittedImage {
    pub gray: GrayImage,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormatTag,
    pub sharpness: f64,
}

impl AdmittedImage {
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Quadrilateral found in the image.
///
/// The current fitting only produces axis-aligned boxes, but the four corners
/// are stored independently so a perspective-aware fitter can reuse the type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedRectangle {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
    pub confidence: f64,
}

impl DetectedRectangle {
    pub fn axis_aligned(min_x: f64, min_y: f64, max_x: f64, max_y: f64, confidence: f64) -> Self {
        Self {
            top_left: Point::new(min_x, min_y),
            top_right: Point::new(max_x, min_y),
            bottom_right: Point::new(max_x, max_y),
            bottom_left: Point::new(min_x, max_y),
            confidence,
        }
    }

    fn corners(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    pub fn min_x(&self) -> f64 {
        self.corners().iter().map(|p| p.x).fold(f64::INFINITY, f64::min)
    }

    pub fn max_x(&self) -> f64 {
        self.corners().iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_y(&self) -> f64 {
        self.corners().iter().map(|p| p.y).fold(f64::INFINITY, f64::min)
    }

    pub fn max_y(&self) -> f64 {
        self.corners().iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Width of the axis-aligned extent.
    pub fn width(&self) -> f64 {
        self.max_x() - self.min_x()
    }

    pub fn height(&self) -> f64 {
        self.max_y() - self.min_y()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Overlap area of the two axis-aligned extents.
    pub fn intersection_area(&self, other: &DetectedRectangle) -> f64 {
        let w = self.max_x().min(other.max_x()) - self.min_x().max(other.min_x());
        let h = self.max_y().min(other.max_y()) - self.min_y().max(other.min_y());
        if w <= 0.0 || h <= 0.0 {
            return 0.0;
        }
        w * h
    }
}

/// The one reference sheet found in the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDetection {
    pub rectangle: DetectedRectangle,
    /// Longer detected side.
    pub width_px: f64,
    /// Shorter detected side.
    pub height_px: f64,
}

impl ReferenceDetection {
    pub fn from_rectangle(rectangle: DetectedRectangle) -> Self {
        let (w, h) = (rectangle.width(), rectangle.height());
        Self {
            rectangle,
            width_px: w.max(h),
            height_px: w.min(h),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleCalibration {
    pub px_per_mm_x: f64,
    pub px_per_mm_y: f64,
    pub px_per_mm: f64,
    pub reference: DetectedRectangle,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMeasurement {
    pub rectangle: DetectedRectangle,
    pub length_px: f64,
    pub width_px: f64,
    pub height_px: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionsMm {
    pub length: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionEstimate {
    pub dimensions_mm: DimensionsMm,
    pub volume_cm3: i64,
    pub weight_kg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub reference_detection: f64,
    pub bounding_box: f64,
    pub edge_clarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub score: f64,
    pub factors: ConfidenceFactors,
    pub requires_manual_review: bool,
    pub review_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSuccess {
    pub dimensions_mm: DimensionsMm,
    pub volume_cm3: i64,
    pub weight_kg: f64,
    pub confidence_score: f64,
    pub confidence_factors: ConfidenceFactors,
    pub px_per_mm: f64,
    pub model_name: String,
    pub model_version: String,
    pub processing_time_ms: u64,
    pub requires_manual_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub model_name: String,
    pub model_version: String,
    pub processing_time_ms: u64,
}

/// Final outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PipelineResult {
    Success(ScanSuccess),
    Failure(ScanFailure),
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    pub fn success(&self) -> Option<&ScanSuccess> {
        match self {
            PipelineResult::Success(s) => Some(s),
            PipelineResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ScanFailure> {
        match self {
            PipelineResult::Success(_) => None,
            PipelineResult::Failure(f) => Some(f),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.failure().map(|f| f.error_code)
    }

    pub fn processing_time_ms(&self) -> u64 {
        match self {
            PipelineResult::Success(s) => s.processing_time_ms,
            PipelineResult::Failure(f) => f.processing_time_ms,
        }
    }
}

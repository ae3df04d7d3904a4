use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stable, machine-readable failure codes reported by the scan pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidImageFormat,
    ImageTooSmall,
    ImageTooLarge,
    ImageBlurry,
    NoReferenceDetected,
    MultipleReferencesDetected,
    /// Reserved. The current detector never reports it.
    ReferenceOccluded,
    NoPackageDetected,
    AmbiguousPackage,
    ProcessingError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidImageFormat => "INVALID_IMAGE_FORMAT",
            ErrorCode::ImageTooSmall => "IMAGE_TOO_SMALL",
            ErrorCode::ImageTooLarge => "IMAGE_TOO_LARGE",
            ErrorCode::ImageBlurry => "IMAGE_BLURRY",
            ErrorCode::NoReferenceDetected => "NO_REFERENCE_DETECTED",
            ErrorCode::MultipleReferencesDetected => "MULTIPLE_REFERENCES_DETECTED",
            ErrorCode::ReferenceOccluded => "REFERENCE_OCCLUDED",
            ErrorCode::NoPackageDetected => "NO_PACKAGE_DETECTED",
            ErrorCode::AmbiguousPackage => "AMBIGUOUS_PACKAGE",
            ErrorCode::ProcessingError => "PROCESSING_ERROR",
        }
    }

    /// Input was unusable; the user must supply a new photo.
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidImageFormat
                | ErrorCode::ImageTooSmall
                | ErrorCode::ImageTooLarge
                | ErrorCode::ImageBlurry
        )
    }

    /// Scene could not be interpreted; the message explains how to retake it.
    pub fn is_detection_failure(&self) -> bool {
        matches!(
            self,
            ErrorCode::NoReferenceDetected
                | ErrorCode::MultipleReferencesDetected
                | ErrorCode::ReferenceOccluded
                | ErrorCode::NoPackageDetected
                | ErrorCode::AmbiguousPackage
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expected, business-meaningful failure of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct StageFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl StageFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wrap an unanticipated internal fault.
    pub fn processing(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ProcessingError,
            format!("Unexpected error while processing image: {}", detail),
        )
    }
}

pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// Errors from the plumbing around the pipeline (configuration, workers).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config from {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Scan did not finish within {0} ms")]
    Timeout(u64),
}

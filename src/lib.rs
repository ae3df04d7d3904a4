pub mod admission;
pub mod calibration;
pub mod confidence;
pub mod config;
pub mod detection;
pub mod dimensions;
pub mod error;
pub mod height;
pub mod models;
pub mod pipeline;
pub mod service;

pub use config::ScanConfig;
pub use error::{ErrorCode, ScanError, StageFailure, StageResult};
pub use height::{HalfShortSide, HeightEstimator};
pub use models::{
    AdmittedImage, ConfidenceFactors, DetectedRectangle, DimensionsMm, ImageFormatTag,
    ImagePayload, PackageMeasurement, PipelineResult, Point, RawImageInput, ScaleCalibration,
    ScanFailure, ScanSuccess,
};
pub use pipeline::{PipelineStage, VolumeScanner};
pub use service::ScanService;

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from volumescan for tests
pub use volumescan::{
    ErrorCode, PipelineResult, PipelineStage, RawImageInput, ScanConfig, ScanService,
    VolumeScanner,
};

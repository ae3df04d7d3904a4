use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::ScanConfig;
use crate::error::{ErrorCode, ScanError};
use crate::models::{PipelineResult, RawImageInput, ScanFailure};
use crate::pipeline::VolumeScanner;

/// Runs scans on tokio's blocking pool so a slow raster pass never stalls
/// the async runtime, with a semaphore capping how many run at once.
#[derive(Clone)]
pub struct ScanService {
    scanner: Arc<VolumeScanner>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ScanService {
    pub fn new(config: ScanConfig) -> Self {
        Self::from_scanner(VolumeScanner::new(config))
    }

    pub fn from_scanner(scanner: VolumeScanner) -> Self {
        let max_concurrent = scanner
            .config()
            .max_concurrent_scans
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1);
        Self {
            scanner: Arc::new(scanner),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Scan one photo. Never fails: infrastructure faults become a
    /// `PROCESSING_ERROR` result.
    ///
    /// The permit travels with the blocking job, so a scan whose caller has
    /// stopped waiting still counts against the limit until it finishes.
    pub async fn scan(&self, input: RawImageInput) -> PipelineResult {
        let started = Instant::now();
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return self.processing_failure(format!("scan queue closed: {}", e), started),
        };

        let scanner = Arc::clone(&self.scanner);
        let job = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            scanner.run(&input)
        });
        match job.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Scan worker failed");
                self.processing_failure(format!("scan worker failed: {}", e), started)
            }
        }
    }

    /// Stop waiting after `timeout`. The scan itself is not interrupted; it
    /// keeps its permit and its result is discarded when it finishes.
    pub async fn scan_with_timeout(
        &self,
        input: RawImageInput,
        timeout: Duration,
    ) -> Result<PipelineResult, ScanError> {
        tokio::time::timeout(timeout, self.scan(input))
            .await
            .map_err(|_| ScanError::Timeout(timeout.as_millis() as u64))
    }

    /// Scan many photos concurrently, returning results in input order.
    pub async fn scan_all(&self, inputs: Vec<RawImageInput>) -> Vec<PipelineResult> {
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let service = self.clone();
                tokio::spawn(async move { service.scan(input).await })
            })
            .collect();

        let started = Instant::now();
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => self.processing_failure(format!("scan task failed: {}", e), started),
            };
            results.push(result);
        }
        results
    }

    fn processing_failure(&self, message: String, started: Instant) -> PipelineResult {
        let config = self.scanner.config();
        PipelineResult::Failure(ScanFailure {
            error_code: ErrorCode::ProcessingError,
            error_message: message,
            model_name: config.model_name.clone(),
            model_version: config.model_version.clone(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

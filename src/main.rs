use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use volumescan::{PipelineResult, RawImageInput, ScanConfig, ScanError, ScanService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Parser)]
#[command(name = "volumescan", version)]
#[command(about = "Estimate package dimensions and volumetric weight from a photo with an A4 reference sheet")]
struct Cli {
    /// Paths to input image files
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// JSON file overriding the default detection constants
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of images scanned at once
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Give up waiting for a single image after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Print one JSON report per image instead of a summary
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ScanReport {
    request_id: String,
    filename: String,
    scanned_at: String,
    #[serde(flatten)]
    result: PipelineResult,
}

fn default_directive(log_level: Option<&str>, verbose: bool) -> &str {
    match log_level {
        Some(level) => level,
        None if verbose => "debug",
        None => "info",
    }
}

fn init_logging(args: &Cli) {
    let directive = default_directive(args.log_level.as_deref(), args.verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn scan_timestamp() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}

fn print_summary(report: &ScanReport) {
    println!("\n=== {} ===", report.filename);
    match &report.result {
        PipelineResult::Success(s) => {
            let d = s.dimensions_mm;
            println!("Dimensions: {} x {} x {} mm", d.length, d.width, d.height);
            println!("Volume: {} cm3", s.volume_cm3);
            println!("Volumetric weight: {:.2} kg", s.weight_kg);
            println!("Confidence: {:.2}", s.confidence_score);
            if s.requires_manual_review {
                println!(
                    "Manual review required: {}",
                    s.review_reason.as_deref().unwrap_or("low confidence")
                );
            }
        }
        PipelineResult::Failure(f) => {
            println!("Failed: {} - {}", f.error_code, f.error_message);
        }
    }
    println!("Processed in {} ms", report.result.processing_time_ms());
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(&args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let outcome = runtime.block_on(run(args));
    // Scans abandoned by --timeout-ms may still be running on the blocking pool.
    runtime.shutdown_background();
    outcome
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScanConfig::default(),
    };
    if let Some(jobs) = args.jobs {
        config.max_concurrent_scans = Some(jobs);
        config.validate()?;
    }

    info!(
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        model_name = %config.model_name,
        model_version = %config.model_version,
        "Starting volume scanner"
    );

    let service = ScanService::new(config);
    tracing::debug!(max_concurrent = service.max_concurrent(), "Scan service ready");

    let mut tasks = Vec::new();
    for path in &args.images {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        let filename = path.display().to_string();
        let request_id = Uuid::new_v4().to_string();
        let input = RawImageInput::from_bytes(bytes)
            .with_filename(filename.clone())
            .with_request_id(request_id.clone());

        let service = service.clone();
        let timeout = args.timeout_ms;
        tasks.push(tokio::spawn(async move {
            let result = match timeout {
                Some(ms) => service.scan_with_timeout(input, Duration::from_millis(ms)).await,
                None => Ok(service.scan(input).await),
            };
            (request_id, filename, result)
        }));
    }

    let mut timed_out = 0usize;
    for task in tasks {
        let (request_id, filename, result) = task.await.context("Scan task panicked")?;
        let result = match result {
            Ok(result) => result,
            Err(e @ ScanError::Timeout(_)) => {
                eprintln!("{}: {}", filename, e);
                timed_out += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let report = ScanReport {
            request_id,
            filename,
            scanned_at: scan_timestamp()?,
            result,
        };
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_summary(&report);
        }
    }

    if timed_out > 0 {
        anyhow::bail!("{} image(s) timed out", timed_out);
    }

    Ok(())
}

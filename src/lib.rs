//! Mozzdet - mosquito event detection and species classification pipeline.
//!
//! This crate provides the processing core of a mosquito audio analysis
//! service: signal windowing, event segmentation, species response assembly
//! and a single-worker job queue with progress broadcast and cooperative
//! cancellation. Model inference and recording storage are pluggable
//! through the [`inference::InferenceModel`] and
//! [`storage::RecordingSource`] traits; the transport layer consumes the
//! queue's event stream.

#![warn(missing_docs)]

pub mod audio;
pub mod config;
pub mod constants;
pub mod error;
pub mod inference;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod response;
pub mod segment;
pub mod storage;

pub use config::{Config, DetectionConfig};
pub use error::{Error, Result};
pub use pipeline::{CancelFlag, JobResult, Pipeline};
pub use queue::{Job, JobKind, ProcessingQueue, QueueEvent};
pub use response::{ClassificationResponse, DetectedSpecies};
pub use segment::DetectedEvent;

/// Initialize logging for embedding binaries.
///
/// Respects `RUST_LOG` when set, otherwise derives the filter from the
/// verbosity level (0 = info, 1 = debug, 2+ = trace).
pub fn init_logging(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter_str = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    fmt().with_env_filter(filter).init();
}

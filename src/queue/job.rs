//! Job and queue event types.

use crate::pipeline::JobResult;
use serde::{Deserialize, Serialize};

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Mosquito event detection only.
    #[serde(rename = "med")]
    DetectEvents,
    /// Event detection followed by species classification.
    #[serde(rename = "msc")]
    ClassifySpecies,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DetectEvents => write!(f, "med"),
            Self::ClassifySpecies => write!(f, "msc"),
        }
    }
}

/// A unit of work submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Recording the job operates on.
    pub recording_id: String,
    /// What to do with it.
    pub kind: JobKind,
}

impl Job {
    /// Create a detect-events job.
    pub fn detect_events(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            kind: JobKind::DetectEvents,
        }
    }

    /// Create a classify-species job.
    pub fn classify_species(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            kind: JobKind::ClassifySpecies,
        }
    }
}

/// Snapshot view of the job currently being processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveJob {
    /// Recording id of the running job.
    pub recording_id: String,
    /// Job kind.
    pub kind: JobKind,
    /// Progress in percent (0-100).
    pub progress: f32,
    /// Human-readable status text.
    pub status: String,
}

/// Consistent view of the whole queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    /// The active job, if any.
    pub processing: Option<ActiveJob>,
    /// Pending jobs in FIFO order.
    pub queue: Vec<Job>,
}

/// Message broadcast to queue observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Progress update for the active job.
    Progress(ActiveJob),
    /// Full queue snapshot.
    Snapshot(QueueSnapshot),
    /// A job finished successfully.
    Complete {
        /// Recording id of the finished job.
        recording_id: String,
        /// Job result with the assembled response.
        result: JobResult,
    },
    /// A job failed.
    Error {
        /// Recording id of the failed job.
        recording_id: String,
        /// Machine-readable error code.
        code: String,
        /// Human-readable description.
        description: String,
        /// HTTP-style status code.
        status: u16,
    },
}

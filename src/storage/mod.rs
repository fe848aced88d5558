//! Recording source boundary.
//!
//! Where recordings come from (database, object store, local disk) is a
//! deployment concern; the pipeline only needs [`RecordingSource::fetch`].
//! [`DirectorySource`] is the bundled filesystem implementation.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

/// A fetched audio recording.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Unique identifier of the recording.
    pub id: String,
    /// Mono audio samples in `-1.0..1.0`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// When the recording was captured, if known.
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Source of audio recordings, keyed by recording id.
pub trait RecordingSource: Send + Sync {
    /// Fetch a recording by id.
    ///
    /// Fails with [`Error::RecordingNotFound`], [`Error::AudioFileMissing`]
    /// or [`Error::AudioLoad`], each carrying a machine-readable code and
    /// HTTP-style status for the transport layer.
    fn fetch(&self, id: &str) -> Result<Recording>;
}

/// Recording source reading `<root>/<id>.wav` from a local directory.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Create a source rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl RecordingSource for DirectorySource {
    fn fetch(&self, id: &str) -> Result<Recording> {
        // Recording ids become file names; refuse anything path-like.
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Err(Error::RecordingNotFound { id: id.to_string() });
        }

        let path = self.root.join(format!("{id}.wav"));
        if !path.exists() {
            return Err(Error::AudioFileMissing { path });
        }

        debug!(path = %path.display(), "loading recording");
        let mut reader = hound::WavReader::open(&path).map_err(|e| Error::AudioLoad {
            path: path.clone(),
            source: Box::new(e),
        })?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>(),
            #[allow(clippy::cast_precision_loss)]
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
            }
        }
        .map_err(|e| Error::AudioLoad {
            path: path.clone(),
            source: Box::new(e),
        })?;

        // Keep only the first channel of multi-channel files.
        let samples = if spec.channels > 1 {
            samples
                .into_iter()
                .step_by(spec.channels as usize)
                .collect()
        } else {
            samples
        };

        let recorded_at = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(Recording {
            id: id.to_string(),
            samples,
            sample_rate: spec.sample_rate,
            recorded_at,
        })
    }
}

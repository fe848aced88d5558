//! Job execution pipeline.
//!
//! Drives one job through fetch → window → inference → segmentation →
//! assembly → persistence. Runs on the queue's worker context; the only
//! suspension points are between inference batches, where progress is
//! reported and the cancel flag is checked.

use crate::audio::{prepare, slice_span};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::inference::{ClassProbs, InferenceModel, classify_checked, detector_pair};
use crate::output::{write_event_audio, write_events_csv, write_species_csv};
use crate::response::{ClassificationResponse, assemble, subsegment_spans};
use crate::segment::segment;
use crate::storage::{Recording, RecordingSource};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Cooperative cancellation flag shared between the queue and the worker.
///
/// Cancellation is batch-granular: the worker checks the flag between
/// inference batches, a batch already submitted to the model runs to
/// completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// Assembled classification response.
    pub response: ClassificationResponse,
    /// Events table path, when persistence succeeded.
    pub output_path: Option<PathBuf>,
}

/// The detection/classification pipeline shared by all jobs.
pub struct Pipeline {
    detector: Arc<dyn InferenceModel>,
    species_classifier: Arc<dyn InferenceModel>,
    source: Arc<dyn RecordingSource>,
    config: Config,
}

impl Pipeline {
    /// Build a pipeline from its collaborators.
    pub fn new(
        detector: Arc<dyn InferenceModel>,
        species_classifier: Arc<dyn InferenceModel>,
        source: Arc<dyn RecordingSource>,
        config: Config,
    ) -> Self {
        Self {
            detector,
            species_classifier,
            source,
            config,
        }
    }

    /// Detection parameters in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a detect-events job: report the time-stamped events in a
    /// recording and persist the events table plus trimmed audio.
    pub fn detect_events<F>(&self, recording_id: &str, cancel: &CancelFlag, progress: F) -> Result<JobResult>
    where
        F: Fn(f32, &str),
    {
        let (recording, events) = self.fetch_and_detect(recording_id, cancel, &progress)?;

        let response =
            ClassificationResponse::events_only(events, self.detector.checkpoint().to_string());
        let output_path = self.persist_events(&recording, &response);

        Ok(JobResult {
            response,
            output_path,
        })
    }

    /// Run a classify-species job: detect events first, then classify each
    /// `min_length`-second sub-segment of event audio.
    ///
    /// When detection finds nothing the species model is never invoked and
    /// the response carries an empty species list.
    pub fn classify_species<F>(&self, recording_id: &str, cancel: &CancelFlag, progress: F) -> Result<JobResult>
    where
        F: Fn(f32, &str),
    {
        let (recording, events) = self.fetch_and_detect(recording_id, cancel, &progress)?;

        if events.is_empty() {
            info!(recording_id, "no events detected, skipping species classification");
            let response =
                ClassificationResponse::events_only(events, self.detector.checkpoint().to_string());
            let output_path = self.persist_events(&recording, &response);
            return Ok(JobResult {
                response,
                output_path,
            });
        }

        let detection = &self.config.detection;
        let spans = subsegment_spans(&events, detection);
        let frames: Vec<Vec<f32>> = spans
            .iter()
            .map(|&(start, end)| {
                slice_span(
                    &recording.samples,
                    start,
                    end,
                    recording.sample_rate,
                    detection.single_batch_length(),
                )
            })
            .collect();

        let predictions =
            self.run_model(self.species_classifier.as_ref(), &frames, cancel, &progress)?;

        let response = assemble(
            events,
            predictions,
            detection,
            self.detector.checkpoint().to_string(),
            self.species_classifier.checkpoint().to_string(),
        )?;

        let output_path = self.persist_events(&recording, &response);
        if let Err(e) =
            write_species_csv(&self.config.output.dir, &recording, &response.detected_species)
        {
            warn!(recording_id = %recording.id, error = %e, "failed to persist species table");
        }

        Ok(JobResult {
            response,
            output_path,
        })
    }

    /// Fetch a recording, window it and run the event detector over it.
    fn fetch_and_detect<F>(
        &self,
        recording_id: &str,
        cancel: &CancelFlag,
        progress: &F,
    ) -> Result<(Recording, Vec<crate::segment::DetectedEvent>)>
    where
        F: Fn(f32, &str),
    {
        let recording = self.source.fetch(recording_id)?;
        if recording.samples.is_empty() {
            return Err(Error::EmptySignal {
                id: recording_id.to_string(),
            });
        }
        if recording.sample_rate != self.config.detection.sample_rate {
            warn!(
                recording_id,
                sample_rate = recording.sample_rate,
                expected = self.config.detection.sample_rate,
                "recording sample rate differs from configured rate"
            );
        }

        let windows = prepare(&recording.samples, &self.config.detection)?;
        let results = self.run_model(self.detector.as_ref(), &windows, cancel, progress)?;
        let probabilities = results
            .iter()
            .map(detector_pair)
            .collect::<Result<Vec<_>>>()?;

        let events = segment(&probabilities, &self.config.detection);
        info!(recording_id, events = events.len(), "event detection finished");
        Ok((recording, events))
    }

    /// Classify frames one batch at a time, checking cancellation and
    /// reporting progress between batches.
    #[allow(clippy::cast_precision_loss)]
    fn run_model<F>(
        &self,
        model: &dyn InferenceModel,
        frames: &[Vec<f32>],
        cancel: &CancelFlag,
        progress: &F,
    ) -> Result<Vec<ClassProbs>>
    where
        F: Fn(f32, &str),
    {
        let total = frames.len();
        let mut results = Vec::with_capacity(total);

        for (index, frame) in frames.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("classification cancelled");
                return Err(Error::Cancelled);
            }

            let batch: [&[f32]; 1] = [frame.as_slice()];
            results.extend(classify_checked(model, &batch)?);
            progress(
                index as f32 / total as f32 * 100.0,
                &format!("Batch {} of {} has been classified.", index + 1, total),
            );
        }

        progress(100.0, "Classification finished.");
        Ok(results)
    }

    /// Best-effort persistence of the events table and trimmed audio.
    fn persist_events(
        &self,
        recording: &Recording,
        response: &ClassificationResponse,
    ) -> Option<PathBuf> {
        let dir = &self.config.output.dir;

        if let Err(e) = write_event_audio(dir, recording, &response.events) {
            warn!(recording_id = %recording.id, error = %e, "failed to persist event audio");
        }

        match write_events_csv(dir, recording, &response.events) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(recording_id = %recording.id, error = %e, "failed to persist events table");
                None
            }
        }
    }
}

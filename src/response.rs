//! Classification response assembly.
//!
//! Re-partitions detected events into fixed-length sub-segments and pairs
//! each sub-segment with one species prediction.

use crate::config::DetectionConfig;
use crate::error::{Error, Result};
use crate::inference::ClassProbs;
use crate::segment::DetectedEvent;
use serde::Serialize;

/// One species-classified sub-segment of a detected event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedSpecies {
    /// Sub-segment start in seconds of the original recording.
    pub start: f64,
    /// Sub-segment end in seconds.
    pub end: f64,
    /// Label with the highest predicted probability.
    pub species: String,
    /// All per-species probabilities.
    pub predictions: ClassProbs,
}

impl DetectedSpecies {
    /// Build a sub-segment record, deriving `species` as the argmax of the
    /// predictions. Ties break towards the lexicographically first label so
    /// the result is deterministic.
    pub fn new(start: f64, end: f64, predictions: ClassProbs) -> Self {
        let species = predictions
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label.clone())
            .unwrap_or_default();
        Self {
            start,
            end,
            species,
            predictions,
        }
    }
}

/// Complete result of one classification job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResponse {
    /// Detected events, time-ordered.
    pub events: Vec<DetectedEvent>,
    /// Species-classified sub-segments, in emission order.
    pub detected_species: Vec<DetectedSpecies>,
    /// Checkpoint identifier of the event detector.
    pub detector_model: String,
    /// Checkpoint identifier of the species classifier, when it ran.
    pub species_model: Option<String>,
}

impl ClassificationResponse {
    /// Response for a detection-only job, or a species job where no events
    /// were found (species classification is skipped entirely then).
    pub fn events_only(events: Vec<DetectedEvent>, detector_model: String) -> Self {
        Self {
            events,
            detected_species: Vec::new(),
            detector_model,
            species_model: None,
        }
    }
}

/// Walk every event from start to end in `min_length`-second increments and
/// return the resulting `(start, end)` spans, across all events in order.
///
/// The final span of an event may be shorter than `min_length` but is always
/// emitted. The species classifier must process its input in exactly this
/// span order; [`assemble`] pairs predictions back positionally.
pub fn subsegment_spans(events: &[DetectedEvent], config: &DetectionConfig) -> Vec<(f64, f64)> {
    let mut spans = Vec::new();
    for event in events {
        let mut current = event.start_time;
        while current < event.end_time {
            let end = (current + config.min_length).min(event.end_time);
            spans.push((current, end));
            current += config.min_length;
        }
    }
    spans
}

/// Combine detected events with per-span species predictions into a
/// [`ClassificationResponse`].
///
/// `predictions` must hold exactly one entry per span emitted by
/// [`subsegment_spans`] for `events`; any mismatch means the classifier and
/// the assembler disagree about the sub-segment walk and is an internal
/// error rather than a silent mis-pairing.
pub fn assemble(
    events: Vec<DetectedEvent>,
    predictions: Vec<ClassProbs>,
    config: &DetectionConfig,
    detector_model: String,
    species_model: String,
) -> Result<ClassificationResponse> {
    let spans = subsegment_spans(&events, config);
    if spans.len() != predictions.len() {
        return Err(Error::Internal {
            message: format!(
                "{} species predictions for {} sub-segments",
                predictions.len(),
                spans.len()
            ),
        });
    }

    let detected_species = spans
        .into_iter()
        .zip(predictions)
        .map(|((start, end), probs)| DetectedSpecies::new(start, end, probs))
        .collect();

    Ok(ClassificationResponse {
        events,
        detected_species,
        detector_model,
        species_model: Some(species_model),
    })
}

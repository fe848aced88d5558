//! Inference model boundary.
//!
//! The neural networks themselves live behind the [`InferenceModel`] trait:
//! the pipeline only needs a stateless "classify this batch of fixed-size
//! frames" capability. Two instances are wired in per deployment, an event
//! detector (classes `"0"`/`"1"`) and a species classifier (species names).

use crate::constants::{DETECTOR_CLASS_ABSENCE, DETECTOR_CLASS_PRESENCE};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Per-frame class probabilities keyed by class label.
///
/// `BTreeMap` keeps serialization and argmax tie-breaking deterministic.
pub type ClassProbs = BTreeMap<String, f32>;

/// A stateless classification capability over fixed-size signal windows.
///
/// Implementations must return exactly one result per input frame, in input
/// order. Returning fewer results than frames is a contract violation and is
/// surfaced as a hard error by [`classify_checked`].
pub trait InferenceModel: Send + Sync {
    /// Classify a batch of frames into per-class probabilities.
    fn classify(&self, batch: &[&[f32]]) -> Result<Vec<ClassProbs>>;

    /// Identifier of the loaded model checkpoint.
    fn checkpoint(&self) -> &str;
}

/// Run [`InferenceModel::classify`] and enforce the one-result-per-frame
/// contract.
pub fn classify_checked(model: &dyn InferenceModel, batch: &[&[f32]]) -> Result<Vec<ClassProbs>> {
    let results = model.classify(batch)?;
    if results.len() != batch.len() {
        return Err(Error::PredictionCountMismatch {
            expected: batch.len(),
            got: results.len(),
        });
    }
    Ok(results)
}

/// Extract the detector's `[absence, presence]` pair from one result.
///
/// A detector that omits a class is misconfigured for this pipeline.
pub fn detector_pair(probs: &ClassProbs) -> Result<[f32; 2]> {
    let get = |label: &str| {
        probs.get(label).copied().ok_or_else(|| Error::Inference {
            reason: format!("detector result is missing class '{label}'"),
        })
    };
    Ok([get(DETECTOR_CLASS_ABSENCE)?, get(DETECTOR_CLASS_PRESENCE)?])
}

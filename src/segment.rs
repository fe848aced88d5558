//! Event segmentation.
//!
//! Turns the detector's per-window probability stream into discrete
//! time-stamped events: smooth, threshold, extract contiguous regions,
//! convert window indices to seconds.

use crate::config::DetectionConfig;
use serde::Serialize;
use tracing::debug;

/// A maximal contiguous run of windows whose presence probability exceeds
/// the detection threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedEvent {
    /// Event start in seconds from the beginning of the recording.
    pub start_time: f64,
    /// Event end in seconds.
    pub end_time: f64,
    /// Mean smoothed presence probability over the event's windows.
    pub mean_prob: f32,
}

impl DetectedEvent {
    /// Event duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Extract detected events from a per-window `[absence, presence]`
/// probability array, one row per window in window order.
///
/// The rows are smoothed with a centered 3-row moving average before
/// thresholding. Edge rows have no full neighborhood and are dropped rather
/// than reflected, so a few hundred milliseconds at each end of a recording
/// are never reported; arrays of fewer than 5 rows segment to no events.
/// Output is deterministic, non-overlapping and ordered by start time.
pub fn segment(probabilities: &[[f32; 2]], config: &DetectionConfig) -> Vec<DetectedEvent> {
    let smoothed = smooth(probabilities);
    let condition: Vec<bool> = smoothed
        .iter()
        .map(|row| row[1] > config.det_threshold)
        .collect();

    let time_per_window = config.time_per_window();
    let mut events = Vec::new();
    for (start, stop) in contiguous_regions(&condition) {
        #[allow(clippy::cast_precision_loss)]
        let mean_prob = smoothed[start..stop].iter().map(|row| row[1]).sum::<f32>()
            / (stop - start) as f32;
        #[allow(clippy::cast_precision_loss)]
        events.push(DetectedEvent {
            start_time: round2(start as f64 * time_per_window),
            end_time: round2(stop as f64 * time_per_window),
            mean_prob,
        });
    }

    debug!(
        windows = probabilities.len(),
        events = events.len(),
        "segmentation finished"
    );
    events
}

/// Centered 3-row moving average.
///
/// Row `i` of the output averages raw rows `i`, `i+1` and `i+2`; the output
/// has `len - 4` rows, reproducing the trim the models were calibrated
/// against (one leading and three trailing centers are excluded).
fn smooth(probabilities: &[[f32; 2]]) -> Vec<[f32; 2]> {
    if probabilities.len() < 5 {
        return Vec::new();
    }

    (0..probabilities.len() - 4)
        .map(|i| {
            let [a, b, c] = [probabilities[i], probabilities[i + 1], probabilities[i + 2]];
            [(a[0] + b[0] + c[0]) / 3.0, (a[1] + b[1] + c[1]) / 3.0]
        })
        .collect()
}

/// Find maximal `true` runs of `condition` as half-open `(start, stop)`
/// index ranges.
///
/// Rising and falling edges come from the pairwise difference of the array;
/// a run still open at either boundary is closed synthetically at index 0 or
/// `condition.len()`.
fn contiguous_regions(condition: &[bool]) -> Vec<(usize, usize)> {
    if condition.is_empty() {
        return Vec::new();
    }

    let mut edges = Vec::new();
    if condition[0] {
        edges.push(0);
    }
    for i in 1..condition.len() {
        if condition[i] != condition[i - 1] {
            edges.push(i);
        }
    }
    if condition[condition.len() - 1] {
        edges.push(condition.len());
    }

    edges.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Round to 2 decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

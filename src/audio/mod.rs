//! Signal windowing for batch inference.
//!
//! Splits a raw waveform into fixed-length overlapping windows. Signals
//! shorter than one window are mean-padded first; zero padding would read as
//! artificial silence and bias the detector.

use crate::config::DetectionConfig;
use crate::error::{Error, Result};
use tracing::debug;

/// Center a short signal inside a buffer of `target_len` samples.
///
/// Both pads are filled with the arithmetic mean of the signal. The left pad
/// takes `floor(deficit / 2)` samples, the right pad the remainder.
#[allow(clippy::cast_precision_loss)]
pub fn pad_mean(signal: &[f32], target_len: usize) -> Vec<f32> {
    if signal.len() >= target_len {
        return signal.to_vec();
    }

    let mean = signal.iter().sum::<f32>() / signal.len() as f32;
    let deficit = target_len - signal.len();
    let left = deficit / 2;
    let right = deficit - left;
    debug!(mean, left, right, "padding short signal");

    let mut padded = Vec::with_capacity(target_len);
    padded.extend(std::iter::repeat_n(mean, left));
    padded.extend_from_slice(signal);
    padded.extend(std::iter::repeat_n(mean, right));
    padded
}

/// Split a signal into overlapping inference windows.
///
/// Windows are `single_batch_length` samples long and start every
/// `step_size * n_hop` samples, in temporal order. A trailing run shorter
/// than one window is discarded; padding already guarantees at least one
/// full window. An empty signal is an input error, not a padding case.
pub fn prepare(signal: &[f32], config: &DetectionConfig) -> Result<Vec<Vec<f32>>> {
    if signal.is_empty() {
        return Err(Error::Internal {
            message: "cannot window an empty signal".to_string(),
        });
    }

    let window_len = config.single_batch_length();
    let step = config.step_samples();
    let signal = pad_mean(signal, window_len);

    let mut windows = Vec::new();
    let mut pos = 0;
    while pos + window_len <= signal.len() {
        windows.push(signal[pos..pos + window_len].to_vec());
        pos += step;
    }

    debug!(windows = windows.len(), samples = signal.len(), "prepared signal");
    Ok(windows)
}

/// Extract one `[start, end)` second span of the signal, mean-padded up to
/// `target_len` samples when the span is shorter.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn slice_span(signal: &[f32], start: f64, end: f64, sample_rate: u32, target_len: usize) -> Vec<f32> {
    let start_idx = ((start * f64::from(sample_rate)) as usize).min(signal.len());
    let end_idx = ((end * f64::from(sample_rate)) as usize).min(signal.len());
    pad_mean(&signal[start_idx..end_idx.max(start_idx)], target_len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn config() -> DetectionConfig {
        DetectionConfig::default()
    }

    #[test]
    fn test_pad_mean_centers_signal() {
        let padded = pad_mean(&[1.0, 3.0], 7);
        // deficit 5: left pad 2, right pad 3, fill value is the mean (2.0)
        assert_eq!(padded, vec![2.0, 2.0, 1.0, 3.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_pad_mean_noop_when_long_enough() {
        let signal = vec![0.5; 10];
        assert_eq!(pad_mean(&signal, 10), signal);
    }

    #[test]
    fn test_prepare_short_signal_yields_one_window() {
        let config = config();
        let signal = vec![0.25; 1000];
        let windows = prepare(&signal, &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), config.single_batch_length());

        // Padded regions carry the signal mean.
        let mean = windows[0].iter().sum::<f32>() / windows[0].len() as f32;
        assert!((mean - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_prepare_window_count_and_order() {
        let config = config();
        // Two full steps past the first window.
        let len = config.single_batch_length() + 2 * config.step_samples();
        let signal: Vec<f32> = (0..len).map(|i| i as f32).collect();
        let windows = prepare(&signal, &config).unwrap();
        assert_eq!(windows.len(), 3);

        // Windows start at consecutive step offsets.
        assert_eq!(windows[0][0], 0.0);
        assert_eq!(windows[1][0], config.step_samples() as f32);
        assert_eq!(windows[2][0], (2 * config.step_samples()) as f32);
    }

    #[test]
    fn test_prepare_discards_trailing_partial_window() {
        let config = config();
        let len = config.single_batch_length() + config.step_samples() / 2;
        let windows = prepare(&vec![0.0; len], &config).unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_prepare_rejects_empty_signal() {
        assert!(prepare(&[], &config()).is_err());
    }

    #[test]
    fn test_slice_span_pads_short_tail() {
        let signal = vec![1.0; 16_000]; // 2 s at 8 kHz
        let span = slice_span(&signal, 1.5, 3.42, 8000, 15_360);
        assert_eq!(span.len(), 15_360);
    }
}

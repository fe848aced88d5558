//! Configuration types and loading.

use crate::constants::{
    DEFAULT_DET_THRESHOLD, DEFAULT_MIN_LENGTH, DEFAULT_N_HOP, DEFAULT_SAMPLE_RATE,
    DEFAULT_STEP_SIZE, DEFAULT_WINDOW_SIZE,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection and segmentation parameters.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Parameters of the windowing/segmentation pipeline.
///
/// These mirror the parameters the detector and species models were trained
/// with, so changing them requires retrained checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Length of one classified sub-segment in seconds.
    pub min_length: f64,

    /// Window size in frames.
    pub window_size: usize,

    /// Hop length in samples per frame.
    pub n_hop: usize,

    /// Sliding step in frames.
    pub step_size: usize,

    /// Probability threshold for the presence class.
    pub det_threshold: f32,

    /// Expected sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            window_size: DEFAULT_WINDOW_SIZE,
            n_hop: DEFAULT_N_HOP,
            step_size: DEFAULT_STEP_SIZE,
            det_threshold: DEFAULT_DET_THRESHOLD,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl DetectionConfig {
    /// Number of samples in one inference window.
    pub fn single_batch_length(&self) -> usize {
        self.window_size * self.n_hop
    }

    /// Number of samples one sliding step advances.
    pub fn step_samples(&self) -> usize {
        self.step_size * self.n_hop
    }

    /// Real-world duration one sliding step represents, in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn time_per_window(&self) -> f64 {
        (self.n_hop * self.step_size) as f64 / f64::from(self.sample_rate)
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.n_hop == 0 || self.step_size == 0 {
            return Err(Error::ConfigValidation {
                message: "window_size, n_hop and step_size must be non-zero".to_string(),
            });
        }
        if self.step_size > self.window_size {
            return Err(Error::ConfigValidation {
                message: format!(
                    "step_size ({}) must not exceed window_size ({})",
                    self.step_size, self.window_size
                ),
            });
        }
        if !(self.det_threshold > 0.0 && self.det_threshold < 1.0) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "det_threshold must be within (0, 1), got {}",
                    self.det_threshold
                ),
            });
        }
        if self.min_length <= 0.0 {
            return Err(Error::ConfigValidation {
                message: format!("min_length must be positive, got {}", self.min_length),
            });
        }
        if self.sample_rate == 0 {
            return Err(Error::ConfigValidation {
                message: "sample_rate must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for per-job output artifacts.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

/// Load configuration from a TOML file.
///
/// Returns default config if the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })?;

    config.detection.validate()?;
    Ok(config)
}

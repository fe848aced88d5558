//! Application-wide constants.

/// Default length of one classified sub-segment in seconds.
pub const DEFAULT_MIN_LENGTH: f64 = 1.92;

/// Default window size in frames.
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Default hop length in samples per frame.
pub const DEFAULT_N_HOP: usize = 512;

/// Default sliding step in frames.
pub const DEFAULT_STEP_SIZE: usize = 10;

/// Default detection probability threshold.
pub const DEFAULT_DET_THRESHOLD: f32 = 0.5;

/// Default sample rate in Hz. Recordings are expected at this rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Detector class label for absence.
pub const DETECTOR_CLASS_ABSENCE: &str = "0";

/// Detector class label for presence.
pub const DETECTOR_CLASS_PRESENCE: &str = "1";

/// Decimal places for probability formatting in outputs.
pub const PROB_DECIMAL_PLACES: usize = 4;

/// Output file extensions per artifact.
pub mod output_extensions {
    /// Detected-events CSV extension.
    pub const EVENTS_CSV: &str = ".csv";
    /// Detected-species CSV extension.
    pub const SPECIES_CSV: &str = "_msc.csv";
    /// Trimmed event audio extension.
    pub const EVENT_AUDIO: &str = ".wav";
}

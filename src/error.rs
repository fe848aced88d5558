//! Error types for mozzdet.

/// Result type alias for mozzdet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for mozzdet.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Recording not found in the recording source.
    #[error("could not find a recording with id '{id}'")]
    RecordingNotFound {
        /// Requested recording id.
        id: String,
    },

    /// Audio file missing at the path the recording source provided.
    #[error("could not find a recording file at '{path}'")]
    AudioFileMissing {
        /// Expected path of the audio file.
        path: std::path::PathBuf,
    },

    /// Failed to load audio samples for a recording.
    #[error("failed to load audio from '{path}'")]
    AudioLoad {
        /// Path to the audio file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Signal contained no samples after loading.
    #[error("recording '{id}' contains no audio samples")]
    EmptySignal {
        /// Recording id.
        id: String,
    },

    /// Job was cancelled by the user.
    #[error("job was cancelled")]
    Cancelled,

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Model returned a different number of results than input frames.
    #[error("model returned {got} results for {expected} frames")]
    PredictionCountMismatch {
        /// Number of frames submitted.
        expected: usize,
        /// Number of results returned.
        got: usize,
    },

    /// Failed to write WAV file.
    #[error("failed to write WAV file '{path}'")]
    WavWrite {
        /// Path to the WAV file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: hound::Error,
    },

    /// Failed to write CSV output.
    #[error("failed to write CSV file '{path}'")]
    CsvWrite {
        /// Path to the CSV file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Machine-readable error code relayed to the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::ConfigRead { .. } | Self::ConfigParse { .. } | Self::ConfigValidation { .. } => {
                "invalid_configuration"
            }
            Self::RecordingNotFound { .. } => "recording_not_found",
            Self::AudioFileMissing { .. } => "audio_file_not_found",
            Self::AudioLoad { .. } => "loading_audio_bytes_error",
            Self::EmptySignal { .. } => "empty_signal",
            Self::Cancelled => "cancelled",
            Self::Inference { .. } | Self::PredictionCountMismatch { .. } => "inference_error",
            Self::WavWrite { .. } | Self::CsvWrite { .. } => "output_write_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// HTTP-style status code for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RecordingNotFound { .. } | Self::AudioFileMissing { .. } => 404,
            Self::ConfigValidation { .. } | Self::EmptySignal { .. } => 400,
            _ => 500,
        }
    }
}

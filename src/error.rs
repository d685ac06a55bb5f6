use thiserror::Error;

/// Main error type for the Reel-Stitcher library
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Clip error: {0}")]
    Clip(#[from] ClipError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load media engine: {reason}")]
    LoadFailed { reason: String },

    #[error("Media engine not loaded")]
    NotLoaded,

    #[error("Invalid working file name: {name}")]
    InvalidFileName { name: String },

    #[error("Working file not found: {name}")]
    FileNotFound { name: String },

    #[error("Engine command failed ({status}): {command}\n{diagnostics}")]
    ExecutionFailed {
        command: String,
        status: String,
        diagnostics: String,
    },
}

/// Timeline and clip validation errors
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("No clips on the timeline")]
    NoClips,

    #[error("Clip {index} has an invalid slot: start {start}s, end {end}s")]
    InvalidRange { index: usize, start: f64, end: f64 },

    #[error("Clip {index} has an invalid source duration: {duration}s")]
    InvalidSourceDuration { index: usize, duration: f64 },

    #[error("Clip {index} references an unknown source: {source_id}")]
    UnknownSource { index: usize, source_id: String },
}

/// Render orchestration errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("A render is already in progress")]
    Busy,

    #[error("Concatenation failed, segment missing from manifest input: {missing}")]
    Concatenation { missing: String },

    #[error("Render cancelled before {stage}")]
    Cancelled { stage: String },

    #[error("Working file name already in use: {name}")]
    WorkingFileInUse { name: String },

    #[error("No audio track loaded")]
    NoAudio,

    #[error("Invalid audio duration: {duration}s")]
    InvalidAudioDuration { duration: f64 },
}

/// Audio loading errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Could not determine audio duration: {details}")]
    UnknownDuration { details: String },
}

/// Video source loading errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to load video file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to probe video file: {path} - {reason}")]
    ProbeFailed { path: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using StitchError
pub type Result<T> = std::result::Result<T, StitchError>;

impl StitchError {
    /// Check if this error is recoverable (can be retried)
    ///
    /// Engine command failures are deterministic for the same inputs, so they are
    /// never reported as recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Engine(EngineError::LoadFailed { .. }) => true,
            Self::Pipeline(PipelineError::Busy) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Engine(EngineError::NotLoaded) => {
                "The media engine is not loaded yet. Load it before rendering.".to_string()
            }
            Self::Engine(EngineError::LoadFailed { reason }) => {
                format!("Could not start the media engine: {}", reason)
            }
            Self::Clip(ClipError::NoClips) => {
                "Add at least one video clip to the timeline before rendering.".to_string()
            }
            Self::Pipeline(PipelineError::Busy) => {
                "A render is already running. Wait for it to finish.".to_string()
            }
            Self::Audio(AudioError::LoadFailed { path }) => {
                format!("Could not load audio file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Video(VideoError::LoadFailed { path }) => {
                format!("Could not load video file '{}'. Please check the file exists.", path)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

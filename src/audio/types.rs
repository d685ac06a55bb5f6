use std::sync::Arc;

/// Audio track for one render session
///
/// The bytes are shared rather than copied so the session and an in-flight
/// render can both hold the track.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// Encoded audio file contents
    pub bytes: Arc<[u8]>,

    /// Duration in seconds
    pub duration: f64,

    /// File extension used for the working file (mp3, wav, flac, ...)
    pub extension: String,
}

impl AudioTrack {
    pub fn new(bytes: impl Into<Arc<[u8]>>, duration: f64, extension: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            duration,
            extension: extension.into().to_lowercase(),
        }
    }

    /// Whether the duration can drive a render
    pub fn has_valid_duration(&self) -> bool {
        self.duration.is_finite() && self.duration > 0.0
    }
}

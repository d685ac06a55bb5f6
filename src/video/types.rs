use std::fmt;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

/// Identity of a video source within an editing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A loaded video file that clips can reference
#[derive(Debug, Clone)]
pub struct VideoSource {
    pub id: SourceId,

    /// Display name (usually the file name)
    pub name: String,

    /// Encoded file contents
    pub bytes: Arc<[u8]>,

    /// Duration in seconds, `None` until metadata is known
    pub duration: Option<f64>,
}

impl VideoSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>, duration: Option<f64>) -> Self {
        Self {
            id: SourceId::new(),
            name: name.into(),
            bytes: bytes.into(),
            duration,
        }
    }

    /// Get the file extension of the source name
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension()?.to_str()
    }

    /// Duration usable for loop computation
    pub fn usable_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// A clip occupying the `[start, end)` slot of the output timeline
///
/// The referenced source is looped or trimmed to fill the slot exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    pub id: Uuid,
    pub source_id: SourceId,
    pub start: f64,
    pub end: f64,
}

impl Clip {
    pub fn new(source_id: SourceId, start: f64, end: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            start,
            end,
        }
    }

    /// Length of the slot this clip must fill
    pub fn slot_duration(&self) -> f64 {
        self.end - self.start
    }

    /// `0 <= start < end`, both finite
    pub fn has_valid_range(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }
}

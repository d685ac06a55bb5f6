use crate::audio::AudioTrack;
use crate::error::{ClipError, PipelineError, Result};
use crate::video::{Clip, VideoSource};

/// A clip with its source bound, ready for the segment builder
#[derive(Debug, Clone)]
pub struct ResolvedClip {
    pub clip: Clip,
    pub source: VideoSource,
}

impl ResolvedClip {
    pub fn new(clip: Clip, source: VideoSource) -> Self {
        Self { clip, source }
    }

    /// Length of the timeline slot to fill
    pub fn target_duration(&self) -> f64 {
        self.clip.slot_duration()
    }

    /// Lowercased source extension, `mp4` when the name has none
    pub fn source_extension(&self) -> String {
        self.source.extension().unwrap_or("mp4").to_ascii_lowercase()
    }
}

/// Everything one render needs, in timeline order
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub audio: AudioTrack,
    pub clips: Vec<ResolvedClip>,
}

impl RenderRequest {
    pub fn new(audio: AudioTrack, clips: Vec<ResolvedClip>) -> Self {
        Self { audio, clips }
    }

    /// Reject requests the engine could never turn into a video
    ///
    /// Runs before any engine call so bad input never creates working files.
    pub fn validate(&self) -> Result<()> {
        if !self.audio.has_valid_duration() {
            return Err(PipelineError::InvalidAudioDuration { duration: self.audio.duration }.into());
        }

        if self.clips.is_empty() {
            return Err(ClipError::NoClips.into());
        }

        for (index, resolved) in self.clips.iter().enumerate() {
            let clip = &resolved.clip;
            if !clip.has_valid_range() {
                return Err(ClipError::InvalidRange { index, start: clip.start, end: clip.end }.into());
            }

            if clip.source_id != resolved.source.id {
                return Err(ClipError::UnknownSource { index, source_id: clip.source_id.to_string() }.into());
            }

            if resolved.source.usable_duration().is_none() {
                return Err(ClipError::InvalidSourceDuration {
                    index,
                    duration: resolved.source.duration.unwrap_or(0.0),
                }.into());
            }
        }

        Ok(())
    }

    /// Sum of all slot lengths
    pub fn total_slot_duration(&self) -> f64 {
        self.clips.iter().map(ResolvedClip::target_duration).sum()
    }
}

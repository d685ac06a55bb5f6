use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::audio::AudioTrack;
use crate::composition::request::{RenderRequest, ResolvedClip};
use crate::error::{ClipError, PipelineError, Result};
use crate::video::{Clip, SourceId, VideoSource};

/// Editing session state: one audio track, the loaded sources, and the timeline
///
/// Clips render in insertion order. Every clip references a live source;
/// removing a source removes its clips.
#[derive(Debug, Default)]
pub struct EditorSession {
    audio: Option<AudioTrack>,
    sources: HashMap<SourceId, VideoSource>,
    clips: Vec<Clip>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_audio(&mut self, track: AudioTrack) {
        debug!("Audio track set: {:.2}s", track.duration);
        self.audio = Some(track);
    }

    pub fn clear_audio(&mut self) {
        self.audio = None;
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn add_source(&mut self, source: VideoSource) -> SourceId {
        let id = source.id;
        self.sources.insert(id, source);
        id
    }

    pub fn source(&self, id: SourceId) -> Option<&VideoSource> {
        self.sources.get(&id)
    }

    /// Record a source duration once its metadata is known
    pub fn set_source_duration(&mut self, id: SourceId, duration: f64) -> bool {
        match self.sources.get_mut(&id) {
            Some(source) => {
                source.duration = Some(duration);
                true
            }
            None => false,
        }
    }

    /// Remove a source and every clip that references it
    pub fn remove_source(&mut self, id: SourceId) -> Option<VideoSource> {
        let removed = self.sources.remove(&id)?;
        let before = self.clips.len();
        self.clips.retain(|clip| clip.source_id != id);
        debug!("Removed source {} and {} clips", id, before - self.clips.len());
        Some(removed)
    }

    /// Append a clip to the end of the timeline
    pub fn add_clip(&mut self, source_id: SourceId, start: f64, end: f64) -> Result<Uuid> {
        let index = self.clips.len();
        if !self.sources.contains_key(&source_id) {
            return Err(ClipError::UnknownSource { index, source_id: source_id.to_string() }.into());
        }

        let clip = Clip::new(source_id, start, end);
        if !clip.has_valid_range() {
            return Err(ClipError::InvalidRange { index, start, end }.into());
        }

        self.clips.push(clip);
        Ok(clip.id)
    }

    pub fn update_clip_position(&mut self, id: Uuid, start: f64, end: f64) -> Result<bool> {
        let Some(index) = self.clips.iter().position(|c| c.id == id) else {
            return Ok(false);
        };

        let candidate = Clip { start, end, ..self.clips[index] };
        if !candidate.has_valid_range() {
            return Err(ClipError::InvalidRange { index, start, end }.into());
        }

        self.clips[index] = candidate;
        Ok(true)
    }

    pub fn remove_clip(&mut self, id: Uuid) -> bool {
        let before = self.clips.len();
        self.clips.retain(|clip| clip.id != id);
        self.clips.len() != before
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn has_clips(&self) -> bool {
        !self.clips.is_empty()
    }

    /// Audio and at least one clip present
    pub fn can_render(&self) -> bool {
        self.has_audio() && self.has_clips()
    }

    pub fn total_clips_duration(&self) -> f64 {
        self.clips.iter().map(Clip::slot_duration).sum()
    }

    /// Drop everything; sources, clips and audio
    pub fn clear_all(&mut self) {
        self.audio = None;
        self.sources.clear();
        self.clips.clear();
    }

    /// Bind every clip to its source for the render pipeline
    pub fn render_request(&self) -> Result<RenderRequest> {
        let audio = self.audio.clone().ok_or(PipelineError::NoAudio)?;

        let clips = self
            .clips
            .iter()
            .enumerate()
            .map(|(index, clip)| {
                self.sources
                    .get(&clip.source_id)
                    .map(|source| ResolvedClip::new(*clip, source.clone()))
                    .ok_or_else(|| ClipError::UnknownSource {
                        index,
                        source_id: clip.source_id.to_string(),
                    }.into())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RenderRequest::new(audio, clips))
    }
}

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::composition::RenderRequest;
use crate::config::Config;
use crate::engine::MediaEngine;
use crate::error::{EngineError, PipelineError, Result};
use crate::render::concat::Concatenator;
use crate::render::mux::Muxer;
use crate::render::progress::{weights, ProgressTracker};
use crate::render::segment::SegmentBuilder;
use crate::render::workspace::{names, WorkingFiles};

/// Where the pipeline is in its current (or last) job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    LoadingAudio,
    ProcessingClips { index: usize, total: usize },
    Stitching,
    Muxing,
    Finalizing,
    Complete,
    Errored,
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }

    /// Whether a job may move from `self` to `next`
    pub fn can_transition_to(&self, next: &RenderState) -> bool {
        use RenderState::*;
        match (self, next) {
            (Idle | Complete | Errored, LoadingAudio) => true,
            (LoadingAudio, ProcessingClips { index: 0, .. }) => true,
            (ProcessingClips { index, total }, ProcessingClips { index: next, total: next_total }) => {
                *next == index + 1 && next_total == total && *next < *total
            }
            (ProcessingClips { index, total }, Stitching) => index + 1 == *total,
            (Stitching, Muxing) => true,
            (Muxing, Finalizing) => true,
            (Finalizing, Complete) => true,
            (current, Errored) => !current.is_terminal(),
            _ => false,
        }
    }

    /// Status text shown to the user while in this state
    pub fn status(&self) -> String {
        match self {
            Self::Idle => "Ready".to_string(),
            Self::LoadingAudio => "Loading audio...".to_string(),
            Self::ProcessingClips { index, total } => {
                format!("Processing clip {} of {}...", index + 1, total)
            }
            Self::Stitching => "Stitching clips together...".to_string(),
            Self::Muxing => "Adding audio track...".to_string(),
            Self::Finalizing => "Finalizing...".to_string(),
            Self::Complete => "Complete!".to_string(),
            Self::Errored => "Render failed".to_string(),
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status())
    }
}

/// Result of a successful render
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Encoded MP4 bytes
    pub bytes: Vec<u8>,

    /// Output duration in seconds (the audio duration)
    pub duration: f64,

    pub started_at: DateTime<Local>,

    pub elapsed: Duration,

    /// Number of segments stitched
    pub segments: usize,
}

/// Drives one render job at a time through a [`MediaEngine`]
///
/// Jobs run strictly sequentially: write the audio, build one segment per
/// clip, stitch, mux, read the result back. Every working file the job
/// creates is deleted before `process_video` returns, whatever the outcome.
pub struct RenderPipeline {
    engine: Arc<dyn MediaEngine>,
    config: Config,
    job_lock: tokio::sync::Mutex<()>,
    state: Mutex<RenderState>,
    cancel: AtomicBool,
}

impl RenderPipeline {
    pub fn new(engine: Arc<dyn MediaEngine>, config: Config) -> Self {
        Self {
            engine,
            config,
            job_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(RenderState::Idle),
            cancel: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> RenderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A job currently holds the pipeline
    pub fn is_busy(&self) -> bool {
        self.job_lock.try_lock().is_err()
    }

    /// Ask the running job to stop at its next stage boundary
    ///
    /// The engine command in flight is allowed to finish.
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Render `request` into a single MP4
    ///
    /// `on_progress` receives `(percent, status)`; percentages never decrease
    /// within a job. Fails fast with [`PipelineError::Busy`] while another job
    /// is in flight and with [`EngineError::NotLoaded`] before the engine is
    /// loaded, neither of which touches engine state.
    pub async fn process_video<F>(&self, request: &RenderRequest, on_progress: F) -> Result<RenderOutput>
    where
        F: Fn(f64, &str) + Send + Sync + 'static,
    {
        let _job = self.job_lock.try_lock().map_err(|_| PipelineError::Busy)?;
        self.cancel.store(false, Ordering::SeqCst);

        let started_at = Local::now();
        let clock = Instant::now();
        self.transition(RenderState::LoadingAudio);

        if !self.engine.is_loaded() {
            self.transition(RenderState::Errored);
            return Err(EngineError::NotLoaded.into());
        }

        if let Err(e) = request.validate() {
            warn!("Rejected render request: {}", e);
            self.transition(RenderState::Errored);
            return Err(e);
        }

        info!(
            "Render started: {} clips over {:.2}s of audio",
            request.clips.len(),
            request.audio.duration
        );

        let tracker = ProgressTracker::new(Arc::new(on_progress));
        let mut files = WorkingFiles::new(self.engine.as_ref()).with_progress(&tracker);
        let result = self.run_stages(&mut files, request, &tracker).await;

        let failures = files.cleanup().await;
        if failures > 0 {
            warn!("{} working files could not be deleted", failures);
        }

        match result {
            Ok(bytes) => {
                self.transition(RenderState::Complete);
                tracker.report(100.0, RenderState::Complete.status());

                let elapsed = clock.elapsed();
                info!("Render complete: {} bytes in {:.2?}", bytes.len(), elapsed);
                Ok(RenderOutput {
                    bytes,
                    duration: request.audio.duration,
                    started_at,
                    elapsed,
                    segments: request.clips.len(),
                })
            }
            Err(e) => {
                error!("Render failed: {}", e);
                self.transition(RenderState::Errored);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        files: &mut WorkingFiles<'_>,
        request: &RenderRequest,
        tracker: &ProgressTracker,
    ) -> Result<Vec<u8>> {
        let audio = &request.audio;
        let total = request.clips.len();

        files.ensure_vacant(request).await?;
        tracker.enter(weights::LOADING_AUDIO, 0.0, RenderState::LoadingAudio.status());
        let audio_name = names::audio(&audio.extension);
        files.write(&audio_name, &audio.bytes).await?;

        let builder = SegmentBuilder::new(self.config.segment.clone());
        let mut segments = Vec::with_capacity(total);
        for (index, clip) in request.clips.iter().enumerate() {
            let state = RenderState::ProcessingClips { index, total };
            self.checkpoint(&state)?;
            self.transition(state);
            segments.push(builder.build(files, index, total, clip, tracker).await?);
        }

        self.checkpoint(&RenderState::Stitching)?;
        self.transition(RenderState::Stitching);
        tracker.enter(weights::STITCHING, request.total_slot_duration(), RenderState::Stitching.status());
        let stitched = Concatenator::run(files, &segments).await?;

        self.checkpoint(&RenderState::Muxing)?;
        self.transition(RenderState::Muxing);
        tracker.enter(weights::MUXING, audio.duration, RenderState::Muxing.status());
        let muxer = Muxer::new(self.config.mux.clone(), &self.config.segment);
        let output = muxer
            .run(files, &stitched, &audio_name, audio.duration, request.total_slot_duration())
            .await?;

        self.checkpoint(&RenderState::Finalizing)?;
        self.transition(RenderState::Finalizing);
        tracker.enter(weights::FINALIZING, 0.0, RenderState::Finalizing.status());
        files.read(&output).await
    }

    fn checkpoint(&self, next: &RenderState) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            info!("Render cancelled before {}", next);
            return Err(PipelineError::Cancelled { stage: next.status() }.into());
        }
        Ok(())
    }

    fn transition(&self, next: RenderState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.can_transition_to(&next) {
            warn!("Unexpected render state change: {:?} -> {:?}", *state, next);
        }
        debug!("Render state: {:?} -> {:?}", *state, next);
        *state = next;
    }
}

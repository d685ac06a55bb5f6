use std::collections::HashSet;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, trace, warn};

use crate::composition::RenderRequest;
use crate::engine::{EngineEvent, MediaEngine};
use crate::error::{PipelineError, Result};
use crate::render::progress::ProgressTracker;

/// Deterministic working file names, keyed by clip index and stage
pub mod names {
    use crate::composition::RenderRequest;

    pub const MANIFEST: &str = "manifest.txt";
    pub const STITCHED: &str = "stitched.mp4";
    pub const FINAL_OUTPUT: &str = "final_output.mp4";

    pub fn audio(extension: &str) -> String {
        if extension.is_empty() {
            "audio".to_string()
        } else {
            format!("audio.{}", extension)
        }
    }

    pub fn clip_source(index: usize, extension: &str) -> String {
        format!("clip_{}_source.{}", index, extension)
    }

    pub fn clip_processed(index: usize) -> String {
        format!("clip_{}_processed.mp4", index)
    }

    pub fn clip_loop_list(index: usize) -> String {
        format!("clip_{}_looplist.txt", index)
    }

    pub fn clip_segment(index: usize) -> String {
        format!("clip_{}_segment.mp4", index)
    }

    /// Every name a render of `request` may create
    pub fn for_request(request: &RenderRequest) -> Vec<String> {
        let mut all = vec![audio(&request.audio.extension)];
        for (index, resolved) in request.clips.iter().enumerate() {
            all.push(clip_source(index, &resolved.source_extension()));
            all.push(clip_processed(index));
            all.push(clip_loop_list(index));
            all.push(clip_segment(index));
        }
        all.extend([MANIFEST, STITCHED, FINAL_OUTPUT].map(String::from));
        all
    }
}

/// Working files of one render job
///
/// Every name is recorded *before* the engine is asked to create it, so a
/// write or command that fails halfway still gets cleaned up.
pub struct WorkingFiles<'e> {
    engine: &'e dyn MediaEngine,
    progress: Option<&'e ProgressTracker>,
    created: Vec<String>,
    produced: HashSet<String>,
}

impl<'e> WorkingFiles<'e> {
    pub fn new(engine: &'e dyn MediaEngine) -> Self {
        Self {
            engine,
            progress: None,
            created: Vec::new(),
            produced: HashSet::new(),
        }
    }

    /// Send progress ticks of every command run through [`exec`](Self::exec) to `tracker`
    pub fn with_progress(mut self, tracker: &'e ProgressTracker) -> Self {
        self.progress = Some(tracker);
        self
    }

    /// Fail if any name `request` would use is already in the store
    ///
    /// Cleanup deletes every name the job touches, so a file that predates the
    /// job must never share one.
    pub async fn ensure_vacant(&self, request: &RenderRequest) -> Result<()> {
        for name in names::for_request(request) {
            if self.engine.file_exists(&name).await? {
                return Err(PipelineError::WorkingFileInUse { name }.into());
            }
        }
        Ok(())
    }

    fn track(&mut self, name: &str) {
        if !self.created.iter().any(|n| n == name) {
            self.created.push(name.to_string());
        }
    }

    /// Store `bytes` under `name`
    pub async fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.track(name);
        self.engine.write_file(name, bytes).await?;
        self.produced.insert(name.to_string());
        Ok(())
    }

    /// Run a command that creates `outputs`
    ///
    /// Engine events are consumed only while this command runs, and whatever
    /// is still queued when it returns is drained before returning, so every
    /// tick lands in the progress window the caller set up for this command.
    pub async fn exec(&mut self, args: Vec<String>, outputs: &[&str]) -> Result<()> {
        for output in outputs {
            self.track(output);
        }

        let engine = self.engine;
        let mut events = engine.subscribe();
        let run = engine.exec(&args);
        tokio::pin!(run);

        let mut open = true;
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                event = events.recv(), if open => match event {
                    Ok(event) => self.forward(event),
                    Err(RecvError::Lagged(skipped)) => trace!("Skipped {} engine events", skipped),
                    Err(RecvError::Closed) => open = false,
                },
            }
        };

        loop {
            match events.try_recv() {
                Ok(event) => self.forward(event),
                Err(TryRecvError::Lagged(skipped)) => trace!("Skipped {} engine events", skipped),
                Err(_) => break,
            }
        }

        result?;
        for output in outputs {
            self.produced.insert(output.to_string());
        }
        Ok(())
    }

    fn forward(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress { elapsed_us } => {
                if let Some(tracker) = self.progress {
                    tracker.on_tick(elapsed_us);
                }
            }
            EngineEvent::Log(line) => {
                // Per-frame status lines
                if !line.starts_with("frame=") {
                    debug!(target: "reel_stitcher::engine", "{}", line);
                }
            }
        }
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.engine.read_file(name).await
    }

    /// Whether a stage of this job has successfully created `name`
    pub fn is_produced(&self, name: &str) -> bool {
        self.produced.contains(name)
    }

    /// Delete an intermediate as soon as it is no longer needed
    ///
    /// The name stays tracked so the final cleanup pass still covers it.
    pub async fn release(&mut self, name: &str) {
        self.produced.remove(name);
        if let Err(e) = self.engine.delete_file(name).await {
            warn!("Failed to release working file {}: {}", name, e);
        }
    }

    /// Every name this job has created or tried to create
    pub fn created(&self) -> &[String] {
        &self.created
    }

    /// Delete every tracked file, swallowing individual failures
    ///
    /// Returns the number of deletions that failed.
    pub async fn cleanup(self) -> usize {
        let mut failures = 0;
        for name in &self.created {
            if let Err(e) = self.engine.delete_file(name).await {
                warn!("Failed to delete working file {}: {}", name, e);
                failures += 1;
            }
        }
        debug!("Cleaned up {} working files ({} failures)", self.created.len(), failures);
        failures
    }
}

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{validate_file_name, EngineEvent, MediaEngine};
use crate::error::{EngineError, Result};

/// Options placed before every command so output is machine-readable
const GLOBAL_ARGS: [&str; 8] = [
    "-hide_banner", "-nostdin", "-nostats", "-y",
    "-progress", "pipe:1",
    "-loglevel", "info",
];

/// Media engine backed by the system `ffmpeg` binary
///
/// Working files live in a private temporary directory created by
/// [`load`](MediaEngine::load) and removed by [`unload`](MediaEngine::unload)
/// or when the engine is dropped.
pub struct FfmpegEngine {
    config: EngineConfig,
    workdir: Mutex<Option<TempDir>>,
    loaded: AtomicBool,
    load_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<EngineEvent>,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            workdir: Mutex::new(None),
            loaded: AtomicBool::new(false),
            load_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    /// Check whether the configured binary runs at all
    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn root(&self) -> Result<PathBuf> {
        let workdir = self.workdir.lock().unwrap_or_else(|e| e.into_inner());
        workdir
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| EngineError::NotLoaded.into())
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.root()?.join(name))
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn load(&self) -> Result<()> {
        let _guard = self.load_lock.lock().await;
        if self.is_loaded() {
            return Ok(());
        }

        if !self.is_available().await {
            return Err(EngineError::LoadFailed {
                reason: format!("'{}' not found or not runnable. Please install FFmpeg.", self.config.ffmpeg_path),
            }.into());
        }

        let dir = tempfile::Builder::new()
            .prefix("reel-stitcher-")
            .tempdir()
            .map_err(|e| EngineError::LoadFailed {
                reason: format!("could not create working directory: {}", e),
            })?;

        info!("Media engine loaded ({}), working files in {:?}", self.config.ffmpeg_path, dir.path());
        *self.workdir.lock().unwrap_or_else(|e| e.into_inner()) = Some(dir);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) {
        let _guard = self.load_lock.lock().await;
        self.loaded.store(false, Ordering::SeqCst);

        let dir = self.workdir.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(dir) = dir {
            if let Err(e) = dir.close() {
                warn!("Failed to remove engine working directory: {}", e);
            }
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote working file {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::FileNotFound { name: name.to_string() }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        // Nothing to delete before load or after unload
        let Ok(path) = self.path_for(name) else {
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        let root = self.root()?;
        let command = args.join(" ");
        debug!("ffmpeg {}", command);

        let failed = |status: String, diagnostics: String| EngineError::ExecutionFailed {
            command: command.clone(),
            status,
            diagnostics,
        };

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(GLOBAL_ARGS)
            .args(args)
            .current_dir(&root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed("not started".to_string(), e.to_string()))?;

        let stdout = child.stdout.take()
            .ok_or_else(|| failed("not started".to_string(), "stdout unavailable".to_string()))?;
        let stderr = child.stderr.take()
            .ok_or_else(|| failed("not started".to_string(), "stderr unavailable".to_string()))?;

        let progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(elapsed_us) = parse_progress_line(&line) {
                    self.emit(EngineEvent::Progress { elapsed_us });
                }
            }
        };

        let keep = self.config.diagnostic_lines;
        let diagnostics = async {
            let mut tail = VecDeque::with_capacity(keep);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if keep > 0 {
                    if tail.len() == keep {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                self.emit(EngineEvent::Log(line));
            }
            tail
        };

        let ((), tail, status) = tokio::join!(progress, diagnostics, child.wait());
        let status = status.map_err(|e| failed("unknown".to_string(), e.to_string()))?;

        if !status.success() {
            let diagnostics = Vec::from(tail).join("\n");
            return Err(failed(status.to_string(), diagnostics).into());
        }

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Extract elapsed output time from a `-progress` key/value line
fn parse_progress_line(line: &str) -> Option<u64> {
    line.trim()
        .strip_prefix("out_time_us=")
        .and_then(|value| value.parse::<u64>().ok())
}

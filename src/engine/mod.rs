//! # Media Engine
//!
//! The render pipeline never touches codecs itself. It drives an external
//! media engine through a small contract: named working files in a private
//! store, one processing command at a time, and an event stream carrying
//! log lines and elapsed-time progress ticks.
//!
//! [`FfmpegEngine`] implements the contract over a system `ffmpeg` binary and
//! a private temporary directory. Any other implementation of [`MediaEngine`]
//! can be injected into [`RenderPipeline`](crate::render::RenderPipeline).

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{EngineError, Result};

pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod testing;

pub use ffmpeg::FfmpegEngine;

/// Notification emitted by an engine while it works
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Free-form diagnostic line
    Log(String),

    /// Elapsed processing time of the running command, in microseconds of
    /// output media (not wall-clock)
    Progress { elapsed_us: u64 },
}

/// Contract between the render pipeline and an external media engine
///
/// All methods suspend the caller until the engine has finished. A single
/// engine instance serves one render job at a time.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Initialize the engine. Calling it again once loaded is a no-op.
    async fn load(&self) -> Result<()>;

    /// Release the engine and everything in its private store
    async fn unload(&self);

    fn is_loaded(&self) -> bool;

    /// Store `bytes` under `name`, replacing any previous contents
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Fails with [`EngineError::FileNotFound`] when `name` does not exist
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Whether `name` is currently in the store
    async fn file_exists(&self, name: &str) -> Result<bool>;

    /// Remove `name`. Deleting a missing file succeeds.
    async fn delete_file(&self, name: &str) -> Result<()>;

    /// Run one processing command over named working files
    async fn exec(&self, args: &[String]) -> Result<()>;

    /// Receive log lines and progress ticks emitted from now on
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Working file names are flat: no directories, no parent references
pub fn validate_file_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidFileName { name: name.to_string() }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_validation() {
        assert!(validate_file_name("clip_0_segment.mp4").is_ok());
        assert!(validate_file_name("manifest.txt").is_ok());

        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("dir/file.mp4").is_err());
        assert!(validate_file_name("dir\\file.mp4").is_err());
    }
}

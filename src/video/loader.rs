use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::types::VideoSource;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Loads video files from disk and measures them with ffprobe
pub struct VideoLoader {
    ffprobe: String,
}

impl VideoLoader {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self { ffprobe: ffprobe.into() }
    }

    /// Read a video file into a source with a known duration
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<VideoSource> {
        let path = path.as_ref();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| VideoError::LoadFailed {
                path: path.display().to_string(),
            })?;

        let duration = self.probe_duration(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!("Loaded video source '{}': {:.3}s, {} bytes", name, duration, bytes.len());
        Ok(VideoSource::new(name, bytes, Some(duration)))
    }

    /// Container duration in seconds as reported by ffprobe
    pub async fn probe_duration<P: AsRef<Path>>(&self, path: P) -> Result<f64> {
        let path = path.as_ref();
        let probe_failed = |reason: String| VideoError::ProbeFailed {
            path: path.display().to_string(),
            reason,
        };

        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(|e| probe_failed(format!("could not run {}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            warn!("ffprobe failed for {}", path.display());
            return Err(probe_failed(String::from_utf8_lossy(&output.stderr).into_owned()).into());
        }

        Ok(Self::parse_duration(&output.stdout).map_err(probe_failed)?)
    }

    fn parse_duration(json: &[u8]) -> std::result::Result<f64, String> {
        let parsed: ProbeOutput = serde_json::from_slice(json)
            .map_err(|e| format!("invalid ffprobe output: {}", e))?;

        let duration = parsed
            .format
            .and_then(|f| f.duration)
            .ok_or_else(|| "no duration in ffprobe output".to_string())?
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("unparseable duration: {}", e))?;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(format!("non-positive duration {}", duration));
        }

        Ok(duration)
    }
}

impl Default for VideoLoader {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_duration() {
        let json = br#"{"format": {"filename": "a.mp4", "duration": "12.480000"}}"#;
        assert_eq!(VideoLoader::parse_duration(json), Ok(12.48));
    }

    #[test]
    fn test_parse_duration_rejects_missing_or_zero() {
        assert!(VideoLoader::parse_duration(br#"{"format": {}}"#).is_err());
        assert!(VideoLoader::parse_duration(br#"{}"#).is_err());
        assert!(VideoLoader::parse_duration(br#"{"format": {"duration": "0.0"}}"#).is_err());
        assert!(VideoLoader::parse_duration(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempdir().unwrap();
        let loader = VideoLoader::default();

        let result = loader.load(dir.path().join("missing.mp4")).await;
        assert!(matches!(
            result,
            Err(crate::error::StitchError::Video(VideoError::LoadFailed { .. }))
        ));
    }
}

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the Reel-Stitcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Media engine settings
    pub engine: EngineConfig,

    /// Per-clip segment normalization settings
    pub segment: SegmentConfig,

    /// Final mux settings
    pub mux: MuxConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            }.into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.segment.validate()?;
        self.mux.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> crate::error::StitchError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }.into()
}

/// Media engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg executable used to run commands
    pub ffmpeg_path: String,

    /// ffprobe executable used to measure source durations
    pub ffprobe_path: String,

    /// Buffered engine events per subscriber before older ones are dropped
    pub event_capacity: usize,

    /// Trailing stderr lines attached to a failed command
    pub diagnostic_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            event_capacity: 256,
            diagnostic_lines: 20,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(invalid("engine.ffmpeg_path", &self.ffmpeg_path));
        }

        if self.event_capacity == 0 {
            return Err(invalid("engine.event_capacity", self.event_capacity));
        }

        Ok(())
    }
}

/// Segment normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Encoder used when pre-encoding each source
    pub video_codec: String,

    /// Encoder preset for the pre-encode pass
    pub preset: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Pixel format of every segment
    pub pixel_format: String,

    /// Force a constant output frame rate
    pub frame_rate: Option<u32>,

    /// Force every segment to this size (letterboxed, rounded down to even)
    pub frame_size: Option<(u32, u32)>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
            frame_rate: None,
            frame_size: None,
        }
    }
}

impl SegmentConfig {
    fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(invalid("segment.crf", self.crf));
        }

        if self.frame_rate == Some(0) {
            return Err(invalid("segment.frame_rate", 0));
        }

        if let Some((width, height)) = self.frame_size {
            if width < 2 || height < 2 {
                return Err(invalid("segment.frame_size", format!("{}x{}", width, height)));
            }
        }

        Ok(())
    }
}

/// How the muxer treats the stitched video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    /// Carry the stitched stream through unchanged
    Copy,
    /// Re-encode (and re-normalize) the stitched stream
    Reencode,
}

/// Final mux configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub video_mode: VideoMode,

    /// Encoder preset when `video_mode = "reencode"`
    pub preset: String,

    /// Constant rate factor when `video_mode = "reencode"`
    pub crf: u8,

    /// Encoder tuning when `video_mode = "reencode"` (e.g. "stillimage")
    pub tune: Option<String>,

    pub audio_codec: String,

    pub audio_bitrate: String,

    /// Move the moov atom to the front for progressive playback
    pub faststart: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            video_mode: VideoMode::Copy,
            preset: "medium".to_string(),
            crf: 23,
            tune: None,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            faststart: true,
        }
    }
}

impl MuxConfig {
    fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(invalid("mux.crf", self.crf));
        }

        // The song is always re-encoded
        let codec = self.audio_codec.trim();
        if codec.is_empty() || codec.eq_ignore_ascii_case("copy") {
            return Err(invalid("mux.audio_codec", &self.audio_codec));
        }

        let bitrate_ok = self
            .audio_bitrate
            .strip_suffix('k')
            .unwrap_or(&self.audio_bitrate)
            .parse::<u32>()
            .map(|value| value > 0)
            .unwrap_or(false);
        if !bitrate_ok {
            return Err(invalid("mux.audio_bitrate", &self.audio_bitrate));
        }

        Ok(())
    }
}

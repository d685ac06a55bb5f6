use std::io::Cursor;
use std::path::Path;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tokio::task;
use tracing::debug;

use crate::audio::types::AudioTrack;
use crate::error::{AudioError, Result};

/// Audio file loader supporting multiple formats
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file and measure its duration
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<AudioTrack> {
        let path = path.as_ref();
        let extension = Self::detect_format(path).unwrap_or_default();

        if !Self::is_format_supported(&extension) {
            return Err(AudioError::UnsupportedFormat { format: extension }.into());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| AudioError::LoadFailed {
                path: path.display().to_string()
            })?;

        Self::from_bytes(bytes, &extension).await
    }

    /// Measure an in-memory audio file and wrap it as a track
    pub async fn from_bytes(bytes: Vec<u8>, extension: &str) -> Result<AudioTrack> {
        let extension = extension.to_lowercase();
        let probe_bytes = bytes.clone();
        let hint = extension.clone();

        let duration = task::spawn_blocking(move || Self::measure_duration(probe_bytes, &hint))
            .await
            .map_err(|e| AudioError::UnknownDuration {
                details: format!("duration probe panicked: {}", e),
            })??;

        debug!("Measured {} audio: {:.3}s, {} bytes", extension, duration, bytes.len());
        Ok(AudioTrack::new(bytes, duration, extension))
    }

    fn measure_duration(bytes: Vec<u8>, extension: &str) -> Result<f64> {
        match extension {
            "wav" => Self::wav_duration(&bytes),
            _ => Self::symphonia_duration(bytes, extension),
        }
    }

    /// WAV headers carry an exact frame count, so hound is enough
    fn wav_duration(bytes: &[u8]) -> Result<f64> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| AudioError::UnknownDuration {
                details: format!("invalid WAV data: {}", e),
            })?;

        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(AudioError::UnknownDuration {
                details: "WAV sample rate is zero".to_string(),
            }.into());
        }

        Ok(reader.duration() as f64 / spec.sample_rate as f64)
    }

    /// Use the container's frame count when present, otherwise sum packet durations
    fn symphonia_duration(bytes: Vec<u8>, extension: &str) -> Result<f64> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(extension);

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::UnknownDuration {
                details: format!("unrecognized audio data: {}", e),
            })?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::UnknownDuration {
                details: "no decodable audio track".to_string(),
            })?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let time_base = params
            .time_base
            .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
            .ok_or_else(|| AudioError::UnknownDuration {
                details: "no time base or sample rate".to_string(),
            })?;

        if let Some(frames) = params.n_frames {
            return Ok(Self::seconds(time_base, frames));
        }

        let mut total: u64 = 0;
        loop {
            match format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() == track_id {
                        total += packet.dur;
                    }
                }
                Err(SymphoniaError::ResetRequired) => continue,
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => {
                    return Err(AudioError::UnknownDuration {
                        details: e.to_string(),
                    }.into());
                }
            }
        }

        if total == 0 {
            return Err(AudioError::UnknownDuration {
                details: "audio track contains no packets".to_string(),
            }.into());
        }

        Ok(Self::seconds(time_base, total))
    }

    fn seconds(time_base: TimeBase, ts: u64) -> f64 {
        let time = time_base.calc_time(ts);
        time.seconds as f64 + time.frac
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Check if a file format is supported
    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}

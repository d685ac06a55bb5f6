use tracing::{info, warn};

use crate::config::{MuxConfig, SegmentConfig, VideoMode};
use crate::error::Result;
use crate::render::workspace::{names, WorkingFiles};

/// Lays the song under the stitched video
///
/// Only the first video stream of the stitched file and the first audio
/// stream of the song are mapped, so cover art embedded in the song never
/// reaches the output. The output is cut at the song's length.
pub struct Muxer {
    config: MuxConfig,
    video_codec: String,
    pixel_format: String,
}

impl Muxer {
    pub fn new(config: MuxConfig, segment: &SegmentConfig) -> Self {
        Self {
            config,
            video_codec: segment.video_codec.clone(),
            pixel_format: segment.pixel_format.clone(),
        }
    }

    pub fn args(&self, video: &str, audio: &str, duration: f64, output: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
        ];

        match self.config.video_mode {
            VideoMode::Copy => args.extend(["-c:v".to_string(), "copy".to_string()]),
            VideoMode::Reencode => {
                args.extend([
                    "-c:v".into(),
                    self.video_codec.clone(),
                    "-preset".into(),
                    self.config.preset.clone(),
                    "-crf".into(),
                    self.config.crf.to_string(),
                ]);
                if let Some(tune) = &self.config.tune {
                    args.extend(["-tune".into(), tune.clone()]);
                }
                args.extend(["-pix_fmt".into(), self.pixel_format.clone()]);
            }
        }

        args.extend([
            "-c:a".into(),
            self.config.audio_codec.clone(),
            "-b:a".into(),
            self.config.audio_bitrate.clone(),
            "-t".into(),
            format!("{:.3}", duration),
        ]);

        if self.config.faststart {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.push(output.into());
        args
    }

    /// Mux `video` with `audio` into [`names::FINAL_OUTPUT`]
    pub async fn run(
        &self,
        files: &mut WorkingFiles<'_>,
        video: &str,
        audio: &str,
        audio_duration: f64,
        video_duration: f64,
    ) -> Result<String> {
        if video_duration + 1e-3 < audio_duration {
            warn!(
                "Clips cover {:.2}s of a {:.2}s song; the picture ends early",
                video_duration, audio_duration
            );
        }

        info!("Muxing {} with {} ({:.2}s)", video, audio, audio_duration);
        files
            .exec(self.args(video, audio, audio_duration, names::FINAL_OUTPUT), &[names::FINAL_OUTPUT])
            .await?;

        files.release(video).await;
        files.release(audio).await;
        Ok(names::FINAL_OUTPUT.to_string())
    }
}

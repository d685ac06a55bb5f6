use tracing::{debug, info};

use crate::composition::ResolvedClip;
use crate::config::SegmentConfig;
use crate::error::{ClipError, Result};
use crate::render::progress::{weights, ProgressTracker};
use crate::render::workspace::{names, WorkingFiles};

// Share of a clip's progress window spent on the pre-encode pass
const PRE_ENCODE_SHARE: f64 = 0.8;

/// Turns one timeline clip into a silent segment of exactly its slot length
///
/// The source is first normalized (audio dropped, even dimensions, uniform
/// pixel format) so every segment shares one codec configuration. The
/// normalized file is then repeated through a concat loop list and cut at the
/// slot length with a stream copy.
pub struct SegmentBuilder {
    config: SegmentConfig,
}

impl SegmentBuilder {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    /// Number of source repetitions needed to cover `target` seconds
    pub fn loop_count(index: usize, target: f64, source_duration: f64) -> Result<u32> {
        if !source_duration.is_finite() || source_duration <= 0.0 {
            return Err(ClipError::InvalidSourceDuration { index, duration: source_duration }.into());
        }

        // Tolerate float noise on exact multiples
        let loops = (target / source_duration - 1e-9).ceil();
        Ok(loops.max(1.0) as u32)
    }

    /// Video filter chain applied during the pre-encode pass
    pub fn normalize_filter(&self) -> String {
        let format = format!("format={}", self.config.pixel_format);
        match self.config.frame_size {
            Some((width, height)) => {
                let (w, h) = (width & !1, height & !1);
                format!(
                    "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,{format}"
                )
            }
            None => format!("scale=trunc(iw/2)*2:trunc(ih/2)*2,{}", format),
        }
    }

    pub fn pre_encode_args(&self, source: &str, processed: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-i".into(),
            source.into(),
            "-an".into(),
            "-vf".into(),
            self.normalize_filter(),
            "-c:v".into(),
            self.config.video_codec.clone(),
            "-preset".into(),
            self.config.preset.clone(),
            "-crf".into(),
            self.config.crf.to_string(),
        ];

        if let Some(rate) = self.config.frame_rate {
            args.push("-r".into());
            args.push(rate.to_string());
        }

        args.push(processed.into());
        args
    }

    /// Concat-demuxer list naming `processed` `count` times
    pub fn loop_list(processed: &str, count: u32) -> String {
        format!("file '{}'\n", processed).repeat(count as usize)
    }

    pub fn trim_args(loop_list: &str, target: f64, segment: &str) -> Vec<String> {
        vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            loop_list.into(),
            "-t".into(),
            format!("{:.3}", target),
            "-map".into(),
            "0:v:0".into(),
            "-c".into(),
            "copy".into(),
            segment.into(),
        ]
    }

    /// Build the segment for clip `index` of `total`, returning its file name
    ///
    /// Intermediates are released once the segment exists; anything left
    /// behind by a failure is removed by the job's cleanup pass.
    pub async fn build(
        &self,
        files: &mut WorkingFiles<'_>,
        index: usize,
        total: usize,
        resolved: &ResolvedClip,
        tracker: &ProgressTracker,
    ) -> Result<String> {
        let target = resolved.target_duration();
        let source_duration = resolved.source.usable_duration().unwrap_or(0.0);
        let loops = Self::loop_count(index, target, source_duration)?;

        let window = weights::clip(index, total);
        let status = format!("Processing clip {} of {}...", index + 1, total);
        info!(
            "Clip {}: {} ({:.2}s) into a {:.2}s slot, {} pass(es)",
            index, resolved.source.name, source_duration, target, loops
        );

        let source = names::clip_source(index, &resolved.source_extension());
        let processed = names::clip_processed(index);
        let loop_list = names::clip_loop_list(index);
        let segment = names::clip_segment(index);

        files.write(&source, &resolved.source.bytes).await?;

        tracker.enter(weights::split(window, 0.0, PRE_ENCODE_SHARE), source_duration, status.clone());
        files
            .exec(self.pre_encode_args(&source, &processed), &[&processed])
            .await?;
        files.release(&source).await;

        files
            .write(&loop_list, Self::loop_list(&processed, loops).as_bytes())
            .await?;

        tracker.enter(weights::split(window, PRE_ENCODE_SHARE, 1.0), target, status);
        files
            .exec(Self::trim_args(&loop_list, target, &segment), &[&segment])
            .await?;
        files.release(&processed).await;
        files.release(&loop_list).await;

        debug!("Clip {} segment ready: {}", index, segment);
        Ok(segment)
    }
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self::new(SegmentConfig::default())
    }
}

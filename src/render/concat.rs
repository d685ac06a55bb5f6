use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::render::workspace::{names, WorkingFiles};

/// Stitches finished segments, in timeline order, into one video stream
///
/// All segments share a codec configuration, so the join is a stream copy
/// through the concat demuxer and never re-encodes.
pub struct Concatenator;

impl Concatenator {
    /// Quote a working file name for a concat-demuxer manifest line
    pub fn quote(name: &str) -> String {
        format!("'{}'", name.replace('\'', "'\\''"))
    }

    pub fn manifest(segments: &[String]) -> String {
        segments
            .iter()
            .map(|segment| format!("file {}\n", Self::quote(segment)))
            .collect()
    }

    pub fn args(manifest: &str, output: &str) -> Vec<String> {
        vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.into(),
            "-c".into(),
            "copy".into(),
            output.into(),
        ]
    }

    /// Join `segments` into [`names::STITCHED`]
    ///
    /// Every listed segment must have been produced by this job; a missing one
    /// fails with [`PipelineError::Concatenation`] before the engine runs.
    pub async fn run(files: &mut WorkingFiles<'_>, segments: &[String]) -> Result<String> {
        if let Some(missing) = segments.iter().find(|s| !files.is_produced(s)) {
            return Err(PipelineError::Concatenation { missing: missing.clone() }.into());
        }

        info!("Stitching {} segments", segments.len());
        let manifest = Self::manifest(segments);
        debug!("Concat manifest:\n{}", manifest.trim_end());

        files.write(names::MANIFEST, manifest.as_bytes()).await?;
        files
            .exec(Self::args(names::MANIFEST, names::STITCHED), &[names::STITCHED])
            .await?;

        for segment in segments {
            files.release(segment).await;
        }
        files.release(names::MANIFEST).await;

        Ok(names::STITCHED.to_string())
    }
}

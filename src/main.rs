use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reel_stitcher::{
    audio::AudioLoader,
    composition::EditorSession,
    config::Config,
    engine::{FfmpegEngine, MediaEngine},
    render::RenderPipeline,
    video::{SourceId, VideoLoader},
};

#[derive(Parser)]
#[command(
    name = "reel-stitcher",
    version,
    about = "Stitch video clips into a music video cut to the length of a song",
    long_about = "Reel-Stitcher fills each timeline slot with a clip, looping short sources and trimming long ones, then lays the song underneath and cuts the video at the song's length."
)]
struct Cli {
    /// Audio file path (WAV, MP3, FLAC, OGG, M4A)
    #[arg(short, long, required_unless_present = "print_config")]
    audio: Option<PathBuf>,

    /// Timeline clip as PATH@START:END in seconds, repeatable, in render order
    #[arg(short = 'C', long = "clip", value_name = "PATH@START:END")]
    clips: Vec<String>,

    /// Output video file path
    #[arg(short, long, required_unless_present = "print_config")]
    output: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

/// Parse `PATH@START:END`
fn parse_clip(spec: &str) -> Result<(PathBuf, f64, f64)> {
    let (path, range) = spec
        .rsplit_once('@')
        .with_context(|| format!("Clip '{}' is missing '@START:END'", spec))?;
    let (start, end) = range
        .split_once(':')
        .with_context(|| format!("Clip '{}' range must be START:END", spec))?;

    let start: f64 = start.trim().parse().with_context(|| format!("Invalid start in '{}'", spec))?;
    let end: f64 = end.trim().parse().with_context(|| format!("Invalid end in '{}'", spec))?;
    Ok((PathBuf::from(path), start, end))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::default().to_toml()?);
        return Ok(());
    }

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Reel-Stitcher v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.validate()?;

    let (Some(audio_path), Some(output_path)) = (cli.audio, cli.output) else {
        bail!("--audio and --output are required");
    };
    if cli.clips.is_empty() {
        bail!("Add at least one --clip PATH@START:END");
    }

    let mut session = EditorSession::new();
    let track = AudioLoader::load(&audio_path)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    info!("Audio: {:?} ({:.2}s)", audio_path, track.duration);
    session.set_audio(track);

    // Each distinct file is read and probed once
    let loader = VideoLoader::new(config.engine.ffprobe_path.clone());
    let mut sources: HashMap<PathBuf, SourceId> = HashMap::new();
    for spec in &cli.clips {
        let (path, start, end) = parse_clip(spec)?;
        let source_id = match sources.get(&path) {
            Some(id) => *id,
            None => {
                let source = loader.load(&path).await.map_err(|e| anyhow::anyhow!(e.user_message()))?;
                info!("Video: {:?} ({:.2}s)", path, source.duration.unwrap_or(0.0));
                let id = session.add_source(source);
                sources.insert(path.clone(), id);
                id
            }
        };
        session.add_clip(source_id, start, end)?;
    }

    let audio_duration = session.audio().map(|a| a.duration).unwrap_or(0.0);
    if session.total_clips_duration() + 1e-3 < audio_duration {
        warn!(
            "Clips cover {:.2}s of {:.2}s of audio",
            session.total_clips_duration(),
            audio_duration
        );
    }

    let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
    engine.load().await.map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let request = session.render_request()?;
    let pipeline = RenderPipeline::new(engine.clone(), config);

    // Print only when the whole percentage or the status changes
    let last = Arc::new(Mutex::new((-1i64, String::new())));
    let result = pipeline
        .process_video(&request, move |percent, status| {
            let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
            let whole = percent.floor() as i64;
            if whole != last.0 || status != last.1 {
                println!("[{:3}%] {}", whole, status);
                *last = (whole, status.to_string());
            }
        })
        .await;

    engine.unload().await;
    let output = result.map_err(|e| anyhow::anyhow!(e.user_message()))?;

    tokio::fs::write(&output_path, &output.bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    info!(
        "Render started {} took {:.1?}; {} segments, {:.2}s",
        output.started_at.format("%H:%M:%S"),
        output.elapsed,
        output.segments,
        output.duration
    );
    info!("Output saved to: {:?}", output_path);
    Ok(())
}

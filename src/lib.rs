//! # Reel-Stitcher
//!
//! Stitch an ordered timeline of video clips into a single music video cut to
//! the length of a song.
//!
//! Each clip occupies a slot of the output timeline. Short sources are looped
//! and long ones trimmed so the slot is filled exactly; clip audio is dropped
//! and the song becomes the only soundtrack.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use reel_stitcher::{
//!     audio::AudioLoader,
//!     composition::EditorSession,
//!     config::Config,
//!     engine::{FfmpegEngine, MediaEngine},
//!     render::RenderPipeline,
//!     video::VideoLoader,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mut session = EditorSession::new();
//! session.set_audio(AudioLoader::load("song.mp3").await?);
//!
//! let intro = session.add_source(VideoLoader::default().load("intro.mp4").await?);
//! session.add_clip(intro, 0.0, 15.0)?;
//!
//! let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
//! engine.load().await?;
//!
//! let pipeline = RenderPipeline::new(engine.clone(), config);
//! let output = pipeline
//!     .process_video(&session.render_request()?, |percent, status| {
//!         println!("[{:3.0}%] {}", percent, status);
//!     })
//!     .await?;
//!
//! std::fs::write("music_video.mp4", &output.bytes)?;
//! engine.unload().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`composition`] - Editing session and resolved render requests
//! - [`engine`] - Media engine contract and the ffmpeg adapter
//! - [`render`] - Segment building, concatenation, muxing and orchestration
//! - [`audio`] / [`video`] - Loading media and measuring durations
//! - [`config`] - Configuration management

pub mod audio;
pub mod composition;
pub mod config;
pub mod engine;
pub mod error;
pub mod render;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{EditorSession, RenderRequest},
    config::Config,
    engine::{FfmpegEngine, MediaEngine},
    error::{Result, StitchError},
    render::{RenderOutput, RenderPipeline},
};

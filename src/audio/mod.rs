//! # Audio Module
//!
//! Loads the music track that drives a render. The pipeline only needs the
//! raw bytes and an accurate duration: the final video is clamped to it and
//! mux progress is measured against it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reel_stitcher::audio::AudioLoader;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let track = AudioLoader::load("song.mp3").await?;
//! println!("Track is {:.1}s long", track.duration);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod types;

pub use loader::AudioLoader;
pub use types::AudioTrack;

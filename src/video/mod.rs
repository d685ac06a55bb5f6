//! # Video Module
//!
//! Video sources, timeline clips, and the loader that measures source files.

pub mod loader;
pub mod types;

pub use loader::VideoLoader;
pub use types::{Clip, SourceId, VideoSource};

//! # Render Pipeline
//!
//! Turns a [`RenderRequest`](crate::composition::RenderRequest) into one MP4:
//!
//! 1. the song is written to the engine's store
//! 2. every clip becomes a silent segment exactly as long as its slot
//!    ([`SegmentBuilder`], loop-and-trim)
//! 3. segments are stream-copied together in timeline order ([`Concatenator`])
//! 4. the song is laid underneath and the result is cut at its length ([`Muxer`])
//!
//! [`RenderPipeline`] sequences the stages, enforces one job at a time,
//! reports progress and deletes every working file it created.

pub mod concat;
pub mod mux;
pub mod pipeline;
pub mod progress;
pub mod segment;
pub mod workspace;

pub use concat::Concatenator;
pub use mux::Muxer;
pub use pipeline::{RenderOutput, RenderPipeline, RenderState};
pub use progress::{ProgressCallback, ProgressTracker};
pub use segment::SegmentBuilder;
pub use workspace::WorkingFiles;

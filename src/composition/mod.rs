//! # Composition
//!
//! The editing session that owns the audio track, the video sources and the
//! ordered clip timeline, and the resolved [`RenderRequest`] it hands to the
//! render pipeline.

pub mod request;
pub mod session;

pub use request::{RenderRequest, ResolvedClip};
pub use session::EditorSession;

use std::sync::{Arc, Mutex};

use tracing::trace;

/// Receives `(percent, status)` updates during a render
pub type ProgressCallback = Arc<dyn Fn(f64, &str) + Send + Sync>;

/// Share of the overall percentage given to each stage
pub mod weights {
    pub const LOADING_AUDIO: (f64, f64) = (0.0, 5.0);
    pub const PROCESSING_CLIPS: (f64, f64) = (5.0, 50.0);
    pub const STITCHING: (f64, f64) = (50.0, 60.0);
    pub const MUXING: (f64, f64) = (60.0, 95.0);
    pub const FINALIZING: (f64, f64) = (95.0, 100.0);

    /// Slice of the clip-processing range owned by clip `index`
    pub fn clip(index: usize, total: usize) -> (f64, f64) {
        let (start, end) = PROCESSING_CLIPS;
        let width = (end - start) / total.max(1) as f64;
        (start + width * index as f64, start + width * (index + 1) as f64)
    }

    /// Sub-range `[from, to]` (fractions) of `range`
    pub fn split(range: (f64, f64), from: f64, to: f64) -> (f64, f64) {
        let width = range.1 - range.0;
        (range.0 + width * from, range.0 + width * to)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: f64,
    end: f64,
    target_secs: f64,
}

struct TrackerState {
    percent: f64,
    status: String,
    window: Window,
}

/// Maps engine elapsed-time ticks onto an overall percentage
///
/// The active window says which part of 0..100 the running command owns and
/// how many seconds of output it is expected to produce. Reported percentages
/// never decrease within a job, so ticks that arrive late (after the job has
/// moved on) are harmless.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    callback: ProgressCallback,
}

impl ProgressTracker {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                percent: 0.0,
                status: String::new(),
                window: Window { start: 0.0, end: 0.0, target_secs: 0.0 },
            }),
            callback,
        }
    }

    /// Start a new window; `target_secs <= 0` disables tick mapping for it
    pub fn enter(&self, range: (f64, f64), target_secs: f64, status: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.window = Window { start: range.0, end: range.1, target_secs };
        state.status = status.into();
        self.publish(&mut state, range.0, true);
    }

    /// Engine reported `elapsed_us` microseconds of output for the running command
    pub fn on_tick(&self, elapsed_us: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let window = state.window;
        if window.target_secs <= 0.0 {
            return;
        }

        let elapsed = elapsed_us as f64 / 1_000_000.0;
        trace!("Engine progress: {:.2}s / {:.2}s", elapsed, window.target_secs);

        let fraction = (elapsed / window.target_secs).clamp(0.0, 1.0);
        let percent = window.start + (window.end - window.start) * fraction;
        self.publish(&mut state, percent, false);
    }

    /// Set an absolute percentage and status text
    pub fn report(&self, percent: f64, status: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.status = status.into();
        self.publish(&mut state, percent, true);
    }

    pub fn percent(&self) -> f64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).percent
    }

    // Invoked under the lock so observers see updates in order
    fn publish(&self, state: &mut TrackerState, candidate: f64, status_changed: bool) {
        let percent = candidate.clamp(0.0, 100.0).max(state.percent);
        if percent > state.percent || status_changed {
            state.percent = percent;
            (self.callback)(percent, &state.status);
        }
    }
}

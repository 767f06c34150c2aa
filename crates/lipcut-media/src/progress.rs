//! Progress tracking: FFmpeg `-progress` output and per-item stage progress.

use std::collections::VecDeque;
use std::time::Duration;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

/// Number of recent item timings the ETA is averaged over.
pub const ETA_WINDOW: usize = 50;

/// Progress over a fixed number of items (frames to analyze or adjust).
///
/// The estimate uses the mean of the last [`ETA_WINDOW`] item durations, so it
/// adapts when processing speed changes part way through a set.
#[derive(Debug, Clone)]
pub struct StageProgress {
    total: usize,
    completed: usize,
    recent: VecDeque<Duration>,
}

/// Snapshot returned after each recorded item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    /// Percentage in `0.0..=100.0`
    pub percent: f64,
    pub eta: Duration,
}

impl StageProgress {
    /// Start tracking `total` items, `already_done` of which were finished earlier.
    pub fn new(total: usize, already_done: usize) -> Self {
        Self {
            total,
            completed: already_done.min(total),
            recent: VecDeque::with_capacity(ETA_WINDOW),
        }
    }

    /// Record one finished item that took `elapsed`.
    pub fn record(&mut self, elapsed: Duration) -> ProgressSnapshot {
        if self.recent.len() == ETA_WINDOW {
            self.recent.pop_back();
        }
        self.recent.push_front(elapsed);
        self.completed += 1;

        self.snapshot()
    }

    /// Current progress without recording an item.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let percent = if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64 * 100.0).min(100.0)
        };

        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            percent,
            eta: self.mean_duration() * self.total.saturating_sub(self.completed) as u32,
        }
    }

    fn mean_duration(&self) -> Duration {
        if self.recent.is_empty() {
            return Duration::ZERO;
        }
        self.recent.iter().sum::<Duration>() / self.recent.len() as u32
    }
}

/// Format a duration as `H:MM:SS`.
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

//! Structured stage logging utilities.
//!
//! Provides consistent, structured logging for pipeline stages with
//! tracing spans and contextual information.

use std::time::Duration;

use tracing::{debug, error, info, warn, Span};

use lipcut_media::{format_eta, FfmpegProgress, ProgressSnapshot};

/// Stage logger for structured logging with consistent formatting.
///
/// Every event carries the stage name and the target it works on (a URL
/// file, a video directory, an image set).
#[derive(Debug, Clone)]
pub struct StageLogger {
    stage: &'static str,
    target: String,
}

impl StageLogger {
    /// Create a logger for `stage` working on `target`.
    pub fn new(stage: &'static str, target: impl std::fmt::Display) -> Self {
        Self {
            stage,
            target: target.to_string(),
        }
    }

    /// Log the start of a stage.
    pub fn log_start(&self, message: &str) {
        info!(
            stage = self.stage,
            target_path = %self.target,
            "Stage started: {}", message
        );
    }

    /// Log a progress update.
    pub fn log_progress(&self, message: &str) {
        info!(
            stage = self.stage,
            target_path = %self.target,
            "Stage progress: {}", message
        );
    }

    /// Log one finished item with percent done and remaining time.
    pub fn log_item(&self, item: &str, elapsed: Duration, snapshot: &ProgressSnapshot) {
        info!(
            stage = self.stage,
            target_path = %self.target,
            item = item,
            elapsed_ms = elapsed.as_millis() as u64,
            completed = snapshot.completed,
            total = snapshot.total,
            "Processed {} | Progress: {:.3}% | Time left: {}",
            item,
            snapshot.percent,
            format_eta(snapshot.eta)
        );
    }

    /// Log one ffmpeg progress report for `step`.
    pub fn log_ffmpeg_progress(&self, step: &str, progress: &FfmpegProgress) {
        debug!(
            stage = self.stage,
            target_path = %self.target,
            step = step,
            frame = progress.frame,
            out_time = %progress.out_time,
            speed = progress.speed,
            complete = progress.is_complete,
            "{}: frame {} at {} ({:.2}x)",
            step,
            progress.frame,
            progress.out_time,
            progress.speed
        );
    }

    /// Progress callback for an ffmpeg run that logs through this logger.
    pub fn ffmpeg_reporter(&self, step: &'static str) -> impl Fn(FfmpegProgress) + Send + 'static {
        let logger = self.clone();
        move |progress| logger.log_ffmpeg_progress(step, &progress)
    }

    /// Log a warning.
    pub fn log_warning(&self, message: &str) {
        warn!(
            stage = self.stage,
            target_path = %self.target,
            "Stage warning: {}", message
        );
    }

    /// Log an error.
    pub fn log_error(&self, message: &str) {
        error!(
            stage = self.stage,
            target_path = %self.target,
            "Stage error: {}", message
        );
    }

    /// Log the completion of a stage.
    pub fn log_completion(&self, message: &str) {
        info!(
            stage = self.stage,
            target_path = %self.target,
            "Stage completed: {}", message
        );
    }

    pub fn stage(&self) -> &str {
        self.stage
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Create a tracing span for this stage.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "stage",
            stage = self.stage,
            target_path = %self.target
        )
    }
}

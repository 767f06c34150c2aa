//! Pipeline configuration.
//!
//! Per-run stage parameters come from the command line. Settings that
//! describe the machine (model location, thresholds, timeouts) come from the
//! environment so they can live in a `.env` file.

use std::path::PathBuf;

use lipcut_media::adjust::DEFAULT_MIN_FACE_SIZE;
use lipcut_media::face::ort_engine::DEFAULT_DETECTION_THRESHOLD;
use lipcut_media::{FfmpegRunner, OrtModelPaths};

use crate::error::{PipelineError, PipelineResult};

/// Default recognition distance threshold on unit-length embeddings.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.1;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory holding detector.onnx, encoder.onnx and landmarks.onnx
    pub model_dir: PathBuf,
    /// Faces farther than this from every known sample are `unknown`
    pub match_threshold: f32,
    /// Minimum detector confidence
    pub detection_threshold: f32,
    /// Faces smaller than this (either side, pixels) are not adjusted
    pub min_face_size: i32,
    /// Kill FFmpeg runs that take longer than this
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Seed for frame matching; random when unset
    pub match_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            ffmpeg_timeout_secs: None,
            match_seed: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup; unset or unparsable values use defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            model_dir: lookup("LIPCUT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            match_threshold: lookup("LIPCUT_MATCH_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.match_threshold),
            detection_threshold: lookup("LIPCUT_DETECTION_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detection_threshold),
            min_face_size: lookup("LIPCUT_MIN_FACE_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_face_size),
            ffmpeg_timeout_secs: lookup("LIPCUT_FFMPEG_TIMEOUT_SECS").and_then(|s| s.parse().ok()),
            match_seed: lookup("LIPCUT_MATCH_SEED").and_then(|s| s.parse().ok()),
        }
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return Err(PipelineError::config_error(format!(
                "LIPCUT_MATCH_THRESHOLD must be positive, got {}",
                self.match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(PipelineError::config_error(format!(
                "LIPCUT_DETECTION_THRESHOLD must be between 0 and 1, got {}",
                self.detection_threshold
            )));
        }
        if self.min_face_size < 1 {
            return Err(PipelineError::config_error(format!(
                "LIPCUT_MIN_FACE_SIZE must be at least 1, got {}",
                self.min_face_size
            )));
        }
        if self.ffmpeg_timeout_secs == Some(0) {
            return Err(PipelineError::config_error(
                "LIPCUT_FFMPEG_TIMEOUT_SECS must be at least 1",
            ));
        }
        Ok(())
    }

    /// FFmpeg runner honoring the configured timeout.
    pub fn ffmpeg_runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_optional_timeout(self.ffmpeg_timeout_secs)
    }

    /// Paths of the three face models.
    pub fn model_paths(&self) -> OrtModelPaths {
        OrtModelPaths::from_dir(&self.model_dir)
    }
}

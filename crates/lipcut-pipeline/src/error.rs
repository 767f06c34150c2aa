//! Pipeline error types.

use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Training failed: {0}")]
    TrainingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Stage task failed: {0}")]
    TaskFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] lipcut_media::MediaError),

    #[error("Analysis data error: {0}")]
    Model(#[from] lipcut_models::ModelError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn training_failed(msg: impl Into<String>) -> Self {
        Self::TrainingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Fail unless `path` is an existing directory.
    pub fn require_dir(path: &std::path::Path) -> PipelineResult<()> {
        if path.is_dir() {
            Ok(())
        } else {
            Err(Self::DirectoryNotFound(path.to_path_buf()))
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}

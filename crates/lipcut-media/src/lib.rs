#![deny(unreachable_patterns)]
//! Media processing for the lipcut pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a cancellable runner
//! - Progress parsing from `-progress pipe:2` and per-item ETA tracking
//! - yt-dlp downloads
//! - Frame/audio extraction, audio cuts, bucket encoding and concatenation
//! - Face detection, recognition and landmarks over ONNX Runtime
//! - Face alignment for adjusted frames

pub mod adjust;
pub mod clip;
pub mod command;
pub mod download;
pub mod error;
pub mod extract;
pub mod face;
pub mod fs_utils;
pub mod progress;

pub use adjust::{adjust_frame, AdjustOutcome, AdjustedFrame, RejectReason};
pub use clip::{concat_videos, cut_audio, encode_bucket};
pub use command::{check_ffmpeg, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::download_video;
pub use error::{MediaError, MediaResult};
pub use extract::{extract_audio, extract_frames};
pub use face::{
    FaceClassifier, FaceEncoding, FaceEngine, FaceLandmarks, LabeledEncoding, OrtFaceEngine,
    OrtModelPaths,
};
pub use progress::{format_eta, FfmpegProgress, ProgressSnapshot, StageProgress};

//! CONVERT stage: split each video into numbered frames and an audio track.

use std::path::{Path, PathBuf};

use lipcut_media::extract::{extract_audio, extract_frames};
use lipcut_media::fs_utils::{file_name_str, list_files_sorted};
use lipcut_media::FfmpegRunner;
use lipcut_models::layout::{images_dir_for_videos, is_video_file, video_id_from_file_name};
use lipcut_models::ImageSet;

use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;

/// Outcome counts of one CONVERT run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertReport {
    pub converted: usize,
    /// Already had a `frames` directory
    pub skipped: usize,
    pub failed: usize,
}

/// Image set a video converts into: `images/<video-id>` next to its directory.
pub fn image_set_for_video(video_path: &Path) -> Option<ImageSet> {
    let video_dir = video_path.parent()?;
    let video_id = video_id_from_file_name(file_name_str(video_path)?);
    Some(ImageSet::new(images_dir_for_videos(video_dir).join(video_id)))
}

/// Convert every `mkv`, `webm` and `mp4` file in `video_dir`, in name order.
///
/// A video whose extraction fails is logged and counted; its partial output
/// is removed so the next run retries it.
pub async fn convert_directory(
    runner: &FfmpegRunner,
    video_dir: impl AsRef<Path>,
    fps: u32,
    qscale: u8,
) -> PipelineResult<ConvertReport> {
    let video_dir = video_dir.as_ref();
    PipelineError::require_dir(video_dir)?;

    let logger = StageLogger::new("convert", video_dir.display());
    logger.log_start(&format!("fps {}, qscale {}", fps, qscale));

    tokio::fs::create_dir_all(images_dir_for_videos(video_dir)).await?;

    let videos: Vec<PathBuf> = list_files_sorted(video_dir, is_video_file)?;
    let mut report = ConvertReport::default();

    for video in &videos {
        match convert_video(runner, video, fps, qscale).await {
            Ok(true) => report.converted += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                logger.log_error(&format!("Failed to convert {}: {}", video.display(), e));
                report.failed += 1;
            }
        }
    }

    logger.log_completion(&format!(
        "{} converted, {} skipped, {} failed",
        report.converted, report.skipped, report.failed
    ));
    Ok(report)
}

/// Convert one video. Returns `false` when its frames already exist.
pub async fn convert_video(
    runner: &FfmpegRunner,
    video_path: impl AsRef<Path>,
    fps: u32,
    qscale: u8,
) -> PipelineResult<bool> {
    let video_path = video_path.as_ref();
    let set = image_set_for_video(video_path).ok_or_else(|| {
        PipelineError::invalid_input(format!("not a video file path: {}", video_path.display()))
    })?;
    let logger = StageLogger::new("convert", video_path.display());

    let frames_dir = set.frames_dir();
    if frames_dir.is_dir() {
        logger.log_progress(&format!("{} already has images, not converting", set.name()));
        return Ok(false);
    }

    tokio::fs::create_dir_all(&frames_dir).await?;

    let result = async {
        let reporter = logger.ffmpeg_reporter("frames");
        extract_frames(runner, video_path, &frames_dir, fps, qscale, reporter).await?;
        extract_audio(runner, video_path, set.audio_path()).await
    }
    .await;

    if let Err(e) = result {
        if let Err(cleanup) = tokio::fs::remove_dir_all(&frames_dir).await {
            logger.log_warning(&format!("Could not remove partial frames: {}", cleanup));
        }
        return Err(e.into());
    }

    logger.log_completion(&format!("Converted into {}", set.root().display()));
    Ok(true)
}

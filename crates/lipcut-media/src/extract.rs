//! Frame and audio extraction from a source video.

use std::path::Path;
use tracing::info;

use lipcut_models::frame::FRAME_PATTERN;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::progress::FfmpegProgress;

/// Default frames extracted per second of video.
pub const DEFAULT_FPS: u32 = 12;

/// Default JPEG quality scale (2 best, 31 worst).
pub const DEFAULT_QSCALE: u8 = 2;

/// Audio bitrate of the extracted track, in bits per second.
pub const AUDIO_BITRATE: u32 = 192_000;

/// Command writing `frames_dir/%05d.jpg` at `fps` frames per second.
pub fn frames_command(video: &Path, frames_dir: &Path, fps: u32, qscale: u8) -> FfmpegCommand {
    FfmpegCommand::new(video, frames_dir.join(FRAME_PATTERN))
        .video_filter(format!("fps={}", fps))
        .qscale(qscale)
}

/// Command writing the audio track of `video` as MP3.
pub fn audio_command(video: &Path, audio_path: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, audio_path)
        .format("mp3")
        .audio_bitrate(AUDIO_BITRATE)
        .no_video()
}

/// Extract frames at `fps` into `frames_dir`, which must exist.
///
/// `on_progress` receives ffmpeg's periodic progress reports.
pub async fn extract_frames<F>(
    runner: &FfmpegRunner,
    video: impl AsRef<Path>,
    frames_dir: impl AsRef<Path>,
    fps: u32,
    qscale: u8,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let video = video.as_ref();
    let frames_dir = frames_dir.as_ref();

    info!(
        video = %video.display(),
        frames_dir = %frames_dir.display(),
        fps = fps,
        qscale = qscale,
        "Extracting frames"
    );

    runner
        .run_with_progress(&frames_command(video, frames_dir, fps, qscale), on_progress)
        .await
}

/// Extract the audio track of `video` to `audio_path`.
pub async fn extract_audio(
    runner: &FfmpegRunner,
    video: impl AsRef<Path>,
    audio_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let video = video.as_ref();
    let audio_path = audio_path.as_ref();

    info!(
        video = %video.display(),
        audio = %audio_path.display(),
        "Extracting audio"
    );

    runner.run(&audio_command(video, audio_path)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail(args: &[String], n: usize) -> Vec<&str> {
        args[args.len() - n..].iter().map(String::as_str).collect()
    }

    #[test]
    fn test_frames_command() {
        let cmd = frames_command(Path::new("/v/abc.mkv"), Path::new("/i/abc/frames"), 12, 2);
        let args = cmd.build_args();
        assert_eq!(
            tail(&args, 7),
            vec!["-i", "/v/abc.mkv", "-vf", "fps=12", "-qscale:v", "2", "/i/abc/frames/%05d.jpg"]
        );
    }

    #[test]
    fn test_audio_command() {
        let cmd = audio_command(Path::new("/v/abc.mkv"), Path::new("/i/abc/audio.mp3"));
        let args = cmd.build_args();
        assert_eq!(
            tail(&args, 8),
            vec!["-i", "/v/abc.mkv", "-f", "mp3", "-ab", "192000", "-vn", "/i/abc/audio.mp3"]
        );
    }
}

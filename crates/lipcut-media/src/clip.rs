//! Clip assembly: audio cuts, image-sequence encoding and concatenation.
//!
//! A compiled video is built from buckets. Each bucket is a run of frames
//! with its own slice of the source audio, encoded to H.264/AAC and then
//! concatenated without re-encoding.

use std::path::{Path, PathBuf};
use tracing::info;

use lipcut_models::frame::FRAME_PATTERN;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::progress::FfmpegProgress;

/// CRF used for bucket encodes.
pub const BUCKET_CRF: u8 = 23;

/// Pads odd dimensions to even, which yuv420p requires.
pub const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// Seconds offset of a 1-based frame number at `fps`.
pub fn frame_timestamp(frame_number: u32, fps: u32) -> f64 {
    f64::from(frame_number.saturating_sub(1)) / f64::from(fps.max(1))
}

/// Format seconds the way ffmpeg accepts them.
fn format_seconds(secs: f64) -> String {
    format!("{:.6}", secs)
}

/// Command copying the audio between two 1-based frame numbers.
pub fn audio_cut_command(
    audio: &Path,
    output: &Path,
    first_frame: u32,
    last_frame: u32,
    fps: u32,
) -> FfmpegCommand {
    FfmpegCommand::new(audio, output)
        .start_at(format_seconds(frame_timestamp(first_frame, fps)))
        .end_at(format_seconds(frame_timestamp(last_frame, fps)))
        .codec_copy()
}

/// Command encoding `frames_dir/%05d.jpg` with `audio` into `output`.
pub fn bucket_encode_command(frames_dir: &Path, audio: &Path, output: &Path, fps: u32) -> FfmpegCommand {
    FfmpegCommand::new(frames_dir.join(FRAME_PATTERN), output)
        .input_frame_rate(fps)
        .add_input(audio)
        .video_codec("libx264")
        .audio_codec("aac")
        .video_filter(EVEN_PAD_FILTER)
        .pixel_format("yuv420p")
        .crf(BUCKET_CRF)
        .output_frame_rate(fps)
        .shortest()
}

/// Command concatenating the files named in a concat list.
pub fn concat_command(list: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(list, output).concat_list().codec_copy()
}

/// Contents of an ffmpeg concat list for `videos`.
///
/// Entries are written as absolute paths: the concat demuxer resolves
/// relative entries against the list file, not the working directory.
pub fn concat_list_contents(videos: &[PathBuf]) -> String {
    videos
        .iter()
        .map(|path| {
            let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            // single quotes are escaped the way the concat demuxer expects
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Cut the audio spanning frames `first_frame..=last_frame`.
pub async fn cut_audio(
    runner: &FfmpegRunner,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    first_frame: u32,
    last_frame: u32,
    fps: u32,
) -> MediaResult<()> {
    let cmd = audio_cut_command(audio.as_ref(), output.as_ref(), first_frame, last_frame, fps);
    runner.run(&cmd).await
}

/// Encode a directory of numbered frames with an audio track.
pub async fn encode_bucket<F>(
    runner: &FfmpegRunner,
    frames_dir: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fps: u32,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let output = output.as_ref();
    let cmd = bucket_encode_command(frames_dir.as_ref(), audio.as_ref(), output, fps);
    runner.run_with_progress(&cmd, on_progress).await?;
    info!(output = %output.display(), "Encoded bucket");
    Ok(())
}

/// Write a concat list for `videos` to `list_path` and join them into `output`.
pub async fn concat_videos(
    runner: &FfmpegRunner,
    videos: &[PathBuf],
    list_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let list_path = list_path.as_ref();
    let output = output.as_ref();

    tokio::fs::write(list_path, concat_list_contents(videos)).await?;
    runner.run(&concat_command(list_path, output)).await?;

    info!(
        output = %output.display(),
        parts = videos.len(),
        "Concatenated videos"
    );
    Ok(())
}

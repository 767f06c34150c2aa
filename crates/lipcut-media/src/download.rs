//! Video download using yt-dlp.
//!
//! Videos are saved as `<video-id>.<ext>` in the target directory, limited to
//! the requested maximum height.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Default maximum video height.
pub const DEFAULT_QUALITY: u32 = 720;

/// yt-dlp format selector for a maximum height.
pub fn format_selector(quality: u32) -> String {
    format!("bestvideo[height<={quality}]+bestaudio/best[height<={quality}]")
}

/// yt-dlp output template saving into `videos_dir` by video id.
pub fn output_template(videos_dir: &Path) -> String {
    format!("{}/%(id)s.%(ext)s", videos_dir.display())
}

/// Build the yt-dlp argument list for one URL.
pub fn build_download_args(url: &str, videos_dir: &Path, quality: u32) -> Vec<String> {
    vec![
        url.to_string(),
        "--no-progress".to_string(),
        "-f".to_string(),
        format_selector(quality),
        "-o".to_string(),
        output_template(videos_dir),
    ]
}

/// Download a video from `url` into `videos_dir` using yt-dlp.
///
/// # Returns
///
/// - `Ok(())` if yt-dlp exited successfully
/// - `Err(MediaError::YtDlpNotFound)` if yt-dlp is not installed
/// - `Err(MediaError::DownloadFailed)` with the last stderr line otherwise
pub async fn download_video(url: &str, videos_dir: impl AsRef<Path>, quality: u32) -> MediaResult<()> {
    let videos_dir = videos_dir.as_ref();

    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;

    info!(
        url = %url,
        output_dir = %videos_dir.display(),
        quality = quality,
        "Downloading video"
    );

    let args = build_download_args(url, videos_dir, quality);
    let output = Command::new("yt-dlp")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("yt-dlp stderr: {}", stderr);

        let error_msg = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("Unknown error");

        if stderr.contains("429") || stderr.contains("Too Many Requests") {
            warn!(url = %url, "YouTube rate limit detected");
        }

        return Err(MediaError::download_failed(format!(
            "yt-dlp failed: {}",
            error_msg
        )));
    }

    info!(url = %url, "Downloaded video successfully");
    Ok(())
}

/// Whether a directory entry name belongs to an already downloaded video.
pub fn is_downloaded(file_names: &[String], video_id: &str) -> bool {
    file_names.iter().any(|name| name.contains(video_id))
}

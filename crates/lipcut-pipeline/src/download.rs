//! DOWNLOAD stage: fetch every video listed in a URL file.

use std::path::Path;

use lipcut_media::download::{download_video, is_downloaded};
use lipcut_media::fs_utils::list_names_sorted;
use lipcut_models::extract_youtube_id;
use lipcut_models::layout::videos_dir_for_url_file;

use crate::error::PipelineResult;
use crate::logging::StageLogger;

/// Outcome counts of one DOWNLOAD run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    /// Already present in `videos/`
    pub skipped: usize,
    /// Unparseable URLs and failed downloads
    pub failed: usize,
}

/// Parse a URL list: one URL per line, blank lines and `#` comments ignored.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and parse a URL list file.
pub fn read_url_list(path: impl AsRef<Path>) -> PipelineResult<Vec<String>> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Ok(parse_url_list(&contents))
}

/// Download `urls` into the `videos` directory next to `url_file`.
///
/// Videos whose id already appears in a file name there are skipped. A failed
/// download is logged and counted; the remaining URLs are still attempted.
pub async fn download_videos(
    url_file: impl AsRef<Path>,
    urls: &[String],
    quality: u32,
) -> PipelineResult<DownloadReport> {
    let videos_dir = videos_dir_for_url_file(url_file.as_ref());
    let logger = StageLogger::new("download", videos_dir.display());
    logger.log_start(&format!("{} URLs, max height {}", urls.len(), quality));

    tokio::fs::create_dir_all(&videos_dir).await?;

    let mut report = DownloadReport::default();
    for url in urls {
        let video_id = match extract_youtube_id(url) {
            Ok(id) => id,
            Err(e) => {
                logger.log_warning(&format!("Skipping {}: {}", url, e));
                report.failed += 1;
                continue;
            }
        };

        // Listed per URL so a repeated URL is only fetched once
        let existing = list_names_sorted(&videos_dir)?;
        if is_downloaded(&existing, &video_id) {
            logger.log_progress(&format!("{} already exists, not downloading", video_id));
            report.skipped += 1;
            continue;
        }

        match download_video(url, &videos_dir, quality).await {
            Ok(()) => report.downloaded += 1,
            Err(e) => {
                logger.log_error(&format!("Failed to download {}: {}", url, e));
                report.failed += 1;
            }
        }
    }

    logger.log_completion(&format!(
        "{} downloaded, {} skipped, {} failed",
        report.downloaded, report.skipped, report.failed
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_url_list() {
        let contents = "\
https://www.youtube.com/watch?v=7ISn-ki81EI
# commented out
  https://youtu.be/2lTB1pIg1y0

";
        assert_eq!(
            parse_url_list(contents),
            vec![
                "https://www.youtube.com/watch?v=7ISn-ki81EI",
                "https://youtu.be/2lTB1pIg1y0",
            ]
        );
    }

    #[test]
    fn test_read_url_list() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("urls.txt");
        std::fs::write(&path, "#none\n").unwrap();
        assert!(read_url_list(&path).unwrap().is_empty());
        assert!(read_url_list(temp.path().join("missing.txt")).is_err());
    }

    #[tokio::test]
    async fn test_existing_and_invalid_urls_need_no_download() {
        let temp = TempDir::new().unwrap();
        let url_file = temp.path().join("urls.txt");
        let videos = temp.path().join("videos");
        std::fs::create_dir(&videos).unwrap();
        std::fs::write(videos.join("7ISn-ki81EI.mkv"), b"video").unwrap();

        let urls = vec![
            "https://www.youtube.com/watch?v=7ISn-ki81EI".to_string(),
            "https://www.youtube.com/watch?v=7ISn-ki81EI".to_string(),
            "not a url".to_string(),
        ];
        let report = download_videos(&url_file, &urls, 720).await.unwrap();
        assert_eq!(
            report,
            DownloadReport {
                downloaded: 0,
                skipped: 2,
                failed: 1
            }
        );
    }

    #[tokio::test]
    #[ignore = "requires yt-dlp and network access"]
    async fn test_download_real_video() {
        let temp = TempDir::new().unwrap();
        let url_file = temp.path().join("urls.txt");
        let urls = vec!["https://www.youtube.com/watch?v=jNQXAC9IVRw".to_string()];
        let report = download_videos(&url_file, &urls, 240).await.unwrap();
        assert_eq!(report.downloaded, 1);
    }
}

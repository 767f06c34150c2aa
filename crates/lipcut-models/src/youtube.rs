//! YouTube URL parsing.
//!
//! Downloaded videos are saved as `<video-id>.<ext>`, so the id doubles as the
//! key for duplicate detection and for the per-video image directory.

use thiserror::Error;

/// Errors that can occur during YouTube ID extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeIdError {
    #[error("URL is not a valid YouTube URL")]
    InvalidYoutubeUrl,

    #[error("Video ID has invalid format")]
    InvalidVideoId,

    #[error("Video ID not found in URL")]
    VideoIdNotFound,
}

/// Result type for YouTube ID extraction.
pub type YoutubeIdResult<T> = Result<T, YoutubeIdError>;

/// Markers that precede the video id, tried in order.
const ID_MARKERS: &[&str] = &["?v=", "&v=", "youtu.be/", "/embed/", "/v/", "/shorts/"];

/// Extract the 11-character video ID from a YouTube URL.
///
/// Supports:
/// - https://youtube.com/watch?v=VIDEO_ID
/// - https://youtu.be/VIDEO_ID
/// - https://youtube.com/embed/VIDEO_ID
/// - https://youtube.com/v/VIDEO_ID
/// - https://youtube.com/shorts/VIDEO_ID
///
/// Trailing query parameters and fragments are ignored.
pub fn extract_youtube_id(url: &str) -> YoutubeIdResult<String> {
    let url = url.trim();

    let lower = url.to_ascii_lowercase();
    if !(lower.contains("youtube.com") || lower.contains("youtu.be")) {
        return Err(YoutubeIdError::InvalidYoutubeUrl);
    }

    for marker in ID_MARKERS {
        if let Some(pos) = url.find(marker) {
            let remaining = &url[pos + marker.len()..];
            if remaining.is_empty() && *marker != "?v=" && *marker != "&v=" {
                continue;
            }
            return validate_youtube_id(id_segment(remaining));
        }
    }

    Err(YoutubeIdError::VideoIdNotFound)
}

/// Cut a segment at the first URL delimiter.
fn id_segment(segment: &str) -> &str {
    let end = segment
        .find(|c| matches!(c, '&' | '#' | '?' | '/'))
        .unwrap_or(segment.len());
    segment[..end].trim()
}

fn validate_youtube_id(id: &str) -> YoutubeIdResult<String> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if id.len() != 11 || !valid_chars {
        return Err(YoutubeIdError::InvalidVideoId);
    }

    Ok(id.to_string())
}

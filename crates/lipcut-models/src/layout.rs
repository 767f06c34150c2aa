//! On-disk project layout.
//!
//! ```text
//! project/
//!   urls.txt
//!   videos/<video-id>.<ext>
//!   images/<video-id>/
//!     frames/00001.jpg ...
//!     audio.mp3
//!     analysis.txt
//!     adjustments/00001_34.jpg ...
//!     buckets/<n>/{00001.jpg ..., audio.mp3, video.mp4}
//!     buckets/{video_list.txt, video.mp4}
//! ```

use std::path::{Path, PathBuf};

pub const VIDEOS_DIR: &str = "videos";
pub const IMAGES_DIR: &str = "images";
pub const FRAMES_DIR: &str = "frames";
pub const ADJUSTMENTS_DIR: &str = "adjustments";
pub const BUCKETS_DIR: &str = "buckets";
pub const AUDIO_FILE: &str = "audio.mp3";
pub const ANALYSIS_FILE: &str = "analysis.txt";
pub const VIDEO_FILE: &str = "video.mp4";
pub const VIDEO_LIST_FILE: &str = "video_list.txt";
pub const MODEL_FILE: &str = "model.json";

/// Container extensions the convert stage accepts.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "webm", "mp4"];

/// Directory downloaded videos are saved to: a `videos` sibling of the URL file.
pub fn videos_dir_for_url_file(url_file: &Path) -> PathBuf {
    url_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(VIDEOS_DIR)
}

/// Directory extracted frames go to: an `images` sibling of the videos directory.
pub fn images_dir_for_videos(video_dir: &Path) -> PathBuf {
    video_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(IMAGES_DIR)
}

/// Video id of a downloaded file: its name up to the first dot.
pub fn video_id_from_file_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Whether a file name looks like a convertible video.
pub fn is_video_file(file_name: &str) -> bool {
    VIDEO_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

/// Paths inside one image set (`images/<video-id>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    root: PathBuf,
}

impl ImageSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    pub fn analysis_path(&self) -> PathBuf {
        self.root.join(ANALYSIS_FILE)
    }

    pub fn adjustments_dir(&self) -> PathBuf {
        self.root.join(ADJUSTMENTS_DIR)
    }

    pub fn buckets_dir(&self) -> PathBuf {
        self.root.join(BUCKETS_DIR)
    }

    /// Directory of bucket `number` (1-based).
    pub fn bucket_dir(&self, number: usize) -> PathBuf {
        self.buckets_dir().join(number.to_string())
    }

    /// Final compiled video of this set.
    pub fn compiled_video_path(&self) -> PathBuf {
        self.buckets_dir().join(VIDEO_FILE)
    }

    /// Display name: the set's directory name.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }
}

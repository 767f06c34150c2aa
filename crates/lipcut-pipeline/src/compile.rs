//! COMPILE stage: rebuild videos from look-alike reference frames.
//!
//! Every adjusted frame of a source video is replaced by a random reference
//! frame with the same (or the nearest available) mouth ratio. Runs of
//! consecutive frames become buckets, each encoded with its slice of the
//! source audio, and the buckets are joined into `buckets/video.mp4`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lipcut_media::fs_utils::{
    file_name_str, list_files_sorted, list_subdirs_sorted, recreate_dir, remove_file_if_exists,
};
use lipcut_media::{concat_videos, cut_audio, encode_bucket, FfmpegRunner};
use lipcut_models::layout::{AUDIO_FILE, VIDEO_FILE, VIDEO_LIST_FILE};
use lipcut_models::{frame_file_name, AdjustedFrameName, ImageSet, MouthRatio};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;

/// Largest ratio distance searched for a replacement frame.
pub const MAX_RATIO_OFFSET: i32 = 19;

/// An adjusted frame on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFrame {
    pub name: AdjustedFrameName,
    pub path: PathBuf,
}

impl SourceFrame {
    pub fn frame_number(&self) -> u32 {
        self.name.frame_number
    }

    pub fn ratio(&self) -> MouthRatio {
        self.name.ratio
    }
}

/// Reference frames grouped by mouth ratio.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    by_ratio: BTreeMap<MouthRatio, Vec<PathBuf>>,
}

impl FrameIndex {
    pub fn insert(&mut self, ratio: MouthRatio, path: PathBuf) {
        self.by_ratio.entry(ratio).or_default().push(path);
    }

    /// Frames with exactly `ratio`.
    pub fn candidates(&self, ratio: MouthRatio) -> &[PathBuf] {
        self.by_ratio.get(&ratio).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of indexed frames.
    pub fn len(&self) -> usize {
        self.by_ratio.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ratio.is_empty()
    }
}

/// Outcome counts of one COMPILE run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub compiled: usize,
    /// Sets with no bucket long enough to keep
    pub empty: usize,
    pub failed: usize,
}

/// RNG for frame matching, seeded when a seed is configured.
pub fn match_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Adjusted frames in `adjustments_dir`, sorted by frame number.
///
/// Files whose name is not an adjusted frame name are ignored.
pub fn list_adjusted_frames(adjustments_dir: &Path) -> PipelineResult<Vec<SourceFrame>> {
    let mut frames: Vec<SourceFrame> = list_files_sorted(adjustments_dir, |_| true)?
        .into_iter()
        .filter_map(|path| {
            let name = AdjustedFrameName::parse(file_name_str(&path)?).ok()?;
            Some(SourceFrame { name, path })
        })
        .collect();
    frames.sort_by_key(SourceFrame::frame_number);
    Ok(frames)
}

/// Canonical form of an existing directory.
///
/// Frame paths from the index and from a source set are compared to keep a
/// frame from replacing itself, so both sides are resolved the same way.
pub fn resolve_dir(dir: &Path) -> PipelineResult<PathBuf> {
    PipelineError::require_dir(dir)?;
    Ok(std::fs::canonicalize(dir)?)
}

/// Index every adjusted frame under `reference_dir/<set>/adjustments`.
///
/// Sets without an `adjustments` directory are skipped.
pub fn build_frame_index(reference_dir: &Path) -> PipelineResult<FrameIndex> {
    let reference_dir = resolve_dir(reference_dir)?;

    let mut index = FrameIndex::default();
    for set_dir in list_subdirs_sorted(&reference_dir)? {
        let adjustments_dir = ImageSet::new(&set_dir).adjustments_dir();
        if !adjustments_dir.is_dir() {
            continue;
        }
        for frame in list_adjusted_frames(&adjustments_dir)? {
            index.insert(frame.ratio(), frame.path);
        }
    }

    tracing::info!(
        reference_dir = %reference_dir.display(),
        frames = index.len(),
        "Built reference frame index"
    );
    Ok(index)
}

/// Split frames into runs of near-consecutive frame numbers.
///
/// A gap of one or two missing frames is filled by repeating the previous
/// frame; a larger gap starts a new bucket. Buckets shorter than `fps / 2`
/// frames are dropped.
pub fn source_frame_buckets(mut frames: Vec<SourceFrame>, fps: u32) -> Vec<Vec<SourceFrame>> {
    frames.sort_by_key(SourceFrame::frame_number);

    let mut buckets: Vec<Vec<SourceFrame>> = Vec::new();
    let mut current: Vec<SourceFrame> = Vec::new();

    for frame in frames {
        if let Some(previous) = current.last().cloned() {
            let gap = frame.frame_number().saturating_sub(previous.frame_number());
            match gap {
                0 | 1 => {}
                2 | 3 => {
                    for _ in 1..gap {
                        current.push(previous.clone());
                    }
                }
                _ => buckets.push(std::mem::take(&mut current)),
            }
        }
        current.push(frame);
    }
    if !current.is_empty() {
        buckets.push(current);
    }

    let min_len = (fps / 2) as usize;
    buckets.retain(|bucket| bucket.len() >= min_len);
    buckets
}

/// Ratio offsets in search order: `0, +1, -1, +2, -2, …`.
fn ratio_offsets() -> impl Iterator<Item = i32> {
    std::iter::once(0).chain((1..=MAX_RATIO_OFFSET).flat_map(|d| [d, -d]))
}

/// A random reference frame whose ratio is closest to `frame`'s.
///
/// The frame itself is never picked unless nothing else is within
/// [`MAX_RATIO_OFFSET`], in which case it is returned unchanged.
pub fn find_matching_frame<R: Rng + ?Sized>(
    frame: &SourceFrame,
    index: &FrameIndex,
    rng: &mut R,
) -> PathBuf {
    for offset in ratio_offsets() {
        let Some(ratio) = frame.ratio().offset(offset) else {
            continue;
        };
        let candidates: Vec<&PathBuf> = index
            .candidates(ratio)
            .iter()
            .filter(|path| **path != frame.path)
            .collect();
        if let Some(chosen) = candidates.choose(rng) {
            return (*chosen).clone();
        }
    }
    frame.path.clone()
}

/// Compile one source set into `buckets/video.mp4`.
///
/// Returns `None` when no bucket was long enough to keep.
pub async fn compile_video<R: Rng + ?Sized>(
    runner: &FfmpegRunner,
    source_dir: &Path,
    index: &FrameIndex,
    fps: u32,
    rng: &mut R,
) -> PipelineResult<Option<PathBuf>> {
    let source_dir = resolve_dir(source_dir)?;
    let set = ImageSet::new(&source_dir);
    let logger = StageLogger::new("compile", source_dir.display());
    logger.log_start(&format!("Compiling {} at {} fps", set.name(), fps));

    let frames = list_adjusted_frames(&set.adjustments_dir())?;
    let buckets = source_frame_buckets(frames, fps);

    let buckets_dir = set.buckets_dir();
    recreate_dir(&buckets_dir)?;

    if buckets.is_empty() {
        logger.log_warning("No run of adjusted frames is long enough, nothing to compile");
        return Ok(None);
    }

    let audio = set.audio_path();
    let mut videos = Vec::with_capacity(buckets.len());

    for (number, bucket) in (1..).zip(&buckets) {
        let (Some(first), Some(last)) = (bucket.first(), bucket.last()) else {
            continue;
        };
        let bucket_dir = set.bucket_dir(number);
        tokio::fs::create_dir_all(&bucket_dir).await?;

        let bucket_audio = bucket_dir.join(AUDIO_FILE);
        cut_audio(
            runner,
            &audio,
            &bucket_audio,
            first.frame_number(),
            last.frame_number(),
            fps,
        )
        .await?;

        for (position, frame) in (1u32..).zip(bucket) {
            let matched = find_matching_frame(frame, index, rng);
            tokio::fs::copy(&matched, bucket_dir.join(frame_file_name(position))).await?;
        }

        let bucket_video = bucket_dir.join(VIDEO_FILE);
        let reporter = logger.ffmpeg_reporter("encode");
        encode_bucket(runner, &bucket_dir, &bucket_audio, &bucket_video, fps, reporter).await?;
        logger.log_progress(&format!(
            "Bucket {}/{} done ({} frames)",
            number,
            buckets.len(),
            bucket.len()
        ));
        videos.push(bucket_video);
    }

    let output = set.compiled_video_path();
    concat_videos(runner, &videos, buckets_dir.join(VIDEO_LIST_FILE), &output).await?;

    logger.log_completion(&format!("Wrote {}", output.display()));
    Ok(Some(output))
}

/// Compile every set in `reference_dir` that has adjusted frames.
///
/// The index is built once and shared. A set that fails is logged and
/// counted; the others are still compiled.
pub async fn compile_videos(
    runner: &FfmpegRunner,
    reference_dir: &Path,
    fps: u32,
    seed: Option<u64>,
) -> PipelineResult<CompileReport> {
    let reference_dir = resolve_dir(reference_dir)?;
    let index = build_frame_index(&reference_dir)?;
    let logger = StageLogger::new("compile", reference_dir.display());
    let mut rng = match_rng(seed);
    let mut report = CompileReport::default();

    for set_dir in list_subdirs_sorted(&reference_dir)? {
        if !ImageSet::new(&set_dir).adjustments_dir().is_dir() {
            continue;
        }
        match compile_video(runner, &set_dir, &index, fps, &mut rng).await {
            Ok(Some(_)) => report.compiled += 1,
            Ok(None) => report.empty += 1,
            Err(e) => {
                logger.log_error(&format!("Failed to compile {}: {}", set_dir.display(), e));
                report.failed += 1;
            }
        }
    }

    logger.log_completion(&format!(
        "{} compiled, {} empty, {} failed",
        report.compiled, report.empty, report.failed
    ));
    Ok(report)
}

/// Compile one source set against the frames in `reference_dir`.
pub async fn compile_single(
    runner: &FfmpegRunner,
    source_dir: &Path,
    reference_dir: &Path,
    fps: u32,
    seed: Option<u64>,
) -> PipelineResult<Option<PathBuf>> {
    PipelineError::require_dir(&ImageSet::new(source_dir).adjustments_dir())?;
    let index = build_frame_index(reference_dir)?;
    let mut rng = match_rng(seed);
    compile_video(runner, source_dir, &index, fps, &mut rng).await
}

/// Compiled videos of every set in `reference_dir`, sorted by set name.
pub fn compiled_videos(reference_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    Ok(list_subdirs_sorted(reference_dir)?
        .into_iter()
        .map(|set_dir| ImageSet::new(set_dir).compiled_video_path())
        .filter(|video| video.is_file())
        .collect())
}

/// Join every compiled video into `reference_dir/video.mp4`.
///
/// Returns `None` when no set has been compiled yet.
pub async fn stitch_all_videos(
    runner: &FfmpegRunner,
    reference_dir: &Path,
) -> PipelineResult<Option<PathBuf>> {
    let reference_dir = resolve_dir(reference_dir)?;
    let logger = StageLogger::new("stitch", reference_dir.display());

    let list_path = reference_dir.join(VIDEO_LIST_FILE);
    let output = reference_dir.join(VIDEO_FILE);
    remove_file_if_exists(&list_path)?;
    remove_file_if_exists(&output)?;

    let videos = compiled_videos(&reference_dir)?;
    if videos.is_empty() {
        logger.log_warning("No compiled videos to stitch");
        return Ok(None);
    }

    logger.log_start(&format!("Stitching {} videos", videos.len()));
    concat_videos(runner, &videos, &list_path, &output).await?;
    logger.log_completion(&format!("Wrote {}", output.display()));
    Ok(Some(output))
}

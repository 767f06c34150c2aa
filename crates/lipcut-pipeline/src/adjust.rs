//! ADJUST stage: align every frame showing one performer.
//!
//! Reads `analysis.txt`, and for each frame where the performer was
//! recognized saves an aligned grayscale face as
//! `adjustments/NNNNN_R.jpg`, `R` being the mouth ratio.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;

use lipcut_media::adjust::{adjust_frame, AdjustOutcome};
use lipcut_media::face::FaceEngine;
use lipcut_media::fs_utils::{list_names_sorted, list_subdirs_sorted};
use lipcut_media::StageProgress;
use lipcut_models::{adjusted_name_for, AdjustedFrameName, AnalysisRecord, FaceBox, ImageSet};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;

/// Outcome counts of adjusting one image set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustReport {
    pub adjusted: usize,
    pub rejected: usize,
    /// Already in `adjustments/`
    pub skipped: usize,
}

impl std::ops::AddAssign for AdjustReport {
    fn add_assign(&mut self, other: Self) {
        self.adjusted += other.adjusted;
        self.rejected += other.rejected;
        self.skipped += other.skipped;
    }
}

/// Face boxes of `name` per image, sorted by image name.
///
/// Only the first record of an image counts. Malformed lines are reported
/// through `on_malformed` and skipped.
pub fn person_faces<F>(contents: &str, name: &str, mut on_malformed: F) -> Vec<(String, FaceBox)>
where
    F: FnMut(usize, &str),
{
    let mut faces: BTreeMap<String, FaceBox> = BTreeMap::new();

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = match AnalysisRecord::parse(line) {
            Ok(record) => record,
            Err(_) => {
                on_malformed(index + 1, line);
                continue;
            }
        };
        if let Some(face) = record.face_of(name) {
            faces.entry(record.image().to_string()).or_insert(face);
        }
    }

    faces.into_iter().collect()
}

/// Source frame names already adjusted in `adjustments_dir`.
pub fn already_adjusted_images(adjustments_dir: &Path) -> PipelineResult<HashSet<String>> {
    if !adjustments_dir.is_dir() {
        return Ok(HashSet::new());
    }
    Ok(list_names_sorted(adjustments_dir)?
        .iter()
        .filter_map(|name| AdjustedFrameName::parse(name).ok())
        .map(|adjusted| adjusted.source_image_name())
        .collect())
}

/// Adjust every frame of `set_dir` where `name` was recognized.
pub fn adjust_images(
    engine: &dyn FaceEngine,
    set_dir: &Path,
    name: &str,
    clear: bool,
    min_face_size: i32,
) -> PipelineResult<AdjustReport> {
    let set = ImageSet::new(set_dir);
    let analysis_path = set.analysis_path();
    if !analysis_path.is_file() {
        return Err(PipelineError::invalid_input(format!(
            "{} has no analysis, run the analyze stage first",
            set_dir.display()
        )));
    }

    let logger = StageLogger::new("adjust", set_dir.display());
    let _span = logger.create_span().entered();
    logger.log_start(&format!("Adjusting frames of {}", name));

    let contents = std::fs::read_to_string(&analysis_path)?;
    let faces = person_faces(&contents, name, |line_number, line| {
        logger.log_warning(&format!(
            "Skipping malformed analysis line {}: {:?}",
            line_number, line
        ))
    });

    let adjustments_dir = set.adjustments_dir();
    if clear && adjustments_dir.exists() {
        std::fs::remove_dir_all(&adjustments_dir)?;
    }
    let done = already_adjusted_images(&adjustments_dir)?;
    std::fs::create_dir_all(&adjustments_dir)?;

    let already_done = faces.iter().filter(|(image, _)| done.contains(image)).count();
    let mut progress = StageProgress::new(faces.len(), already_done);
    let mut report = AdjustReport {
        skipped: already_done,
        ..Default::default()
    };
    let frames_dir = set.frames_dir();

    for (image_name, face) in &faces {
        if done.contains(image_name) {
            continue;
        }

        let started = Instant::now();
        let frame = image::open(frames_dir.join(image_name))?.to_rgb8();

        match adjust_frame(engine, &frame, face, min_face_size)? {
            AdjustOutcome::Adjusted(adjusted) => {
                let Some(file_name) = adjusted_name_for(image_name, adjusted.ratio) else {
                    logger.log_warning(&format!("{} is not a numbered frame", image_name));
                    report.rejected += 1;
                    continue;
                };
                adjusted
                    .image
                    .save(adjustments_dir.join(file_name.to_string()))?;
                report.adjusted += 1;
            }
            AdjustOutcome::Rejected(reason) => {
                tracing::debug!(image = %image_name, reason = %reason, "Frame rejected");
                report.rejected += 1;
            }
        }

        let elapsed = started.elapsed();
        logger.log_item(image_name, elapsed, &progress.record(elapsed));
    }

    logger.log_completion(&format!(
        "{} adjusted, {} rejected, {} skipped",
        report.adjusted, report.rejected, report.skipped
    ));
    Ok(report)
}

/// Adjust every sub-directory of `sets_dir`.
pub fn adjust_sets_of_images(
    engine: &dyn FaceEngine,
    sets_dir: &Path,
    name: &str,
    clear: bool,
    min_face_size: i32,
) -> PipelineResult<AdjustReport> {
    PipelineError::require_dir(sets_dir)?;
    let mut total = AdjustReport::default();
    for set_dir in list_subdirs_sorted(sets_dir)? {
        total += adjust_images(engine, &set_dir, name, clear, min_face_size)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use lipcut_media::face::FaceEncoding;
    use lipcut_media::{FaceLandmarks, MediaResult};
    use tempfile::TempDir;

    /// Sees one face filling the image, with a level face and a mouth
    /// opened half its width centered on the image.
    struct CenteredFaceEngine {
        with_landmarks: bool,
    }

    fn centered_landmarks(cx: f64, cy: f64) -> FaceLandmarks {
        let (width, opening) = (60.0, 30.0);
        let half = width / 2.0;
        let mut points = vec![(cx, cy - 80.0); 68];

        for (i, idx) in (48..=54).enumerate() {
            points[idx] = (cx - half + width * i as f64 / 6.0, cy - opening / 2.0 - 2.0);
        }
        points[48] = (cx - half, cy);
        points[54] = (cx + half, cy);
        for (i, idx) in (55..=59).enumerate() {
            points[idx] = (cx + half - width * (i + 1) as f64 / 6.0, cy + opening / 2.0 + 2.0);
        }
        points[60] = (cx - half + 4.0, cy);
        points[64] = (cx + half - 4.0, cy);
        for (i, idx) in (61..=63).enumerate() {
            points[idx] = (cx - 6.0 + 6.0 * i as f64, cy - opening / 2.0);
        }
        for (i, idx) in (65..=67).enumerate() {
            points[idx] = (cx + 6.0 - 6.0 * i as f64, cy + opening / 2.0);
        }
        for (i, idx) in (17..=26).enumerate() {
            points[idx] = (cx - 50.0 + 10.0 * i as f64, cy - 80.0);
        }

        FaceLandmarks::new(points).unwrap()
    }

    impl FaceEngine for CenteredFaceEngine {
        fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceBox>> {
            let (w, h) = (image.width() as i32, image.height() as i32);
            Ok(vec![FaceBox::new(0, 0, h, w)])
        }

        fn encode(&self, _image: &RgbImage, _face: &FaceBox) -> MediaResult<FaceEncoding> {
            Ok(FaceEncoding::new(vec![0.0]))
        }

        fn landmarks(&self, image: &RgbImage, _face: &FaceBox) -> MediaResult<Option<FaceLandmarks>> {
            if !self.with_landmarks {
                return Ok(None);
            }
            let (cx, cy) = (f64::from(image.width()) / 2.0, f64::from(image.height()) / 2.0);
            Ok(Some(centered_landmarks(cx, cy)))
        }
    }

    fn make_set(root: &Path, analysis: &str, frames: &[&str]) -> std::path::PathBuf {
        let set_dir = root.join("abc");
        std::fs::create_dir_all(set_dir.join("frames")).unwrap();
        for frame in frames {
            RgbImage::from_pixel(240, 240, Rgb([90, 90, 90]))
                .save(set_dir.join("frames").join(frame))
                .unwrap();
        }
        std::fs::write(set_dir.join("analysis.txt"), analysis).unwrap();
        set_dir
    }

    #[test]
    fn test_person_faces_keeps_first_record_per_image() {
        let contents = "\
00002.jpg ana 0 0 200 200
00001.jpg none
00001.jpg ana 10 10 210 210
00002.jpg ana 5 5 205 205
garbage
00003.jpg ben 0 0 200 200
";
        let mut malformed = Vec::new();
        let faces = person_faces(contents, "ana", |n, _| malformed.push(n));

        assert_eq!(
            faces,
            vec![
                ("00001.jpg".to_string(), FaceBox::new(10, 10, 210, 210)),
                ("00002.jpg".to_string(), FaceBox::new(0, 0, 200, 200)),
            ]
        );
        assert_eq!(malformed, vec![5]);
    }

    #[test]
    fn test_already_adjusted_images() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("00004_37.jpg"), b"").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"").unwrap();

        let done = already_adjusted_images(temp.path()).unwrap();
        assert_eq!(done, HashSet::from(["00004.jpg".to_string()]));
        assert!(already_adjusted_images(&temp.path().join("missing"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_adjust_images_saves_and_resumes() {
        let temp = TempDir::new().unwrap();
        let set_dir = make_set(
            temp.path(),
            "00001.jpg ana 20 20 220 220\n00002.jpg ana 20 20 220 220\n00003.jpg ana 0 0 100 100\n",
            &["00001.jpg", "00002.jpg", "00003.jpg"],
        );
        let engine = CenteredFaceEngine { with_landmarks: true };

        let report = adjust_images(&engine, &set_dir, "ana", false, 150).unwrap();
        assert_eq!(
            report,
            AdjustReport {
                adjusted: 2,
                rejected: 1,
                skipped: 0
            }
        );
        let saved = image::open(set_dir.join("adjustments/00001_50.jpg")).unwrap();
        assert_eq!((saved.width(), saved.height()), (300, 300));
        assert!(set_dir.join("adjustments/00002_50.jpg").exists());

        let report = adjust_images(&engine, &set_dir, "ana", false, 150).unwrap();
        assert_eq!(report.adjusted, 0);
        assert_eq!(report.skipped, 2);

        let report = adjust_images(&engine, &set_dir, "ana", true, 150).unwrap();
        assert_eq!(report.adjusted, 2);
    }

    #[test]
    fn test_frames_without_landmarks_are_rejected() {
        let temp = TempDir::new().unwrap();
        let set_dir = make_set(temp.path(), "00001.jpg ana 20 20 220 220\n", &["00001.jpg"]);
        let engine = CenteredFaceEngine {
            with_landmarks: false,
        };

        let report = adjust_images(&engine, &set_dir, "ana", false, 150).unwrap();
        assert_eq!(report.rejected, 1);
        assert!(set_dir.join("adjustments").is_dir());
    }

    #[test]
    fn test_missing_analysis_is_an_error() {
        let temp = TempDir::new().unwrap();
        let engine = CenteredFaceEngine { with_landmarks: true };
        let result = adjust_images(&engine, temp.path(), "ana", false, 150);
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_adjust_sets_of_images() {
        let temp = TempDir::new().unwrap();
        make_set(temp.path(), "00001.jpg ben 20 20 220 220\n", &["00001.jpg"]);
        let engine = CenteredFaceEngine { with_landmarks: true };

        let total = adjust_sets_of_images(&engine, temp.path(), "ana", false, 150).unwrap();
        assert_eq!(total, AdjustReport::default());
    }
}

//! ANALYZE stage: find and recognize faces in every extracted frame.
//!
//! Results go to `analysis.txt` in the image set, one line per face. Lines
//! are written as soon as a frame is done so an interrupted run resumes where
//! it stopped.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use lipcut_media::face::{FaceClassifier, FaceEngine, LabeledEncoding};
use lipcut_media::fs_utils::{file_name_str, list_files_sorted, list_subdirs_sorted};
use lipcut_media::StageProgress;
use lipcut_models::layout::MODEL_FILE;
use lipcut_models::{analyzed_image_names, is_frame_image, AnalysisRecord, ImageSet};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;

/// Extensions accepted for example images.
const EXAMPLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Outcome counts of analyzing one image set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzeReport {
    pub analyzed: usize,
    /// Already in `analysis.txt`
    pub skipped: usize,
    /// Face lines written
    pub faces: usize,
}

impl std::ops::AddAssign for AnalyzeReport {
    fn add_assign(&mut self, other: Self) {
        self.analyzed += other.analyzed;
        self.skipped += other.skipped;
        self.faces += other.faces;
    }
}

/// A loaded classifier together with its match threshold.
pub struct Recognizer<'a> {
    pub engine: &'a dyn FaceEngine,
    pub classifier: &'a FaceClassifier,
    pub match_threshold: f32,
}

/// Where the model trained from `examples_dir` is saved.
pub fn model_path_for_examples(examples_dir: &Path) -> PathBuf {
    examples_dir.join(MODEL_FILE)
}

fn is_example_image(file_name: &str) -> bool {
    file_name.rsplit_once('.').is_some_and(|(_, ext)| {
        EXAMPLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    })
}

/// Person names end up as whitespace-separated fields of `analysis.txt`.
fn is_valid_person_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(char::is_whitespace)
}

/// Train a classifier from `examples_dir/<person>/*.{png,jpg,jpeg}` and save it.
///
/// Only images with exactly one detected face are used. Folders whose name
/// contains whitespace are skipped with a warning.
pub fn train_model(
    engine: &dyn FaceEngine,
    examples_dir: &Path,
    save_path: &Path,
) -> PipelineResult<FaceClassifier> {
    PipelineError::require_dir(examples_dir)?;
    let logger = StageLogger::new("train", examples_dir.display());
    logger.log_start("Training face classifier");

    let mut samples = Vec::new();
    for person_dir in list_subdirs_sorted(examples_dir)? {
        let Some(name) = file_name_str(&person_dir).map(str::to_string) else {
            continue;
        };
        if !is_valid_person_name(&name) {
            logger.log_warning(&format!(
                "Skipping example folder {:?}: person names cannot contain whitespace",
                name
            ));
            continue;
        }

        for image_path in list_files_sorted(&person_dir, is_example_image)? {
            let image = image::open(&image_path)?.to_rgb8();
            let faces = engine.detect(&image)?;

            match faces.as_slice() {
                [face] => samples.push(LabeledEncoding {
                    name: name.clone(),
                    encoding: engine.encode(&image, face)?,
                }),
                _ => logger.log_warning(&format!(
                    "Image {} not suitable for training: {} faces found",
                    image_path.display(),
                    faces.len()
                )),
            }
        }
    }

    if samples.is_empty() {
        return Err(PipelineError::training_failed(format!(
            "no usable example faces in {}",
            examples_dir.display()
        )));
    }

    let classifier = FaceClassifier::train(samples, None)?;
    classifier.save(save_path)?;
    logger.log_completion(&format!(
        "{} samples, k = {}, saved to {}",
        classifier.sample_count(),
        classifier.k(),
        save_path.display()
    ));
    Ok(classifier)
}

/// Records for every face in one frame, or a single `none` record.
pub fn analyze_frame(
    recognizer: &Recognizer<'_>,
    image_name: &str,
    image: &image::RgbImage,
) -> PipelineResult<Vec<AnalysisRecord>> {
    let faces = recognizer.engine.detect(image)?;
    if faces.is_empty() {
        return Ok(vec![AnalysisRecord::NoFace {
            image: image_name.to_string(),
        }]);
    }

    faces
        .iter()
        .map(|face| {
            let encoding = recognizer.engine.encode(image, face)?;
            Ok(AnalysisRecord::Face {
                image: image_name.to_string(),
                name: recognizer
                    .classifier
                    .predict(&encoding, recognizer.match_threshold),
                face: *face,
            })
        })
        .collect()
}

/// Analyze `set_dir/frames/*.jpg` into `set_dir/analysis.txt`.
///
/// Without `clear`, frames already named in the file are skipped and new
/// lines are appended. With `clear` the file starts over.
pub fn analyze_images(
    recognizer: &Recognizer<'_>,
    set_dir: &Path,
    clear: bool,
) -> PipelineResult<AnalyzeReport> {
    let set = ImageSet::new(set_dir);
    let frames_dir = set.frames_dir();
    PipelineError::require_dir(&frames_dir)?;

    let logger = StageLogger::new("analyze", set_dir.display());
    let _span = logger.create_span().entered();
    logger.log_start(&format!("Analyzing {}", frames_dir.display()));

    let analysis_path = set.analysis_path();
    let done: HashSet<String> = if clear || !analysis_path.exists() {
        HashSet::new()
    } else {
        analyzed_image_names(&std::fs::read_to_string(&analysis_path)?)
            .into_iter()
            .collect()
    };

    let mut output = if clear {
        File::create(&analysis_path)?
    } else {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&analysis_path)?
    };

    let frames = list_files_sorted(&frames_dir, is_frame_image)?;
    let already_done = frames
        .iter()
        .filter(|p| file_name_str(p).is_some_and(|n| done.contains(n)))
        .count();
    let mut progress = StageProgress::new(frames.len(), already_done);
    let mut report = AnalyzeReport {
        skipped: already_done,
        ..Default::default()
    };

    for frame in &frames {
        let Some(name) = file_name_str(frame) else {
            continue;
        };
        if done.contains(name) {
            continue;
        }

        let started = Instant::now();
        let image = image::open(frame)?.to_rgb8();
        let records = analyze_frame(recognizer, name, &image)?;

        let mut lines = String::new();
        for record in &records {
            lines.push_str(&record.to_string());
            lines.push('\n');
            if matches!(record, AnalysisRecord::Face { .. }) {
                report.faces += 1;
            }
        }
        output.write_all(lines.as_bytes())?;
        output.flush()?;
        report.analyzed += 1;

        let elapsed = started.elapsed();
        logger.log_item(name, elapsed, &progress.record(elapsed));
    }

    logger.log_completion(&format!(
        "{} analyzed, {} skipped, {} faces",
        report.analyzed, report.skipped, report.faces
    ));
    Ok(report)
}

/// Analyze every sub-directory of `sets_dir`.
pub fn analyze_sets_of_images(
    recognizer: &Recognizer<'_>,
    sets_dir: &Path,
    clear: bool,
) -> PipelineResult<AnalyzeReport> {
    PipelineError::require_dir(sets_dir)?;
    let mut total = AnalyzeReport::default();
    for set_dir in list_subdirs_sorted(sets_dir)? {
        total += analyze_images(recognizer, &set_dir, clear)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use lipcut_media::face::FaceEncoding;
    use lipcut_models::FaceBox;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Finds one face in bright images and none in dark ones.
    struct BrightnessEngine {
        encodes: Mutex<usize>,
    }

    impl BrightnessEngine {
        fn new() -> Self {
            Self {
                encodes: Mutex::new(0),
            }
        }
    }

    impl FaceEngine for BrightnessEngine {
        fn detect(&self, image: &RgbImage) -> lipcut_media::MediaResult<Vec<FaceBox>> {
            if image.get_pixel(0, 0)[0] > 128 {
                Ok(vec![FaceBox::new(1, 2, 3, 4)])
            } else {
                Ok(Vec::new())
            }
        }

        fn encode(&self, image: &RgbImage, _face: &FaceBox) -> lipcut_media::MediaResult<FaceEncoding> {
            *self.encodes.lock().unwrap() += 1;
            let v = f32::from(image.get_pixel(0, 0)[1]) / 255.0;
            Ok(FaceEncoding::new(vec![v, 0.0]))
        }

        fn landmarks(
            &self,
            _image: &RgbImage,
            _face: &FaceBox,
        ) -> lipcut_media::MediaResult<Option<lipcut_media::FaceLandmarks>> {
            Ok(None)
        }
    }

    fn write_image(path: &Path, red: u8, green: u8) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([red, green, 0])).save(path).unwrap();
    }

    fn classifier() -> FaceClassifier {
        FaceClassifier::train(
            vec![
                LabeledEncoding {
                    name: "ana".into(),
                    encoding: FaceEncoding::new(vec![0.0, 0.0]),
                },
                LabeledEncoding {
                    name: "ben".into(),
                    encoding: FaceEncoding::new(vec![1.0, 0.0]),
                },
            ],
            Some(1),
        )
        .unwrap()
    }

    #[test]
    fn test_train_model() {
        let temp = TempDir::new().unwrap();
        let examples = temp.path().join("examples");
        write_image(&examples.join("ana/1.jpg"), 255, 0);
        write_image(&examples.join("ana/2.PNG"), 255, 10);
        write_image(&examples.join("ana/dark.jpg"), 0, 0);
        write_image(&examples.join("ben/1.jpeg"), 255, 255);
        std::fs::write(examples.join("ben/readme.txt"), "x").unwrap();

        let engine = BrightnessEngine::new();
        let save_path = model_path_for_examples(&examples);
        let model = train_model(&engine, &examples, &save_path).unwrap();

        assert_eq!(model.sample_count(), 3);
        assert_eq!(model.k(), 2);
        assert!(save_path.exists());
        assert_eq!(FaceClassifier::load(&save_path).unwrap(), model);
    }

    #[test]
    fn test_train_skips_names_with_whitespace() {
        let temp = TempDir::new().unwrap();
        let examples = temp.path().join("examples");
        write_image(&examples.join("ana/1.jpg"), 255, 0);
        write_image(&examples.join("mary jane/1.jpg"), 255, 200);
        write_image(&examples.join("tab\tname/1.jpg"), 255, 100);

        let engine = BrightnessEngine::new();
        let model = train_model(&engine, &examples, &examples.join(MODEL_FILE)).unwrap();

        assert_eq!(model.sample_count(), 1);
    }

    #[test]
    fn test_person_name_validation() {
        assert!(is_valid_person_name("ana"));
        assert!(is_valid_person_name("mary_jane"));
        assert!(!is_valid_person_name("mary jane"));
        assert!(!is_valid_person_name(""));
    }

    #[test]
    fn test_train_without_faces_fails() {
        let temp = TempDir::new().unwrap();
        let examples = temp.path().join("examples");
        write_image(&examples.join("ana/dark.jpg"), 0, 0);

        let engine = BrightnessEngine::new();
        let result = train_model(&engine, &examples, &examples.join(MODEL_FILE));
        assert!(matches!(result, Err(PipelineError::TrainingFailed(_))));
    }

    #[test]
    fn test_analyze_images_writes_and_resumes() {
        let temp = TempDir::new().unwrap();
        let set_dir = temp.path().join("abc");
        write_image(&set_dir.join("frames/00001.jpg"), 255, 0);
        write_image(&set_dir.join("frames/00002.jpg"), 0, 0);
        write_image(&set_dir.join("frames/00003.jpg"), 255, 255);

        let engine = BrightnessEngine::new();
        let classifier = classifier();
        let recognizer = Recognizer {
            engine: &engine,
            classifier: &classifier,
            match_threshold: 0.5,
        };

        let report = analyze_images(&recognizer, &set_dir, false).unwrap();
        assert_eq!(
            report,
            AnalyzeReport {
                analyzed: 3,
                skipped: 0,
                faces: 2
            }
        );
        let contents = std::fs::read_to_string(set_dir.join("analysis.txt")).unwrap();
        assert_eq!(
            contents,
            "00001.jpg ana 1 2 3 4\n00002.jpg none\n00003.jpg ben 1 2 3 4\n"
        );

        // Resume: a new frame is appended, old ones are not re-analyzed
        write_image(&set_dir.join("frames/00004.jpg"), 0, 0);
        let report = analyze_images(&recognizer, &set_dir, false).unwrap();
        assert_eq!(report.analyzed, 1);
        assert_eq!(report.skipped, 3);
        assert_eq!(*engine.encodes.lock().unwrap(), 2);
        let contents = std::fs::read_to_string(set_dir.join("analysis.txt")).unwrap();
        assert!(contents.ends_with("00003.jpg ben 1 2 3 4\n00004.jpg none\n"));

        // Clear starts over
        let report = analyze_images(&recognizer, &set_dir, true).unwrap();
        assert_eq!(report.analyzed, 4);
        let contents = std::fs::read_to_string(set_dir.join("analysis.txt")).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn test_unknown_faces() {
        let engine = BrightnessEngine::new();
        let classifier = classifier();
        let recognizer = Recognizer {
            engine: &engine,
            classifier: &classifier,
            match_threshold: 0.1,
        };
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 128, 0]));
        let records = analyze_frame(&recognizer, "00001.jpg", &image).unwrap();
        assert_eq!(records[0].to_string(), "00001.jpg unknown 1 2 3 4");
    }

    #[test]
    fn test_analyze_sets_of_images() {
        let temp = TempDir::new().unwrap();
        write_image(&temp.path().join("a/frames/00001.jpg"), 255, 0);
        write_image(&temp.path().join("b/frames/00001.jpg"), 0, 0);

        let engine = BrightnessEngine::new();
        let classifier = classifier();
        let recognizer = Recognizer {
            engine: &engine,
            classifier: &classifier,
            match_threshold: 0.5,
        };
        let total = analyze_sets_of_images(&recognizer, temp.path(), false).unwrap();
        assert_eq!(total.analyzed, 2);
        assert_eq!(total.faces, 1);
    }
}

//! ONNX Runtime face engine.
//!
//! Three models are used:
//! - detector: UltraFace RFB-320 (`1x3x240x320`), outputs `scores` `[1,N,2]`
//!   and `boxes` `[1,N,4]` as normalized corners
//! - encoder: ArcFace (`1x3x112x112`), 512-d embedding
//! - landmarks: PFLD 68-point (`1x3x112x112`), 136 coordinates normalized to
//!   the input crop

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use lipcut_models::FaceBox;

use super::{FaceEncoding, FaceEngine, FaceLandmarks};
use crate::error::{MediaError, MediaResult};

pub const DETECTOR_FILE: &str = "detector.onnx";
pub const ENCODER_FILE: &str = "encoder.onnx";
pub const LANDMARKS_FILE: &str = "landmarks.onnx";

const DETECTOR_INPUT: (u32, u32) = (320, 240);
const CROP_INPUT: u32 = 112;
const NMS_IOU_THRESHOLD: f64 = 0.3;

/// Default minimum detector confidence.
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.7;

/// Locations of the three model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrtModelPaths {
    pub detector: PathBuf,
    pub encoder: PathBuf,
    pub landmarks: PathBuf,
}

impl OrtModelPaths {
    /// Standard file names inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detector: dir.join(DETECTOR_FILE),
            encoder: dir.join(ENCODER_FILE),
            landmarks: dir.join(LANDMARKS_FILE),
        }
    }
}

/// Pixel normalization applied before inference: `(v - mean) / scale`.
#[derive(Debug, Clone, Copy)]
struct Normalization {
    mean: f32,
    scale: f32,
}

const DETECTOR_NORM: Normalization = Normalization { mean: 127.0, scale: 128.0 };
const ENCODER_NORM: Normalization = Normalization { mean: 127.5, scale: 127.5 };
const LANDMARKS_NORM: Normalization = Normalization { mean: 0.0, scale: 255.0 };

/// A loaded model plus its output names.
struct OnnxModel {
    session: Mutex<Session>,
    output_names: Vec<String>,
}

/// Flattened output tensor.
struct OutputTensor {
    shape: Vec<i64>,
    data: Vec<f32>,
}

impl OnnxModel {
    fn load(model_path: &Path) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::model_not_found(model_path.display().to_string()));
        }

        let model_bytes = std::fs::read(model_path)?;

        let session = Session::builder()
            .map_err(|e| MediaError::detection_failed(format!("ORT session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MediaError::detection_failed(format!("ORT opt level: {e}")))?
            .commit_from_memory(model_bytes.as_slice())
            .map_err(|e| MediaError::detection_failed(format!("ORT load model: {e}")))?;

        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        debug!(model = %model_path.display(), "Loaded ONNX model");

        Ok(Self {
            session: Mutex::new(session),
            output_names,
        })
    }

    fn run(&self, input: Value) -> MediaResult<Vec<(String, OutputTensor)>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::detection_failed("ORT session poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ORT run failed: {e}")))?;

        let mut tensors = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = outputs
                .get(name.as_str())
                .ok_or_else(|| MediaError::detection_failed(format!("ORT output {name} missing")))?;
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| MediaError::detection_failed(format!("ORT extract: {e}")))?;
            tensors.push((
                name.clone(),
                OutputTensor {
                    shape: shape.iter().copied().collect(),
                    data: data.to_vec(),
                },
            ));
        }
        Ok(tensors)
    }

    /// First output, for single-output models.
    fn run_single(&self, input: Value) -> MediaResult<OutputTensor> {
        self.run(input)?
            .into_iter()
            .next()
            .map(|(_, tensor)| tensor)
            .ok_or_else(|| MediaError::detection_failed("ORT returned no outputs"))
    }
}

/// Face engine backed by ONNX Runtime.
pub struct OrtFaceEngine {
    detector: OnnxModel,
    encoder: OnnxModel,
    landmarks: OnnxModel,
    detection_threshold: f32,
}

impl OrtFaceEngine {
    /// Load all three models. Missing files are a `ModelNotFound` error.
    pub fn load(paths: &OrtModelPaths, detection_threshold: f32) -> MediaResult<Self> {
        let engine = Self {
            detector: OnnxModel::load(&paths.detector)?,
            encoder: OnnxModel::load(&paths.encoder)?,
            landmarks: OnnxModel::load(&paths.landmarks)?,
            detection_threshold,
        };
        info!(
            detector = %paths.detector.display(),
            encoder = %paths.encoder.display(),
            landmarks = %paths.landmarks.display(),
            "Face engine ready"
        );
        Ok(engine)
    }
}

impl FaceEngine for OrtFaceEngine {
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceBox>> {
        let (width, height) = DETECTOR_INPUT;
        let resized = imageops::resize(image, width, height, FilterType::Triangle);
        let outputs = self.detector.run(to_chw_tensor(&resized, DETECTOR_NORM)?)?;

        let find = |wanted: &str| {
            outputs
                .iter()
                .find(|(name, _)| name == wanted)
                .map(|(_, tensor)| tensor)
                .ok_or_else(|| MediaError::detection_failed(format!("detector output {wanted} missing")))
        };
        let scores = find("scores")?;
        let boxes = find("boxes")?;

        let candidates = decode_detections(
            &scores.data,
            &boxes.data,
            self.detection_threshold,
            image.width() as f32,
            image.height() as f32,
        );
        Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
    }

    fn encode(&self, image: &RgbImage, face: &FaceBox) -> MediaResult<FaceEncoding> {
        let (crop, _) = square_crop(image, face)?;
        let input = imageops::resize(&crop, CROP_INPUT, CROP_INPUT, FilterType::Triangle);
        let output = self.encoder.run_single(to_chw_tensor(&input, ENCODER_NORM)?)?;

        if output.data.is_empty() {
            return Err(MediaError::detection_failed(format!(
                "Empty encoder output, shape {:?}",
                output.shape
            )));
        }
        Ok(FaceEncoding::new(output.data).normalized())
    }

    fn landmarks(&self, image: &RgbImage, face: &FaceBox) -> MediaResult<Option<FaceLandmarks>> {
        let (crop, region) = square_crop(image, face)?;
        let input = imageops::resize(&crop, CROP_INPUT, CROP_INPUT, FilterType::Triangle);
        let output = self.landmarks.run_single(to_chw_tensor(&input, LANDMARKS_NORM)?)?;

        Ok(map_landmarks(&output.data, &region))
    }
}

/// Crop region in image pixels. May extend past the image edges.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropRegion {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

/// Square crop around `face`. Parts outside the image are black.
fn square_crop(image: &RgbImage, face: &FaceBox) -> MediaResult<(RgbImage, CropRegion)> {
    let square = face.to_square();
    let overlaps = square.left < image.width() as i32
        && square.top < image.height() as i32
        && square.right > 0
        && square.bottom > 0;

    if !overlaps || square.width() <= 0 || square.height() <= 0 {
        return Err(MediaError::detection_failed(format!(
            "Face box {:?} lies outside the image",
            face
        )));
    }

    let region = CropRegion {
        x: square.left,
        y: square.top,
        width: square.width() as u32,
        height: square.height() as u32,
    };
    let mut crop = RgbImage::new(region.width, region.height);
    imageops::replace(&mut crop, image, -i64::from(region.x), -i64::from(region.y));
    Ok((crop, region))
}

/// Convert an RGB image to a normalized `1x3xHxW` tensor.
fn to_chw_tensor(image: &RgbImage, norm: Normalization) -> MediaResult<Value> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let array = Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        let v = f32::from(image.get_pixel(x as u32, y as u32)[c]);
        (v - norm.mean) / norm.scale
    });

    let shape = vec![1usize, 3, h, w];
    let boxed = array.into_raw_vec().into_boxed_slice();
    Tensor::from_array((shape, boxed))
        .map(Value::from)
        .map_err(|e| MediaError::detection_failed(format!("ORT tensor: {e}")))
}

/// Scored face candidate before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    face: FaceBox,
    score: f32,
}

/// Turn raw detector outputs into image-space candidates above `threshold`.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    threshold: f32,
    image_width: f32,
    image_height: f32,
) -> Vec<Candidate> {
    scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(score, _)| score[1] >= threshold)
        .map(|(score, corners)| Candidate {
            face: FaceBox::from_corners(
                corners[0].clamp(0.0, 1.0) * image_width,
                corners[1].clamp(0.0, 1.0) * image_height,
                corners[2].clamp(0.0, 1.0) * image_width,
                corners[3].clamp(0.0, 1.0) * image_height,
            ),
            score: score[1],
        })
        .filter(|c| c.face.width() > 0 && c.face.height() > 0)
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f64) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate.face) < iou_threshold) {
            kept.push(candidate.face);
        }
    }
    kept
}

/// Map normalized landmark output back to image pixels.
fn map_landmarks(data: &[f32], region: &CropRegion) -> Option<FaceLandmarks> {
    let points = data
        .chunks_exact(2)
        .map(|p| {
            (
                f64::from(region.x) + f64::from(p[0]) * f64::from(region.width),
                f64::from(region.y) + f64::from(p[1]) * f64::from(region.height),
            )
        })
        .collect();
    FaceLandmarks::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_model_paths_from_dir() {
        let paths = OrtModelPaths::from_dir("/models");
        assert_eq!(paths.detector, PathBuf::from("/models/detector.onnx"));
        assert_eq!(paths.encoder, PathBuf::from("/models/encoder.onnx"));
        assert_eq!(paths.landmarks, PathBuf::from("/models/landmarks.onnx"));
    }

    #[test]
    fn test_missing_model_is_reported() {
        let paths = OrtModelPaths::from_dir("/definitely/not/here");
        assert!(matches!(
            OrtFaceEngine::load(&paths, DEFAULT_DETECTION_THRESHOLD),
            Err(MediaError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_decode_detections() {
        let scores = [0.9, 0.1, 0.2, 0.8, 0.6, 0.4];
        let boxes = [
            0.0, 0.0, 0.5, 0.5, // below threshold
            0.25, 0.25, 0.75, 0.75, // kept
            0.1, 0.1, 0.2, 0.2, // below threshold
        ];
        let candidates = decode_detections(&scores, &boxes, 0.7, 400.0, 200.0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].face, FaceBox::new(100, 50, 150, 300));
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let candidates = vec![
            Candidate { face: FaceBox::new(0, 0, 100, 100), score: 0.8 },
            Candidate { face: FaceBox::new(5, 5, 105, 105), score: 0.95 },
            Candidate { face: FaceBox::new(300, 300, 400, 400), score: 0.9 },
        ];
        let kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD);
        assert_eq!(kept, vec![FaceBox::new(5, 5, 105, 105), FaceBox::new(300, 300, 400, 400)]);
    }

    #[test]
    fn test_square_crop_pads_with_black() {
        let image = RgbImage::from_pixel(100, 80, Rgb([10, 20, 30]));
        let (crop, region) = square_crop(&image, &FaceBox::new(60, 20, 100, 120)).unwrap();
        // Squared to 50..130 horizontally; the part past x = 100 is black
        assert_eq!(region, CropRegion { x: 50, y: 20, width: 80, height: 80 });
        assert_eq!(crop.dimensions(), (80, 80));
        assert_eq!(*crop.get_pixel(0, 0), Rgb([10, 20, 30]));
        assert_eq!(*crop.get_pixel(70, 10), Rgb([0, 0, 0]));
        assert_eq!(*crop.get_pixel(10, 70), Rgb([0, 0, 0]));

        assert!(square_crop(&image, &FaceBox::new(200, 200, 300, 300)).is_err());
    }

    #[test]
    fn test_chw_tensor_normalization() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 127]));
        let value = to_chw_tensor(&image, ENCODER_NORM).unwrap();
        let (shape, data) = value.try_extract_tensor::<f32>().unwrap();
        assert_eq!(shape.iter().copied().collect::<Vec<i64>>(), vec![1, 3, 2, 2]);
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert!((data[4] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_map_landmarks() {
        let region = CropRegion { x: 10, y: 20, width: 100, height: 100 };
        let data: Vec<f32> = (0..68).flat_map(|_| [0.5, 0.25]).collect();
        let landmarks = map_landmarks(&data, &region).unwrap();
        assert_eq!(landmarks.points()[0], (60.0, 45.0));
        assert!(map_landmarks(&data[..10], &region).is_none());
    }
}

//! Face detection, recognition and landmarks.
//!
//! Stages talk to a [`FaceEngine`] so the ONNX-backed implementation can be
//! swapped for a scripted one in tests.

pub mod classifier;
pub mod landmarks;
pub mod ort_engine;

pub use classifier::{FaceClassifier, LabeledEncoding};
pub use landmarks::{FaceLandmarks, PointBounds};
pub use ort_engine::{OrtFaceEngine, OrtModelPaths};

use image::RgbImage;
use lipcut_models::FaceBox;
use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// Face embedding produced by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEncoding(Vec<f32>);

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Scale to unit length. A zero vector is left unchanged.
    pub fn normalized(mut self) -> Self {
        let norm = self.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            self.0.iter_mut().for_each(|v| *v /= norm);
        }
        self
    }

    /// Euclidean distance. Encodings of different length are infinitely far apart.
    pub fn distance(&self, other: &FaceEncoding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Face detection, encoding and landmark extraction over RGB images.
pub trait FaceEngine: Send + Sync {
    /// Boxes of every face found in the image.
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<FaceBox>>;

    /// Embedding of the face inside `face`.
    fn encode(&self, image: &RgbImage, face: &FaceBox) -> MediaResult<FaceEncoding>;

    /// Landmarks of the face inside `face`, in image coordinates.
    fn landmarks(&self, image: &RgbImage, face: &FaceBox) -> MediaResult<Option<FaceLandmarks>>;

    /// Landmarks of the largest face in the image, if any face is found.
    fn find_landmarks(&self, image: &RgbImage) -> MediaResult<Option<FaceLandmarks>> {
        let faces = self.detect(image)?;
        match faces.iter().max_by_key(|face| face.area()) {
            Some(face) => self.landmarks(image, face),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine for stage tests.

    use super::*;
    use std::sync::Mutex;

    /// Returns fixed faces, encodings and landmarks, and counts calls.
    #[derive(Default)]
    pub(crate) struct ScriptedEngine {
        pub faces: Vec<FaceBox>,
        pub encoding: Option<FaceEncoding>,
        pub landmarks: Option<FaceLandmarks>,
        pub detect_calls: Mutex<usize>,
    }

    impl FaceEngine for ScriptedEngine {
        fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<FaceBox>> {
            if let Ok(mut calls) = self.detect_calls.lock() {
                *calls += 1;
            }
            Ok(self.faces.clone())
        }

        fn encode(&self, _image: &RgbImage, _face: &FaceBox) -> MediaResult<FaceEncoding> {
            Ok(self
                .encoding
                .clone()
                .unwrap_or_else(|| FaceEncoding::new(vec![0.0; 4])))
        }

        fn landmarks(&self, _image: &RgbImage, _face: &FaceBox) -> MediaResult<Option<FaceLandmarks>> {
            Ok(self.landmarks.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedEngine;
    use super::*;

    #[test]
    fn test_encoding_distance() {
        let a = FaceEncoding::new(vec![0.0, 3.0]);
        let b = FaceEncoding::new(vec![4.0, 0.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert!(a.distance(&FaceEncoding::new(vec![1.0])).is_infinite());
    }

    #[test]
    fn test_normalized() {
        let n = FaceEncoding::new(vec![3.0, 4.0]).normalized();
        assert!((n.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((n.as_slice()[1] - 0.8).abs() < 1e-6);

        let zero = FaceEncoding::new(vec![0.0, 0.0]).normalized();
        assert_eq!(zero.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_find_landmarks_without_faces() {
        let engine = ScriptedEngine {
            landmarks: Some(landmarks::tests::synthetic_face(50.0, 50.0, 20.0, 4.0)),
            ..Default::default()
        };
        let image = RgbImage::new(10, 10);
        assert!(engine.find_landmarks(&image).unwrap().is_none());
    }

    #[test]
    fn test_find_landmarks_with_face() {
        let engine = ScriptedEngine {
            faces: vec![FaceBox::new(0, 0, 10, 10)],
            landmarks: Some(landmarks::tests::synthetic_face(50.0, 50.0, 20.0, 4.0)),
            ..Default::default()
        };
        let image = RgbImage::new(10, 10);
        assert!(engine.find_landmarks(&image).unwrap().is_some());
    }

    #[test]
    fn test_encoding_serializes_as_array() {
        let json = serde_json::to_string(&FaceEncoding::new(vec![0.5, 1.0])).unwrap();
        assert_eq!(json, "[0.5,1.0]");
    }
}

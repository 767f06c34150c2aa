//! K-nearest-neighbour face classifier.
//!
//! Trained from labelled encodings and saved as JSON next to the examples it
//! was built from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use lipcut_models::UNKNOWN_PERSON;

use super::FaceEncoding;
use crate::error::{MediaError, MediaResult};

/// One training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledEncoding {
    pub name: String,
    pub encoding: FaceEncoding,
}

/// Distance-weighted KNN over face encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceClassifier {
    k: usize,
    samples: Vec<LabeledEncoding>,
}

/// Neighbour count for `samples` training encodings: `round(sqrt(n))`, at least 1.
pub fn default_neighbors(samples: usize) -> usize {
    ((samples as f64).sqrt().round() as usize).max(1)
}

impl FaceClassifier {
    /// Build a classifier. `k` defaults to [`default_neighbors`].
    pub fn train(samples: Vec<LabeledEncoding>, k: Option<usize>) -> MediaResult<Self> {
        if samples.is_empty() {
            return Err(MediaError::classifier("no training samples"));
        }
        let k = k.unwrap_or_else(|| default_neighbors(samples.len())).max(1);

        info!(samples = samples.len(), k = k, "Trained face classifier");
        Ok(Self { k, samples })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Name of the person `encoding` belongs to.
    ///
    /// Returns [`UNKNOWN_PERSON`] when even the nearest sample is farther than
    /// `threshold`.
    pub fn predict(&self, encoding: &FaceEncoding, threshold: f32) -> String {
        let mut neighbors: Vec<(f32, &str)> = self
            .samples
            .iter()
            .map(|s| (s.encoding.distance(encoding), s.name.as_str()))
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbors.truncate(self.k);

        match neighbors.first() {
            Some((nearest, _)) if *nearest <= threshold => {}
            _ => return UNKNOWN_PERSON.to_string(),
        }

        // Exact matches outweigh everything else
        let exact: Vec<&str> = neighbors
            .iter()
            .filter(|(d, _)| *d <= f32::EPSILON)
            .map(|(_, name)| *name)
            .collect();

        let mut votes: HashMap<&str, f32> = HashMap::new();
        if exact.is_empty() {
            for &(d, name) in &neighbors {
                *votes.entry(name).or_default() += 1.0 / d;
            }
        } else {
            for name in exact {
                *votes.entry(name).or_default() += 1.0;
            }
        }

        // Ties go to the name sorting first, so predictions are deterministic
        votes
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| UNKNOWN_PERSON.to_string())
    }

    /// Save as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> MediaResult<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!(path = %path.display(), "Saved face classifier");
        Ok(())
    }

    /// Load a classifier saved with [`FaceClassifier::save`].
    pub fn load(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::model_not_found(path.display().to_string()));
        }
        let classifier: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if classifier.samples.is_empty() || classifier.k == 0 {
            return Err(MediaError::classifier(format!(
                "{} holds no usable classifier",
                path.display()
            )));
        }
        Ok(classifier)
    }
}

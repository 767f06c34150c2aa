//! Mouth-shape classification value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// How open the mouth is relative to its width, as a percentage in `1..=100`.
///
/// A mouth opened 0.46 times its width has a ratio of 46.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MouthRatio(u8);

impl MouthRatio {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    /// Create a ratio, rejecting values outside `1..=100`.
    pub fn new(value: i64) -> ModelResult<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ModelError::RatioOutOfRange(value))
        }
    }

    /// Classify a mouth from its opening height and its width.
    ///
    /// The percentage is truncated and clamped into range. Returns `None`
    /// when the width is not a positive finite number.
    pub fn from_measurements(open_height: f64, width: f64) -> Option<Self> {
        if !(width.is_finite() && width > 0.0 && open_height.is_finite()) {
            return None;
        }

        let percent = (open_height / width * 100.0).trunc() as i64;
        Some(Self(percent.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8))
    }

    /// The ratio shifted by `offset`, if still in range.
    pub fn offset(&self, offset: i32) -> Option<Self> {
        Self::new(i64::from(self.0) + i64::from(offset)).ok()
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for MouthRatio {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<MouthRatio> for u8 {
    fn from(ratio: MouthRatio) -> Self {
        ratio.0
    }
}

impl fmt::Display for MouthRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Naming of extracted and adjusted frames.
//!
//! ffmpeg writes extracted frames as `%05d.jpg` starting at `00001.jpg`. The
//! adjust stage appends the mouth ratio, so frame 42 with ratio 46 becomes
//! `00042_46.jpg`.

use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};
use crate::mouth::MouthRatio;

/// Extension used for every frame image.
pub const FRAME_EXTENSION: &str = "jpg";

/// ffmpeg output pattern for numbered frames.
pub const FRAME_PATTERN: &str = "%05d.jpg";

/// Name of a numbered frame, e.g. `00042.jpg`.
pub fn frame_file_name(frame_number: u32) -> String {
    format!("{:05}.{}", frame_number, FRAME_EXTENSION)
}

/// Whether a file name has the frame image extension.
pub fn is_frame_image(file_name: &str) -> bool {
    file_name.ends_with(FRAME_EXTENSION)
}

/// Name of an adjusted frame: source frame number plus mouth ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdjustedFrameName {
    pub frame_number: u32,
    pub ratio: MouthRatio,
}

impl AdjustedFrameName {
    pub fn new(frame_number: u32, ratio: MouthRatio) -> Self {
        Self {
            frame_number,
            ratio,
        }
    }

    /// Parse `NNNNN_R.jpg`.
    pub fn parse(file_name: &str) -> ModelResult<Self> {
        let invalid = || ModelError::InvalidFrameName(file_name.to_string());

        let stem = file_name
            .strip_suffix(FRAME_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(invalid)?;
        let (number, ratio) = stem.split_once('_').ok_or_else(invalid)?;

        let frame_number = number.parse().map_err(|_| invalid())?;
        let ratio: i64 = ratio.parse().map_err(|_| invalid())?;

        Ok(Self::new(frame_number, MouthRatio::new(ratio)?))
    }

    /// Name of the extracted frame this adjusted frame came from.
    pub fn source_image_name(&self) -> String {
        frame_file_name(self.frame_number)
    }
}

impl FromStr for AdjustedFrameName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AdjustedFrameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:05}_{}.{}",
            self.frame_number, self.ratio, FRAME_EXTENSION
        )
    }
}

/// Adjusted file name for an extracted frame, if the source name is numeric.
pub fn adjusted_name_for(source_image: &str, ratio: MouthRatio) -> Option<AdjustedFrameName> {
    let stem = source_image.strip_suffix(FRAME_EXTENSION)?.strip_suffix('.')?;
    let frame_number = stem.parse().ok()?;
    Some(AdjustedFrameName::new(frame_number, ratio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjusted_name_display_and_parse() {
        let name = AdjustedFrameName::new(42, MouthRatio::new(46).unwrap());
        assert_eq!(name.to_string(), "00042_46.jpg");
        assert_eq!(AdjustedFrameName::parse("00042_46.jpg").unwrap(), name);
        assert_eq!(name.source_image_name(), "00042.jpg");
    }

    #[test]
    fn test_single_digit_ratio_unpadded() {
        let name = AdjustedFrameName::new(7, MouthRatio::new(5).unwrap());
        assert_eq!(name.to_string(), "00007_5.jpg");
    }

    #[test]
    fn test_parse_rejects_other_names() {
        for bad in ["00042.jpg", "00042_46.png", "abc_46.jpg", "00042_0.jpg", "00042_101.jpg"] {
            assert!(AdjustedFrameName::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_adjusted_name_for_source() {
        let ratio = MouthRatio::new(12).unwrap();
        assert_eq!(
            adjusted_name_for("00100.jpg", ratio).unwrap().to_string(),
            "00100_12.jpg"
        );
        assert!(adjusted_name_for("cover.jpg", ratio).is_none());
    }
}

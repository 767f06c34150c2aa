//! Records of the per-set `analysis.txt` file.
//!
//! Each analyzed frame contributes one line per detected face:
//!
//! ```text
//! 00042.jpg performer 312 120 388 401
//! 00042.jpg unknown 40 80 130 95
//! 00043.jpg none
//! ```
//!
//! Coordinates are stored left, top, bottom, right.

use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};
use crate::face_box::FaceBox;

/// Name written for a face that matched nobody in the model.
pub const UNKNOWN_PERSON: &str = "unknown";

/// Marker written for a frame without any detected face.
const NO_FACE: &str = "none";

/// One line of an analysis file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRecord {
    /// No face was found in the image.
    NoFace { image: String },
    /// A face was found and attributed to `name` (or `unknown`).
    Face {
        image: String,
        name: String,
        face: FaceBox,
    },
}

impl AnalysisRecord {
    /// Image file name the record refers to.
    pub fn image(&self) -> &str {
        match self {
            Self::NoFace { image } | Self::Face { image, .. } => image,
        }
    }

    /// Face box, if the record is for `person`.
    pub fn face_of(&self, person: &str) -> Option<FaceBox> {
        match self {
            Self::Face { name, face, .. } if name == person => Some(*face),
            _ => None,
        }
    }

    /// Parse one line of an analysis file.
    pub fn parse(line: &str) -> ModelResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        match fields.as_slice() {
            [image, marker] if *marker == NO_FACE => Ok(Self::NoFace {
                image: (*image).to_string(),
            }),
            [image, name, left, top, bottom, right] => Ok(Self::Face {
                image: (*image).to_string(),
                name: (*name).to_string(),
                face: FaceBox::new(
                    parse_coordinate(left)?,
                    parse_coordinate(top)?,
                    parse_coordinate(bottom)?,
                    parse_coordinate(right)?,
                ),
            }),
            _ => Err(ModelError::MalformedAnalysisLine(line.to_string())),
        }
    }
}

fn parse_coordinate(value: &str) -> ModelResult<i32> {
    value.parse().map_err(|_| ModelError::InvalidCoordinate {
        value: value.to_string(),
    })
}

impl FromStr for AnalysisRecord {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AnalysisRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFace { image } => write!(f, "{} {}", image, NO_FACE),
            Self::Face { image, name, face } => write!(
                f,
                "{} {} {} {} {} {}",
                image, name, face.left, face.top, face.bottom, face.right
            ),
        }
    }
}

/// Image names already present in an analysis file, in first-seen order.
///
/// Blank lines are ignored; a frame with several faces is listed once.
pub fn analyzed_image_names(contents: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for line in contents.lines() {
        let Some(image) = line.split_whitespace().next() else {
            continue;
        };
        if names.last().map(String::as_str) != Some(image) {
            names.push(image.to_string());
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_face_line() {
        let record = AnalysisRecord::parse("00042.jpg performer 312 120 388 401").unwrap();
        assert_eq!(record.image(), "00042.jpg");
        assert_eq!(
            record.face_of("performer"),
            Some(FaceBox::new(312, 120, 388, 401))
        );
        assert_eq!(record.face_of("someone-else"), None);
        assert_eq!(record.to_string(), "00042.jpg performer 312 120 388 401");
    }

    #[test]
    fn test_parse_no_face_line() {
        let record: AnalysisRecord = "00043.jpg none".parse().unwrap();
        assert_eq!(
            record,
            AnalysisRecord::NoFace {
                image: "00043.jpg".into()
            }
        );
        assert_eq!(record.to_string(), "00043.jpg none");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            AnalysisRecord::parse("00042.jpg performer 1 2"),
            Err(ModelError::MalformedAnalysisLine(_))
        ));
        assert!(matches!(
            AnalysisRecord::parse("00042.jpg performer 1 2 x 4"),
            Err(ModelError::InvalidCoordinate { .. })
        ));
        assert!(AnalysisRecord::parse("").is_err());
    }

    #[test]
    fn test_analyzed_image_names_dedupes_consecutive() {
        let contents = "00001.jpg none\n\
                        00002.jpg performer 1 2 3 4\n\
                        00002.jpg unknown 5 6 7 8\n\
                        \n\
                        00003.jpg none\n";
        assert_eq!(
            analyzed_image_names(contents),
            vec!["00001.jpg", "00002.jpg", "00003.jpg"]
        );
    }
}

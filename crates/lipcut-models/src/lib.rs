//! Shared data models for the lipcut pipeline.
//!
//! This crate provides:
//! - YouTube URL parsing
//! - Face boxes and mouth-shape ratios
//! - The `analysis.txt` record format
//! - Adjusted frame naming
//! - Project directory layout

pub mod analysis;
pub mod error;
pub mod face_box;
pub mod frame;
pub mod layout;
pub mod mouth;
pub mod youtube;

// Re-export common types
pub use analysis::{analyzed_image_names, AnalysisRecord, UNKNOWN_PERSON};
pub use error::{ModelError, ModelResult};
pub use face_box::FaceBox;
pub use frame::{adjusted_name_for, frame_file_name, is_frame_image, AdjustedFrameName};
pub use layout::ImageSet;
pub use mouth::MouthRatio;
pub use youtube::{extract_youtube_id, YoutubeIdError, YoutubeIdResult};

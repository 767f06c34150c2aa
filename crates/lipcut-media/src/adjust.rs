//! Face alignment for adjusted frames.
//!
//! A frame is cropped to the performer's face, leveled using the eyebrow
//! line, shifted so the mouth sits at a fixed spot, then scaled down to a
//! small grayscale square. Frames aligned this way can be swapped for one
//! another without the face jumping around.

use std::fmt;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use lipcut_models::{FaceBox, MouthRatio};

use crate::error::{MediaError, MediaResult};
use crate::face::FaceEngine;

/// Faces narrower or shorter than this many pixels are not used.
pub const DEFAULT_MIN_FACE_SIZE: i32 = 150;

/// Side of the saved adjusted frame.
pub const OUTPUT_SIZE: u32 = 300;

/// An aligned face ready to save.
#[derive(Debug, Clone)]
pub struct AdjustedFrame {
    pub image: GrayImage,
    pub ratio: MouthRatio,
}

/// Why a frame was not adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    FaceTooSmall,
    NoLandmarks,
    NoMouthRatio,
    NoLandmarksAfterRotation,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::FaceTooSmall => "face too small",
            Self::NoLandmarks => "no landmarks in crop",
            Self::NoMouthRatio => "mouth ratio not measurable",
            Self::NoLandmarksAfterRotation => "no landmarks after rotation",
        };
        f.write_str(reason)
    }
}

/// Result of adjusting one frame.
#[derive(Debug, Clone)]
pub enum AdjustOutcome {
    Adjusted(AdjustedFrame),
    Rejected(RejectReason),
}

/// Crop, level, center, resize and gray one frame.
pub fn adjust_frame(
    engine: &dyn FaceEngine,
    frame: &RgbImage,
    face: &FaceBox,
    min_face_size: i32,
) -> MediaResult<AdjustOutcome> {
    let Some(crop) = crop_square(frame, face, min_face_size) else {
        return Ok(AdjustOutcome::Rejected(RejectReason::FaceTooSmall));
    };

    let Some(landmarks) = engine.find_landmarks(&crop)? else {
        return Ok(AdjustOutcome::Rejected(RejectReason::NoLandmarks));
    };
    let Some(ratio) = landmarks.mouth_ratio() else {
        return Ok(AdjustOutcome::Rejected(RejectReason::NoMouthRatio));
    };

    let tilt = landmarks.eyebrow_tilt_degrees();
    let leveled = rotate_about_center(&crop, tilt)?;

    let Some(leveled_landmarks) = engine.find_landmarks(&leveled)? else {
        return Ok(AdjustOutcome::Rejected(RejectReason::NoLandmarksAfterRotation));
    };
    let (dx, dy) = mouth_offset(
        leveled.width(),
        leveled.height(),
        leveled_landmarks.lip_bounds().center(),
    );
    let centered = translate(&leveled, f64::from(dx), f64::from(dy))?;

    let resized = imageops::resize(&centered, OUTPUT_SIZE, OUTPUT_SIZE, FilterType::CatmullRom);
    let gray = imageops::grayscale(&resized);

    debug!(ratio = ratio.value(), tilt = tilt, dx = dx, dy = dy, "Adjusted frame");
    Ok(AdjustOutcome::Adjusted(AdjustedFrame { image: gray, ratio }))
}

/// Crop to `face` made square. Parts outside the frame are black.
///
/// Returns `None` when the face is smaller than `min_face_size` either way.
pub fn crop_square(frame: &RgbImage, face: &FaceBox, min_face_size: i32) -> Option<RgbImage> {
    if !face.is_at_least(min_face_size) {
        return None;
    }

    let square = face.to_square();
    let mut canvas = RgbImage::new(square.width() as u32, square.height() as u32);
    imageops::replace(
        &mut canvas,
        frame,
        -i64::from(square.left),
        -i64::from(square.top),
    );
    Some(canvas)
}

/// Translation moving the mouth center to `(width / 2, height * 2 / 3)`.
///
/// Positions are truncated to whole pixels before subtracting.
pub fn mouth_offset(width: u32, height: u32, mouth_center: (f64, f64)) -> (i32, i32) {
    let goal_x = (f64::from(width) / 2.0) as i32;
    let goal_y = (f64::from(height) * 2.0 / 3.0) as i32;
    (
        goal_x - mouth_center.0 as i32,
        goal_y - mouth_center.1 as i32,
    )
}

/// Rotate about the image center so a line tilted by `degrees` becomes level.
pub fn rotate_about_center(image: &RgbImage, degrees: f64) -> MediaResult<RgbImage> {
    let (cx, cy) = (f64::from(image.width()) / 2.0, f64::from(image.height()) / 2.0);
    let (sin, cos) = (-degrees.to_radians()).sin_cos();

    let to_origin = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    let rotation = Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0);
    let back = Matrix3::new(1.0, 0.0, cx, 0.0, 1.0, cy, 0.0, 0.0, 1.0);

    warp_affine(image, &(back * rotation * to_origin))
}

/// Shift the image by `(dx, dy)` pixels.
pub fn translate(image: &RgbImage, dx: f64, dy: f64) -> MediaResult<RgbImage> {
    let shift = Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0);
    warp_affine(image, &shift)
}

/// Apply a forward affine transform with bilinear sampling and black fill.
fn warp_affine(image: &RgbImage, forward: &Matrix3<f64>) -> MediaResult<RgbImage> {
    let inverse = forward
        .try_inverse()
        .ok_or_else(|| MediaError::internal("affine transform is not invertible"))?;

    let (width, height) = image.dimensions();
    let row_len = width as usize * 3;
    let mut buffer = vec![0u8; row_len * height as usize];

    buffer
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let source = inverse * Vector3::new(x as f64, y as f64, 1.0);
                if let Some(pixel) = sample_bilinear(image, source.x, source.y) {
                    row[x * 3..x * 3 + 3].copy_from_slice(&pixel);
                }
            }
        });

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| MediaError::internal("warped buffer has the wrong size"))
}

/// Bilinear sample at a sub-pixel position; `None` outside the image.
fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Option<[u8; 3]> {
    let (width, height) = image.dimensions();
    if x < 0.0 || y < 0.0 || x > f64::from(width - 1) || y > f64::from(height - 1) {
        return None;
    }

    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - f64::from(x0), y - f64::from(y0));

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = f64::from(p00[c]) * (1.0 - fx) + f64::from(p10[c]) * fx;
        let bottom = f64::from(p01[c]) * (1.0 - fx) + f64::from(p11[c]) * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::landmarks::tests::synthetic_face;
    use crate::face::testing::ScriptedEngine;
    use image::Rgb;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn test_crop_rejects_small_faces() {
        let frame = RgbImage::new(400, 400);
        assert!(crop_square(&frame, &FaceBox::new(0, 0, 149, 300), 150).is_none());
        assert!(crop_square(&frame, &FaceBox::new(0, 0, 300, 149), 150).is_none());
    }

    #[test]
    fn test_crop_fills_outside_with_black() {
        let frame = RgbImage::from_pixel(300, 300, WHITE);
        // 200 wide, 160 tall: grows 20px up and down, top edge leaves the frame
        let crop = crop_square(&frame, &FaceBox::new(50, 0, 160, 250), 150).unwrap();
        assert_eq!(crop.dimensions(), (200, 200));
        assert_eq!(*crop.get_pixel(100, 5), Rgb([0, 0, 0]));
        assert_eq!(*crop.get_pixel(100, 100), WHITE);
    }

    #[test]
    fn test_mouth_offset() {
        assert_eq!(mouth_offset(300, 300, (140.0, 180.0)), (10, 20));
        assert_eq!(mouth_offset(200, 200, (100.9, 133.2)), (0, 0));
    }

    #[test]
    fn test_translate_moves_pixels() {
        let mut image = RgbImage::new(20, 20);
        image.put_pixel(10, 10, WHITE);
        let moved = translate(&image, 5.0, 3.0).unwrap();
        assert_eq!(*moved.get_pixel(15, 13), WHITE);
        assert_eq!(*moved.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rotation_levels_tilted_line() {
        let mut image = RgbImage::new(20, 20);
        image.put_pixel(18, 10, WHITE);
        // A 90 degree tilt maps a point right of center to above it
        let rotated = rotate_about_center(&image, 90.0).unwrap();
        assert_eq!(*rotated.get_pixel(10, 2), WHITE);
        assert_eq!(*rotated.get_pixel(18, 10), Rgb([0, 0, 0]));

        let unchanged = rotate_about_center(&image, 0.0).unwrap();
        assert_eq!(unchanged, image);
    }

    #[test]
    fn test_adjust_frame() {
        let engine = ScriptedEngine {
            faces: vec![FaceBox::new(20, 20, 180, 180)],
            landmarks: Some(synthetic_face(100.0, 133.0, 60.0, 30.0)),
            ..Default::default()
        };
        let frame = RgbImage::from_pixel(640, 360, Rgb([90, 120, 150]));

        let outcome = adjust_frame(&engine, &frame, &FaceBox::new(100, 50, 250, 300), 150).unwrap();
        match outcome {
            AdjustOutcome::Adjusted(adjusted) => {
                assert_eq!(adjusted.image.dimensions(), (OUTPUT_SIZE, OUTPUT_SIZE));
                assert_eq!(adjusted.ratio.value(), 50);
            }
            AdjustOutcome::Rejected(reason) => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn test_adjust_frame_rejections() {
        let frame = RgbImage::new(640, 360);
        let face = FaceBox::new(100, 50, 250, 300);

        let no_faces = ScriptedEngine::default();
        assert!(matches!(
            adjust_frame(&no_faces, &frame, &face, 150).unwrap(),
            AdjustOutcome::Rejected(RejectReason::NoLandmarks)
        ));

        assert!(matches!(
            adjust_frame(&no_faces, &frame, &FaceBox::new(0, 0, 100, 100), 150).unwrap(),
            AdjustOutcome::Rejected(RejectReason::FaceTooSmall)
        ));
    }
}

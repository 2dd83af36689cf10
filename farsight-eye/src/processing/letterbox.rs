//! Aspect-preserving resize with gray padding

use crate::error::VisionError;
use crate::models::BoundingBox;
use opencv::core::{self, Mat, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

/// Padding color used by YOLO training pipelines
const PAD_VALUE: f64 = 114.0;

/// Geometry of one letterbox transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale from source pixels to model pixels
    pub gain: f32,
    /// Horizontal padding on each side (model pixels)
    pub pad_x: f32,
    /// Vertical padding on each side (model pixels)
    pub pad_y: f32,
    pub resized_width: i32,
    pub resized_height: i32,
    pub target: i32,
}

impl Letterbox {
    /// Fit a `src_width x src_height` frame into a `target` square
    pub fn compute(src_width: i32, src_height: i32, target: i32) -> Result<Self, VisionError> {
        if src_width <= 0 || src_height <= 0 {
            return Err(VisionError::Processing(format!(
                "Invalid frame size {}x{}",
                src_width, src_height
            )));
        }
        if target <= 0 {
            return Err(VisionError::Processing(format!("Invalid target size {}", target)));
        }

        let gain = (target as f32 / src_height as f32).min(target as f32 / src_width as f32);
        let resized_width = ((src_width as f32 * gain).round() as i32).clamp(1, target);
        let resized_height = ((src_height as f32 * gain).round() as i32).clamp(1, target);

        Ok(Self {
            gain,
            pad_x: (target - resized_width) as f32 / 2.0,
            pad_y: (target - resized_height) as f32 / 2.0,
            resized_width,
            resized_height,
            target,
        })
    }

    /// `(top, bottom, left, right)` border sizes; odd padding puts the
    /// extra pixel at the bottom / right
    pub fn borders(&self) -> (i32, i32, i32, i32) {
        (
            (self.pad_y - 0.1).round() as i32,
            (self.pad_y + 0.1).round() as i32,
            (self.pad_x - 0.1).round() as i32,
            (self.pad_x + 0.1).round() as i32,
        )
    }

    /// Map a box from model pixels back onto the source frame
    pub fn unmap(&self, bbox: &BoundingBox, src_width: f32, src_height: f32) -> BoundingBox {
        let shifted = bbox.offset(-self.pad_x, -self.pad_y);
        BoundingBox::new(
            shifted.x1 / self.gain,
            shifted.y1 / self.gain,
            shifted.x2 / self.gain,
            shifted.y2 / self.gain,
        )
        .clip(src_width, src_height)
    }

    /// Produce the padded model input image
    pub fn apply(&self, frame: &Mat) -> Result<Mat, VisionError> {
        let mut resized = Mat::default();
        if frame.cols() != self.resized_width || frame.rows() != self.resized_height {
            imgproc::resize(
                frame,
                &mut resized,
                Size::new(self.resized_width, self.resized_height),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )
            .map_err(|e| VisionError::OpenCv(format!("Failed to resize frame: {}", e)))?;
        } else {
            resized = frame.try_clone()?;
        }

        let (top, bottom, left, right) = self.borders();
        let mut padded = Mat::default();
        core::copy_make_border(
            &resized,
            &mut padded,
            top,
            bottom,
            left,
            right,
            core::BORDER_CONSTANT,
            Scalar::all(PAD_VALUE),
        )
        .map_err(|e| VisionError::OpenCv(format!("Failed to pad frame: {}", e)))?;

        Ok(padded)
    }
}

//! Decoding raw YOLO head outputs into candidate boxes

use crate::error::VisionError;
use crate::models::BoundingBox;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use tracing::warn;

/// Box proposal in model-input pixels, before NMS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// How predictions are laid out in the output tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    /// Predictions run along the last axis (`[1, C, N]`, YOLOv8 style)
    pub channels_first: bool,
    /// Channel 4 holds an objectness score (YOLOv5 style)
    pub has_objectness: bool,
    pub num_classes: usize,
}

impl OutputLayout {
    /// Work out the layout of a `[1, A, B]` output for a model that
    /// should know `num_classes` classes
    pub fn detect(shape: &[usize], num_classes: usize) -> Result<Self, VisionError> {
        if shape.len() != 3 || shape[0] != 1 {
            return Err(VisionError::Processing(format!(
                "Unexpected YOLO output shape {:?}",
                shape
            )));
        }
        let (a, b) = (shape[1], shape[2]);

        let layout = if b == num_classes + 5 {
            Self { channels_first: false, has_objectness: true, num_classes }
        } else if a == num_classes + 4 {
            Self { channels_first: true, has_objectness: false, num_classes }
        } else if b == num_classes + 4 {
            Self { channels_first: false, has_objectness: false, num_classes }
        } else if a == num_classes + 5 {
            Self { channels_first: true, has_objectness: true, num_classes }
        } else if a < b && a > 4 {
            warn!(
                "Output shape {:?} does not match {} classes, assuming {} classes",
                shape,
                num_classes,
                a - 4
            );
            Self { channels_first: true, has_objectness: false, num_classes: a - 4 }
        } else if b > 5 {
            warn!(
                "Output shape {:?} does not match {} classes, assuming {} classes",
                shape,
                num_classes,
                b - 5
            );
            Self { channels_first: false, has_objectness: true, num_classes: b - 5 }
        } else {
            return Err(VisionError::Processing(format!(
                "YOLO output shape {:?} has too few channels",
                shape
            )));
        };

        Ok(layout)
    }

    fn class_offset(&self) -> usize {
        if self.has_objectness {
            5
        } else {
            4
        }
    }
}

/// Turn the raw output into candidates scoring above `conf_thres`
pub fn decode_predictions(
    output: ArrayViewD<f32>,
    num_classes: usize,
    conf_thres: f32,
) -> Result<Vec<Candidate>, VisionError> {
    let layout = OutputLayout::detect(output.shape(), num_classes)?;

    let batch = output.index_axis(Axis(0), 0);
    let rows: ArrayView2<f32> = batch
        .into_dimensionality::<Ix2>()
        .map_err(|e| VisionError::Processing(format!("Bad YOLO output: {}", e)))?;
    // One prediction per row
    let rows = if layout.channels_first { rows.reversed_axes() } else { rows };

    let offset = layout.class_offset();
    let mut candidates = Vec::new();

    for pred in rows.outer_iter() {
        let objectness = if layout.has_objectness { pred[4] } else { 1.0 };
        if layout.has_objectness && !(objectness > conf_thres) {
            continue;
        }

        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..layout.num_classes {
            let score = pred[offset + c] * objectness;
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if !(best_score > conf_thres) || !best_score.is_finite() {
            continue;
        }

        let (cx, cy, w, h) = (pred[0], pred[1], pred[2], pred[3]);
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }

        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox: BoundingBox::from_center(cx, cy, w, h),
        });
    }

    Ok(candidates)
}

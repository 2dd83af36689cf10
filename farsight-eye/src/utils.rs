//! Utility functions for vision processing

use crate::error::VisionError;
use ndarray::{Array4, ArrayD};
use opencv::core::{Mat, CV_8UC3};
use opencv::prelude::*;

/// Convert packed BGR bytes into a normalized RGB `[1, 3, H, W]` tensor
pub fn bgr_to_chw_tensor(data: &[u8], width: usize, height: usize) -> Result<ArrayD<f32>, VisionError> {
    if width == 0 || height == 0 {
        return Err(VisionError::Processing("Image dimensions cannot be zero".to_string()));
    }

    let expected = width
        .checked_mul(height)
        .and_then(|p| p.checked_mul(3))
        .ok_or_else(|| VisionError::Processing("Image dimensions would overflow".to_string()))?;

    if data.len() < expected {
        return Err(VisionError::Processing(format!(
            "Pixel buffer too small: {} bytes for {}x{}",
            data.len(),
            width,
            height
        )));
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
    for y in 0..height {
        let row = &data[y * width * 3..(y + 1) * width * 3];
        for (x, px) in row.chunks_exact(3).enumerate() {
            tensor[[0, 0, y, x]] = px[2] as f32 / 255.0;
            tensor[[0, 1, y, x]] = px[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = px[0] as f32 / 255.0;
        }
    }

    Ok(tensor.into_dyn())
}

/// Convert an 8-bit BGR OpenCV image into a model input tensor
pub fn mat_to_chw_tensor(mat: &Mat) -> Result<ArrayD<f32>, VisionError> {
    if mat.typ() != CV_8UC3 {
        return Err(VisionError::Processing(format!(
            "Expected an 8-bit 3-channel image, got type {}",
            mat.typ()
        )));
    }

    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };

    let data = mat
        .data_bytes()
        .map_err(|e| VisionError::OpenCv(format!("Failed to get Mat data: {}", e)))?;

    bgr_to_chw_tensor(data, mat.cols() as usize, mat.rows() as usize)
}

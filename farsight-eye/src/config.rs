//! Configuration for farsight-eye

use crate::models::manager::YOLO_V8N_NAME;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Path to the YOLO ONNX model; `fetch-model` downloads the default
    pub weights: PathBuf,
    /// Square inference size in pixels (multiple of 32)
    pub img_size: u32,
    /// Object confidence threshold
    pub conf_thres: f32,
    /// IoU threshold for non-max suppression
    pub iou_thres: f32,
    /// Keep only these class ids (all classes when `None`)
    pub classes: Option<Vec<usize>>,
    /// Suppress overlapping boxes across classes
    pub agnostic_nms: bool,
    /// Maximum detections kept per frame
    pub max_det: usize,
    /// Execution device: "cpu" or a CUDA device index such as "0"
    pub device: String,
    /// Newline-separated class names (COCO names when `None`)
    pub class_names_file: Option<PathBuf>,
    /// Directory for downloaded models
    pub model_dir: PathBuf,
}

impl Default for VisionConfig {
    fn default() -> Self {
        let model_dir = dirs::home_dir()
            .map(|mut p| {
                p.push(".farsight");
                p.push("models");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models"));

        Self {
            weights: model_dir.join(YOLO_V8N_NAME),
            img_size: 640,
            conf_thres: 0.25,
            iou_thres: 0.45,
            classes: None,
            agnostic_nms: false,
            max_det: 300,
            device: "cpu".to_string(),
            class_names_file: None,
            model_dir,
        }
    }
}

impl VisionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.img_size == 0 || self.img_size > 4096 {
            return Err("Image size must be between 1 and 4096".to_string());
        }

        if self.img_size % 32 != 0 {
            return Err(format!(
                "Image size {} must be a multiple of the model stride 32",
                self.img_size
            ));
        }

        if !(0.0..=1.0).contains(&self.conf_thres) {
            return Err("Confidence threshold must be between 0.0 and 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.iou_thres) {
            return Err("IoU threshold must be between 0.0 and 1.0".to_string());
        }

        if self.max_det == 0 || self.max_det > 10_000 {
            return Err("Max detections must be between 1 and 10000".to_string());
        }

        if let Some(ref classes) = self.classes {
            if classes.is_empty() {
                return Err("Class filter cannot be empty (omit it to keep all classes)".to_string());
            }
        }

        if self.device.trim().is_empty() {
            return Err("Device cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn uses_gpu(&self) -> bool {
        !self.device.eq_ignore_ascii_case("cpu")
    }
}

/// What to do with each processed frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent of run directories
    pub project: PathBuf,
    /// Run directory name, incremented (exp, exp2, ...) unless `exist_ok`
    pub name: String,
    /// Reuse an existing run directory
    pub exist_ok: bool,
    /// Save annotated images / videos
    pub save_img: bool,
    /// Save detections as normalized label files
    pub save_txt: bool,
    /// Append confidences to label lines
    pub save_conf: bool,
    /// Show frames in a window
    pub view_img: bool,
    /// Box line thickness (derived from frame size when `None`; 1 draws
    /// the thin boxes of the original detector script)
    pub line_thickness: Option<i32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            project: PathBuf::from("runs/detect"),
            name: "exp".to_string(),
            exist_ok: false,
            save_img: true,
            save_txt: false,
            save_conf: false,
            view_img: false,
            line_thickness: None,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Run name cannot be empty".to_string());
        }

        if self.name.contains("..") || self.name.contains('/') || self.name.contains('\\') {
            return Err("Run name contains invalid characters".to_string());
        }

        if let Some(thickness) = self.line_thickness {
            if !(1..=50).contains(&thickness) {
                return Err("Line thickness must be between 1 and 50".to_string());
            }
        }

        Ok(())
    }

    /// Whether anything needs to be written to disk
    pub fn writes_results(&self) -> bool {
        self.save_img || self.save_txt
    }
}

//! Object detection pipeline

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::models::yolo::{coco_class_names, load_class_names};
use crate::models::{Detection, YoloModel};
use crate::processing::decode::decode_predictions;
use crate::processing::letterbox::Letterbox;
use crate::processing::nms::{filter_classes, non_max_suppression};
use crate::utils::mat_to_chw_tensor;
use ndarray::ArrayViewD;
use opencv::core::Mat;
use opencv::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Letterbox, infer, decode, filter and suppress
pub struct DetectionPipeline {
    model: YoloModel,
    config: Arc<VisionConfig>,
    class_names: Vec<String>,
}

impl DetectionPipeline {
    /// Load the model and class names named by `config`
    pub fn new(config: Arc<VisionConfig>) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;

        let class_names = match config.class_names_file {
            Some(ref path) => load_class_names(path)?,
            None => coco_class_names(),
        };

        let model = YoloModel::new(&config.weights, config.img_size, &config.device)?;

        Ok(Self {
            model,
            config,
            class_names,
        })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Class id for a class name, if the model knows it
    pub fn class_id(&self, class_name: &str) -> Option<usize> {
        self.class_names.iter().position(|n| n == class_name)
    }

    /// Detect objects in a BGR frame; boxes are in frame pixels
    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, VisionError> {
        let classes = self.config.classes.clone();
        self.detect_with_classes(frame, classes.as_deref())
    }

    /// Like [`detect`](Self::detect) with an explicit class filter
    pub fn detect_with_classes(
        &mut self,
        frame: &Mat,
        classes: Option<&[usize]>,
    ) -> Result<Vec<Detection>, VisionError> {
        let (width, height) = (frame.cols(), frame.rows());
        let letterbox = Letterbox::compute(width, height, self.model.input_size() as i32)?;

        let input = letterbox.apply(frame)?;
        let tensor = mat_to_chw_tensor(&input)?;
        let output = self.model.run(&tensor)?;

        let detections = postprocess(
            output.view(),
            &self.config,
            classes,
            &self.class_names,
            &letterbox,
            width as f32,
            height as f32,
        )?;

        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

/// Decode and filter a raw output, mapping boxes onto the source frame
pub fn postprocess(
    output: ArrayViewD<f32>,
    config: &VisionConfig,
    classes: Option<&[usize]>,
    class_names: &[String],
    letterbox: &Letterbox,
    frame_width: f32,
    frame_height: f32,
) -> Result<Vec<Detection>, VisionError> {
    let candidates = decode_predictions(output, class_names.len(), config.conf_thres)?;
    let candidates = filter_classes(candidates, classes);
    let kept = non_max_suppression(candidates, config.iou_thres, config.agnostic_nms, config.max_det);

    let detections = kept
        .into_iter()
        .map(|c| Detection {
            class_id: c.class_id,
            class_name: class_name(class_names, c.class_id),
            confidence: c.confidence,
            bbox: letterbox.unmap(&c.bbox, frame_width, frame_height),
        })
        .filter(|d| d.bbox.width() > 0.0 && d.bbox.height() > 0.0)
        .collect();

    Ok(detections)
}

fn class_name(class_names: &[String], class_id: usize) -> String {
    class_names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class{}", class_id))
}

/// Per-class counts, e.g. "2 persons, 1 dog"
pub fn summarize(detections: &[Detection]) -> String {
    let mut counts: BTreeMap<(usize, &str), usize> = BTreeMap::new();
    for d in detections {
        *counts.entry((d.class_id, d.class_name.as_str())).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((_, name), n)| format!("{} {}{}", n, name, if n > 1 { "s" } else { "" }))
        .collect::<Vec<_>>()
        .join(", ")
}

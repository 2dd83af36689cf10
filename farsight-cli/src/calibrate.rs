//! Focal-length calibration from reference photographs

use crate::config::RangingConfig;
use anyhow::{anyhow, bail, Context, Result};
use farsight_core::{Calibration, CalibrationTarget};
use farsight_eye::{Detection, DetectionPipeline, VisionConfig};
use opencv::{imgcodecs, prelude::*};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_CALIBRATION_FILE: &str = "calibration.json";

/// Highest-confidence detection of `class_name`
pub fn best_detection<'a>(detections: &'a [Detection], class_name: &str) -> Option<&'a Detection> {
    detections
        .iter()
        .filter(|d| d.class_name == class_name)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Detect the target object in its reference photograph
pub fn measure_reference(pipeline: &mut DetectionPipeline, target: &CalibrationTarget) -> Result<Detection> {
    let class_id = pipeline
        .class_id(&target.class_name)
        .ok_or_else(|| anyhow!("The model has no class named '{}'", target.class_name))?;

    let path = target.image.to_string_lossy();
    let image = imgcodecs::imread(&path, imgcodecs::IMREAD_COLOR)
        .with_context(|| format!("Failed to read {}", path))?;
    if image.empty() {
        bail!("Image not found {}", path);
    }

    let detections = pipeline.detect_with_classes(&image, Some(&[class_id]))?;
    let best = best_detection(&detections, &target.class_name)
        .cloned()
        .ok_or_else(|| anyhow!("No {} found in {}", target.class_name, path))?;

    info!(
        "{} {}: width {:.1}px (confidence {:.2})",
        target.class_name,
        class_id,
        best.bbox.width(),
        best.confidence
    );
    Ok(best)
}

/// Calibrate every target whose reference photograph can be measured
pub fn calibrate_targets(pipeline: &mut DetectionPipeline, targets: &[CalibrationTarget]) -> Result<Calibration> {
    let mut calibration = Calibration::new();

    for target in targets {
        match measure_reference(pipeline, target) {
            Ok(detection) => {
                calibration.calibrate(target, detection.bbox.width())?;
            }
            Err(e) => warn!("Skipping calibration of {}: {:#}", target.class_name, e),
        }
    }

    if calibration.is_empty() && !targets.is_empty() {
        bail!("None of the {} reference images could be calibrated", targets.len());
    }

    Ok(calibration)
}

/// Where `calibrate` writes: the explicit path, else the configured
/// calibration file that `run` reads, else `calibration.json`
pub fn calibration_output(explicit: Option<PathBuf>, ranging: &RangingConfig) -> PathBuf {
    explicit
        .or_else(|| ranging.calibration_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CALIBRATION_FILE))
}

/// Detector settings for measuring the reference photographs, when they
/// differ from the run model
pub fn calibration_vision(vision: &VisionConfig, ranging: &RangingConfig) -> Option<VisionConfig> {
    ranging.calibration_weights.as_ref().map(|weights| VisionConfig {
        weights: weights.clone(),
        ..vision.clone()
    })
}

/// Measure every target, with the calibration model if one is configured
pub fn measure_targets(
    pipeline: &mut DetectionPipeline,
    vision: &VisionConfig,
    ranging: &RangingConfig,
) -> Result<Calibration> {
    match calibration_vision(vision, ranging) {
        Some(config) => {
            info!("Calibrating with {:?}", config.weights);
            let weights = config.weights.clone();
            let mut calibration_pipeline = DetectionPipeline::new(Arc::new(config))
                .with_context(|| format!("Failed to load calibration detector {:?}", weights))?;
            calibrate_targets(&mut calibration_pipeline, &ranging.targets)
        }
        None => calibrate_targets(pipeline, &ranging.targets),
    }
}

/// Saved calibration when the configured file exists, otherwise measure the
/// reference photographs and save the result to that file
pub fn load_or_calibrate(
    pipeline: &mut DetectionPipeline,
    vision: &VisionConfig,
    ranging: &RangingConfig,
) -> Result<Calibration> {
    if let Some(path) = ranging.calibration_file.as_deref() {
        if path.exists() {
            let calibration = Calibration::load(path)
                .with_context(|| format!("Failed to load calibration {}", path.display()))?;
            info!("Using {} saved focal lengths from {:?}", calibration.len(), path);
            return Ok(calibration);
        }
    }

    let calibration = measure_targets(pipeline, vision, ranging)?;

    if let Some(path) = ranging.calibration_file.as_deref() {
        calibration.save(path)?;
    }
    Ok(calibration)
}

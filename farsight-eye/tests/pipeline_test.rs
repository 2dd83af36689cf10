//! Detection pipeline tests that do not need model weights

use farsight_eye::config::VisionConfig;
use farsight_eye::error::VisionError;
use farsight_eye::models::yolo::coco_class_names;
use farsight_eye::models::{BoundingBox, ModelManager};
use farsight_eye::processing::{postprocess, summarize, DetectionPipeline, Letterbox};
use ndarray::Array3;
use std::sync::Arc;
use tempfile::TempDir;

/// YOLOv8-style `[1, 84, N]` output with the given `(cx, cy, w, h, class, score)` rows
fn yolov8_output(preds: &[(f32, f32, f32, f32, usize, f32)]) -> Array3<f32> {
    let mut output = Array3::<f32>::zeros((1, 84, preds.len()));
    for (n, &(cx, cy, w, h, class, score)) in preds.iter().enumerate() {
        output[[0, 0, n]] = cx;
        output[[0, 1, n]] = cy;
        output[[0, 2, n]] = w;
        output[[0, 3, n]] = h;
        output[[0, 4 + class, n]] = score;
    }
    output
}

#[test]
fn test_missing_weights_is_model_error() {
    let config = VisionConfig {
        weights: "/no/such/weights.onnx".into(),
        ..VisionConfig::default()
    };
    match DetectionPipeline::new(Arc::new(config)) {
        Err(VisionError::Model(msg)) => assert!(msg.contains("weights.onnx")),
        Err(e) => panic!("expected model error, got {}", e),
        Ok(_) => panic!("expected model error"),
    }
}

#[test]
fn test_invalid_config_rejected_before_loading() {
    let config = VisionConfig {
        img_size: 100,
        ..VisionConfig::default()
    };
    assert!(matches!(
        DetectionPipeline::new(Arc::new(config)),
        Err(VisionError::Config(_))
    ));
}

#[test]
fn test_person_and_dog_on_wide_frame() {
    let names = coco_class_names();
    let config = VisionConfig::default();
    let letterbox = Letterbox::compute(1280, 720, 640).unwrap();

    // Two overlapping person boxes collapse to one; the dog survives
    let output = yolov8_output(&[
        (200.0, 320.0, 100.0, 200.0, 0, 0.91),
        (202.0, 322.0, 100.0, 200.0, 0, 0.80),
        (500.0, 400.0, 80.0, 60.0, 16, 0.75),
        (400.0, 300.0, 10.0, 10.0, 2, 0.10),
    ]);

    let detections = postprocess(
        output.view().into_dyn(),
        &config,
        None,
        &names,
        &letterbox,
        1280.0,
        720.0,
    )
    .unwrap();

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class_name, "person");
    assert_eq!(detections[0].bbox, BoundingBox::new(300.0, 160.0, 500.0, 560.0));
    assert_eq!(detections[1].class_name, "dog");
    assert_eq!(summarize(&detections), "1 person, 1 dog");
}

#[test]
fn test_class_filter_keeps_people_and_dogs() {
    let names = coco_class_names();
    let config = VisionConfig {
        classes: Some(vec![0, 16]),
        ..VisionConfig::default()
    };
    let letterbox = Letterbox::compute(640, 640, 640).unwrap();
    let output = yolov8_output(&[
        (100.0, 100.0, 50.0, 50.0, 0, 0.9),
        (300.0, 300.0, 50.0, 50.0, 2, 0.9),
        (500.0, 500.0, 50.0, 50.0, 16, 0.9),
    ]);

    let detections = postprocess(
        output.view().into_dyn(),
        &config,
        config.classes.as_deref(),
        &names,
        &letterbox,
        640.0,
        640.0,
    )
    .unwrap();

    let ids: Vec<usize> = detections.iter().map(|d| d.class_id).collect();
    assert_eq!(ids, vec![0, 16]);
}

#[tokio::test]
async fn test_model_manager_uses_existing_file() {
    let dir = TempDir::new().unwrap();
    let config = VisionConfig {
        model_dir: dir.path().to_path_buf(),
        ..VisionConfig::default()
    };
    let existing = dir.path().join("custom.onnx");
    std::fs::write(&existing, b"onnx").unwrap();

    let manager = ModelManager::new(Arc::new(config));
    let path = manager
        .ensure_model("custom.onnx", "https://example.com/custom.onnx", "")
        .await
        .unwrap();
    assert_eq!(path, existing);
}

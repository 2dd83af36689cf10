//! Tests for run directories, label files and result saving

use farsight_eye::config::OutputConfig;
use farsight_eye::models::{BoundingBox, Detection};
use farsight_eye::output::{write_labels, ResultSaver, RunDirectory};
use farsight_eye::source::{Frame, FrameMode};
use opencv::core::{Mat, Scalar, CV_8UC3};
use std::fs;
use tempfile::TempDir;

fn output_config(dir: &TempDir, save_txt: bool) -> OutputConfig {
    OutputConfig {
        project: dir.path().join("runs"),
        save_txt,
        ..OutputConfig::default()
    }
}

fn person(x1: f32) -> Detection {
    Detection {
        class_id: 0,
        class_name: "person".to_string(),
        confidence: 0.9,
        bbox: BoundingBox::new(x1, 0.0, x1 + 100.0, 100.0),
    }
}

#[test]
fn test_run_directories_increment() {
    let dir = TempDir::new().unwrap();
    let config = output_config(&dir, false);

    let first = RunDirectory::create(&config).unwrap();
    let second = RunDirectory::create(&config).unwrap();
    let third = RunDirectory::create(&config).unwrap();

    assert_eq!(first.path(), dir.path().join("runs/exp"));
    assert_eq!(second.path(), dir.path().join("runs/exp2"));
    assert_eq!(third.path(), dir.path().join("runs/exp3"));
    assert!(third.path().is_dir());
    assert!(first.labels_dir().is_none());
}

#[test]
fn test_run_directory_exist_ok_reuses() {
    let dir = TempDir::new().unwrap();
    let mut config = output_config(&dir, true);
    config.exist_ok = true;

    let first = RunDirectory::create(&config).unwrap();
    let again = RunDirectory::create(&config).unwrap();
    assert_eq!(first.path(), again.path());
    assert!(again.labels_dir().unwrap().is_dir());
}

#[test]
fn test_label_paths_by_mode() {
    let dir = TempDir::new().unwrap();
    let run = RunDirectory::create(&output_config(&dir, true)).unwrap();
    let labels = run.labels_dir().unwrap().to_path_buf();

    assert_eq!(
        run.label_path("data/images/bus.jpg", FrameMode::Image, 0).unwrap(),
        labels.join("bus.txt")
    );
    assert_eq!(
        run.label_path("clips/walk.mp4", FrameMode::Video, 12).unwrap(),
        labels.join("walk_12.txt")
    );
    assert_eq!(
        run.label_path("0", FrameMode::Stream, 3).unwrap(),
        labels.join("0_3.txt")
    );
}

#[test]
fn test_no_label_paths_without_save_txt() {
    let dir = TempDir::new().unwrap();
    let run = RunDirectory::create(&output_config(&dir, false)).unwrap();
    assert!(run.label_path("bus.jpg", FrameMode::Image, 0).is_none());
    assert!(run.summary().starts_with("Results saved to"));
}

#[test]
fn test_write_labels_appends() {
    let dir = TempDir::new().unwrap();
    let run = RunDirectory::create(&output_config(&dir, true)).unwrap();
    let path = run.label_path("bus.jpg", FrameMode::Image, 0).unwrap();

    write_labels(&path, &[person(0.0)], 200.0, 100.0, false).unwrap();
    write_labels(&path, &[person(100.0)], 200.0, 100.0, true).unwrap();
    write_labels(&path, &[], 200.0, 100.0, true).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines, vec!["0 0.25 0.5 0.5 1", "0 0.75 0.5 0.5 1 0.9"]);
    assert_eq!(run.label_count(), 1);
    assert!(run.summary().contains("1 labels saved to"));
}

#[test]
fn test_save_image_result() {
    let dir = TempDir::new().unwrap();
    let run = RunDirectory::create(&output_config(&dir, false)).unwrap();

    let image = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(0.0)).unwrap();
    let frame = Frame {
        source_name: "ref/50.jpg".to_string(),
        image: image.clone(),
        index: 0,
        mode: FrameMode::Image,
        meta: None,
    };

    let mut saver = ResultSaver::new();
    let saved = saver.save(&run, &frame, &image).unwrap();
    assert_eq!(saved, run.path().join("50.jpg"));
    assert!(saved.is_file());
    saver.finish().unwrap();
}

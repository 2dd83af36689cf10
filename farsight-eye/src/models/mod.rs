//! Detector models and model files

pub mod manager;
pub mod yolo;

pub use manager::ModelManager;
pub use yolo::{BoundingBox, Detection, YoloModel, COCO_CLASSES};

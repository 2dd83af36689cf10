//! farsight-eye: vision half of farsight
//!
//! Reads frames from images, videos, webcams and network streams, runs a
//! YOLO detector exported to ONNX, and draws or saves the results.

pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod overlay;
pub mod processing;
pub mod source;
mod utils;

pub use config::{OutputConfig, VisionConfig};
pub use error::VisionError;
pub use models::{BoundingBox, Detection, ModelManager, YoloModel};
pub use output::{ResultSaver, RunDirectory};
pub use overlay::{draw_box, Palette};
pub use processing::{summarize, DetectionPipeline};
pub use source::{Frame, FrameMode, MediaSource};

//! Vision processing pipelines

pub mod decode;
pub mod detection;
pub mod letterbox;
pub mod nms;

pub use decode::{decode_predictions, Candidate, OutputLayout};
pub use detection::{postprocess, summarize, DetectionPipeline};
pub use letterbox::Letterbox;
pub use nms::{filter_classes, non_max_suppression};

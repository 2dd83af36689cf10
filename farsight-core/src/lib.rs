//! farsight-core: ranging and warning logic shared by the farsight crates
//!
//! Turns bounding-box widths into distances with a pinhole camera model,
//! buckets boxes into left / center / right, and composes the sentence
//! spoken when something gets too close.

pub mod error;
pub mod ranging;
pub mod announce;

pub use error::{Error, Result};
pub use ranging::{
    focal_length, position_in_frame, Calibration, CalibrationTarget, FocalLength, Position,
    DEFAULT_POSITION_MARGIN_PX,
};
pub use announce::{compose_warning, AlertConfig, Proximity, Sighting};

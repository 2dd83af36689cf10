//! farsight: obstacle warnings for the visually impaired
//!
//! Detects objects in camera or file input, estimates how far away they are
//! from calibrated focal lengths and speaks a warning when something is close.

pub mod calibrate;
pub mod config;
pub mod runner;

pub use config::{ConfigError, FarsightConfig};
pub use runner::{Assessment, RunStats, Runner};

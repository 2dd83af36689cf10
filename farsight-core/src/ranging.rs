//! Pinhole-camera ranging
//!
//! A reference photograph of an object of known width, taken at a known
//! distance, fixes the camera's focal length in pixels. Afterwards the
//! distance to any object of the same class follows from its apparent
//! width alone:
//!
//! ```text
//! focal_px    = width_px(ref) * known_distance / real_width
//! distance    = focal_px * real_width / width_px
//! ```
//!
//! An object seen at its reference width is therefore ranged at exactly
//! its reference distance.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Horizontal dead zone around the frame center, in pixels
pub const DEFAULT_POSITION_MARGIN_PX: f32 = 50.0;

/// Reference photograph used to calibrate one object class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    /// Detector class name, e.g. "person"
    pub class_name: String,
    /// Path to the reference image
    pub image: PathBuf,
    /// Distance between camera and object when the photo was taken (cm)
    pub known_distance_cm: f32,
    /// Real width of the object (cm)
    pub real_width_cm: f32,
}

impl CalibrationTarget {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.class_name.trim().is_empty() {
            return Err("Calibration class name cannot be empty".to_string());
        }
        if !(self.known_distance_cm.is_finite() && self.known_distance_cm > 0.0) {
            return Err(format!(
                "Known distance for '{}' must be positive",
                self.class_name
            ));
        }
        if !(self.real_width_cm.is_finite() && self.real_width_cm > 0.0) {
            return Err(format!("Real width for '{}' must be positive", self.class_name));
        }
        Ok(())
    }

    /// The two reference photographs shipped with the project
    pub fn defaults() -> Vec<CalibrationTarget> {
        vec![
            CalibrationTarget {
                class_name: "person".to_string(),
                image: PathBuf::from("ref/50.jpg"),
                known_distance_cm: 25.0,
                real_width_cm: 40.0,
            },
            CalibrationTarget {
                class_name: "dog".to_string(),
                image: PathBuf::from("ref/dog50.jpg"),
                known_distance_cm: 25.0,
                real_width_cm: 40.0,
            },
        ]
    }
}

/// Focal length of the camera, measured against one object class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalLength {
    pub focal_px: f32,
    pub real_width_cm: f32,
}

impl FocalLength {
    /// Distance in meters to an object of this class that appears
    /// `width_px` wide
    pub fn distance_m(&self, width_px: f32) -> Option<f32> {
        if !(width_px.is_finite() && width_px > 0.0) {
            return None;
        }
        let distance_cm = self.focal_px * self.real_width_cm / width_px;
        let distance_m = distance_cm / 100.0;
        distance_m.is_finite().then_some(distance_m)
    }
}

/// Compute the focal length (pixels) from a reference measurement
pub fn focal_length(width_px: f32, known_distance_cm: f32, real_width_cm: f32) -> Result<f32> {
    for (name, value) in [
        ("reference width", width_px),
        ("known distance", known_distance_cm),
        ("real width", real_width_cm),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::Calibration(format!(
                "{} must be a positive number, got {}",
                name, value
            )));
        }
    }
    Ok(width_px * known_distance_cm / real_width_cm)
}

/// Focal lengths for every calibrated class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub focal_lengths: BTreeMap<String, FocalLength>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference measurement for `target`
    pub fn calibrate(&mut self, target: &CalibrationTarget, width_px: f32) -> Result<FocalLength> {
        target.validate().map_err(Error::Calibration)?;
        let focal_px = focal_length(width_px, target.known_distance_cm, target.real_width_cm)?;
        let focal = FocalLength {
            focal_px,
            real_width_cm: target.real_width_cm,
        };
        info!(
            "Focal length of {}: {:.2}px (reference width {:.1}px)",
            target.class_name, focal_px, width_px
        );
        self.focal_lengths.insert(target.class_name.clone(), focal);
        Ok(focal)
    }

    pub fn get(&self, class_name: &str) -> Option<&FocalLength> {
        self.focal_lengths.get(class_name)
    }

    /// Distance in meters, `None` when the class was never calibrated
    pub fn distance_m(&self, class_name: &str, width_px: f32) -> Option<f32> {
        self.get(class_name)?.distance_m(width_px)
    }

    pub fn is_empty(&self) -> bool {
        self.focal_lengths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.focal_lengths.len()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let calibration: Calibration = serde_json::from_str(&content)
            .map_err(|e| Error::Deserialization(format!("{}: {}", path.display(), e)))?;
        for (class_name, focal) in &calibration.focal_lengths {
            if !(focal.focal_px.is_finite() && focal.focal_px > 0.0) {
                return Err(Error::Calibration(format!(
                    "Invalid focal length for '{}' in {}",
                    class_name,
                    path.display()
                )));
            }
        }
        debug!("Loaded {} focal lengths from {:?}", calibration.len(), path);
        Ok(calibration)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        info!("Calibration saved to {:?}", path);
        Ok(())
    }
}

/// Where an object sits horizontally relative to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Left,
    Center,
    Right,
}

impl Position {
    /// Spoken form of the position
    pub fn phrase(&self) -> &'static str {
        match self {
            Position::Left => "on your left side",
            Position::Center => "ahead of you",
            Position::Right => "on your right side",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Left => write!(f, "left"),
            Position::Center => write!(f, "center"),
            Position::Right => write!(f, "right"),
        }
    }
}

/// Bucket a box center into left / center / right of the frame
pub fn position_in_frame(center_x: f32, frame_width: f32, margin_px: f32) -> Position {
    let image_center = frame_width / 2.0;
    if center_x < image_center - margin_px {
        Position::Left
    } else if center_x > image_center + margin_px {
        Position::Right
    } else {
        Position::Center
    }
}

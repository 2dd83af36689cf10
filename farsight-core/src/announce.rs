//! Spoken warnings for nearby objects

use crate::ranging::Position;
use serde::{Deserialize, Serialize};

/// Distance thresholds driving box colors and speech
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Objects nearer than this are announced (meters)
    pub danger_distance_m: f32,
    /// Objects nearer than this are highlighted (meters)
    pub warning_distance_m: f32,
    /// Below this the distance is spoken as "too close to you" (meters)
    pub too_close_distance_m: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            danger_distance_m: 2.0,
            warning_distance_m: 4.0,
            too_close_distance_m: 3.0,
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("Danger distance", self.danger_distance_m),
            ("Warning distance", self.warning_distance_m),
            ("Too-close distance", self.too_close_distance_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{} must be positive", name));
            }
        }

        if self.danger_distance_m > self.warning_distance_m {
            return Err("Danger distance cannot exceed warning distance".to_string());
        }

        Ok(())
    }

    pub fn classify(&self, distance_m: f32) -> Proximity {
        if distance_m < self.danger_distance_m {
            Proximity::Danger
        } else if distance_m < self.warning_distance_m {
            Proximity::Warning
        } else {
            Proximity::Clear
        }
    }
}

/// How close an object is, relative to the alert thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    Danger,
    Warning,
    Clear,
}

/// A ranged object, ready to be described
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub label: String,
    pub distance_m: f32,
    pub position: Position,
}

impl Sighting {
    pub fn new(label: impl Into<String>, distance_m: f32, position: Position) -> Self {
        Self {
            label: label.into(),
            distance_m,
            position,
        }
    }

    fn describe(&self, config: &AlertConfig) -> String {
        let distance = if self.distance_m < config.too_close_distance_m {
            "too close to you".to_string()
        } else {
            format!("{:.1} meters away", self.distance_m)
        };
        format!("{} {} {}", self.label, distance, self.position.phrase())
    }
}

/// Sentence describing every object inside the danger distance, nearest
/// first. `None` when nothing is close enough to mention.
pub fn compose_warning(sightings: &[Sighting], config: &AlertConfig) -> Option<String> {
    let mut close: Vec<&Sighting> = sightings
        .iter()
        .filter(|s| s.distance_m.is_finite())
        .filter(|s| config.classify(s.distance_m) == Proximity::Danger)
        .collect();

    if close.is_empty() {
        return None;
    }

    close.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

    let parts: Vec<String> = close.iter().map(|s| s.describe(config)).collect();
    Some(format!("{}.", parts.join(", ")))
}

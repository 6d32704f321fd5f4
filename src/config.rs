use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::light::Lighting;
use crate::vertex::SLOTS_PER_BOX;

/// Boxes a batch holds between flushes unless configured otherwise.
pub const DEFAULT_BOX_CAPACITY: usize = 64;

/// Settings used to construct a [`BatchEngine`](crate::BatchEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scratch capacity in scalar slots. Must be a non-zero multiple of six.
    #[serde(default = "default_capacity_slots")]
    pub capacity_slots: usize,
    /// Direction towards the sun, normalized on use. `None` keeps the
    /// default sun.
    #[serde(default)]
    pub sun: Option<Vec3>,
    #[serde(default = "default_label")]
    pub label: String,
}

impl BatchConfig {
    /// Configuration sized for `boxes` boxes per flush.
    pub fn with_box_capacity(boxes: usize) -> Self {
        Self {
            capacity_slots: boxes * SLOTS_PER_BOX,
            ..Self::default()
        }
    }

    /// Whole boxes that fit between flushes.
    pub fn box_capacity(&self) -> usize {
        self.capacity_slots / SLOTS_PER_BOX
    }

    pub fn lighting(&self) -> Result<Lighting, BatchError> {
        match self.sun {
            Some(sun) => Lighting::new(sun),
            None => Ok(Lighting::default()),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            capacity_slots: default_capacity_slots(),
            sun: None,
            label: default_label(),
        }
    }
}

fn default_capacity_slots() -> usize {
    DEFAULT_BOX_CAPACITY * SLOTS_PER_BOX
}

fn default_label() -> String {
    "chunk-batch".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hold_sixty_four_boxes() {
        let config = BatchConfig::default();
        assert_eq!(config.capacity_slots, 64 * 216);
        assert_eq!(config.box_capacity(), 64);
        assert_eq!(config.lighting().unwrap(), Lighting::default());
    }

    #[test]
    fn box_capacity_rounds_down() {
        let mut config = BatchConfig::with_box_capacity(3);
        assert_eq!(config.box_capacity(), 3);
        config.capacity_slots -= 6;
        assert_eq!(config.box_capacity(), 2);
    }

    #[test]
    fn zero_sun_is_rejected() {
        let config = BatchConfig {
            sun: Some(Vec3::ZERO),
            ..BatchConfig::default()
        };
        assert!(config.lighting().is_err());
    }
}

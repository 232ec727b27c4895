//! Demo scenario settings.

use crate::error::{Result, VisPipeError};
use crate::pipeline::Extent;
use serde::{Deserialize, Serialize};

/// Parameters of the `vispipe` demo: an image source feeding a mean filter,
/// updated piece by piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Whole extent advertised by the source
    pub whole_extent: Extent,
    /// Pieces the output is split into
    pub number_of_pieces: i32,
    /// Ghost points requested around each piece
    pub ghost_level: i32,
    /// Neighbourhood radius of the mean filter
    pub halo_radius: i32,
    /// Constant written by the source
    pub fill_value: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            whole_extent: Extent::new(0, 63, 0, 63, 0, 0),
            number_of_pieces: 4,
            ghost_level: 0,
            halo_radius: 1,
            fill_value: 1.0,
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_pieces < 1 {
            return Err(VisPipeError::Config(format!(
                "demo.number_of_pieces must be at least 1, got {}",
                self.number_of_pieces
            )));
        }
        if self.ghost_level < 0 || self.halo_radius < 0 {
            return Err(VisPipeError::Config(
                "demo.ghost_level and demo.halo_radius must not be negative".to_string(),
            ));
        }
        if self.whole_extent.is_empty() {
            return Err(VisPipeError::Config(format!(
                "demo.whole_extent {} is empty",
                self.whole_extent
            )));
        }
        Ok(())
    }
}

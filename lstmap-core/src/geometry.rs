//! Scan geometry of a map acquisition.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scan geometry declared in the `Map size` header line.
///
/// Sizes are in instrument units (micrometres); the pixel dimensions divide
/// the map into the histogram grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapGeometry {
    pub map_width: u32,
    pub map_height: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pen_size: u32,
}

impl MapGeometry {
    /// Creates a geometry, rejecting zero pixel dimensions.
    ///
    /// # Errors
    /// Returns [`Error::Format`] if `pixel_width` or `pixel_height` is zero.
    pub fn new(
        map_width: u32,
        map_height: u32,
        pixel_width: u32,
        pixel_height: u32,
        pen_size: u32,
    ) -> Result<Self> {
        if pixel_width == 0 || pixel_height == 0 {
            return Err(Error::Format(format!(
                "pixel size must be non-zero, got {pixel_width}x{pixel_height}"
            )));
        }
        Ok(Self {
            map_width,
            map_height,
            pixel_width,
            pixel_height,
            pen_size,
        })
    }

    /// Number of pixel columns, `ceil(map_width / pixel_width)`.
    #[must_use]
    pub fn max_x(&self) -> u32 {
        self.map_width.div_ceil(self.pixel_width)
    }

    /// Number of pixel rows, `ceil(map_height / pixel_height)`.
    #[must_use]
    pub fn max_y(&self) -> u32 {
        self.map_height.div_ceil(self.pixel_height)
    }

    /// Histogram shape `(x, y, channels)` for a detector of the given depth.
    #[must_use]
    pub fn histogram_shape(&self, channels: u32) -> (usize, usize, usize) {
        (
            self.max_x() as usize,
            self.max_y() as usize,
            channels as usize,
        )
    }

    /// Flat key/value view used for output attributes.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        vec![
            ("map_width", self.map_width.to_string()),
            ("map_height", self.map_height.to_string()),
            ("pixel_width", self.pixel_width.to_string()),
            ("pixel_height", self.pixel_height.to_string()),
            ("pen_size", self.pen_size.to_string()),
            ("max_x", self.max_x().to_string()),
            ("max_y", self.max_y().to_string()),
        ]
    }
}

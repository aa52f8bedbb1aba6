//! Detector table: trigger-mask lookup and computed detector definitions.

use crate::{Error, Result};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a base detector inside a [`DetectorTable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorId(pub u16);

impl DetectorId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A physical detector wired to one ADC trigger line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorConfig {
    /// Trigger bitmask (single bit for simple detectors).
    pub trigger_mask: u16,
    /// Detector name, also used as the output dataset name.
    pub name: String,
    /// Number of energy channels.
    pub max_channels: u32,
}

impl DetectorConfig {
    pub fn new(name: impl Into<String>, trigger_mask: u16, max_channels: u32) -> Self {
        Self {
            trigger_mask,
            name: name.into(),
            max_channels,
        }
    }
}

/// A virtual detector defined as the sum of base detectors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComputedDetectorConfig {
    pub name: String,
    /// Component detector names, in summation order.
    pub components: Vec<String>,
}

impl ComputedDetectorConfig {
    pub fn new<I, S>(name: impl Into<String>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            components: components.into_iter().map(Into::into).collect(),
        }
    }
}

/// A computed detector resolved against the base detectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedDetector {
    pub name: String,
    pub components: Vec<DetectorId>,
    /// Channel depth, the largest depth among the components.
    pub max_channels: u32,
}

/// Validated, immutable detector layout.
///
/// Built once from configuration and shared read-only by every decode task.
/// Single-bit trigger masks resolve through a table indexed by bit position.
#[derive(Debug, Clone)]
pub struct DetectorTable {
    x_mask: u16,
    y_mask: u16,
    detectors: Vec<DetectorConfig>,
    computed: Vec<ComputedDetector>,
    by_bit: [Option<DetectorId>; 16],
}

impl DetectorTable {
    /// Builds and validates a detector table.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when masks are zero, duplicated or collide
    /// with an axis, when names are duplicated, when a detector has no
    /// channels, or when a computed detector references an unknown or empty
    /// component list.
    pub fn new(
        x_mask: u16,
        y_mask: u16,
        detectors: Vec<DetectorConfig>,
        computed: Vec<ComputedDetectorConfig>,
    ) -> Result<Self> {
        if x_mask == 0 || y_mask == 0 {
            return Err(Error::Config("axis trigger masks must be non-zero".into()));
        }
        if x_mask == y_mask {
            return Err(Error::Config(format!(
                "x and y axes share trigger mask {x_mask:#06x}"
            )));
        }
        if detectors.len() > usize::from(u16::MAX) {
            return Err(Error::Config("too many detectors".into()));
        }

        let mut names = HashSet::new();
        let mut masks = HashSet::new();
        let mut by_bit = [None; 16];

        for (index, detector) in detectors.iter().enumerate() {
            if detector.trigger_mask == 0 {
                return Err(Error::Config(format!(
                    "detector {} has a zero trigger mask",
                    detector.name
                )));
            }
            if detector.trigger_mask == x_mask || detector.trigger_mask == y_mask {
                return Err(Error::Config(format!(
                    "detector {} uses axis trigger mask {:#06x}",
                    detector.name, detector.trigger_mask
                )));
            }
            if detector.max_channels == 0 {
                return Err(Error::Config(format!(
                    "detector {} has no channels",
                    detector.name
                )));
            }
            if !names.insert(detector.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate detector name {}",
                    detector.name
                )));
            }
            if !masks.insert(detector.trigger_mask) {
                return Err(Error::Config(format!(
                    "duplicate trigger mask {:#06x} ({})",
                    detector.trigger_mask, detector.name
                )));
            }

            if detector.trigger_mask.is_power_of_two() {
                #[allow(clippy::cast_possible_truncation)]
                let id = DetectorId(index as u16);
                by_bit[detector.trigger_mask.trailing_zeros() as usize] = Some(id);
            } else {
                log::debug!(
                    "detector {} has composite mask {:#06x}, it never matches a single trigger",
                    detector.name,
                    detector.trigger_mask
                );
            }
        }

        let mut resolved = Vec::with_capacity(computed.len());
        for config in computed {
            if names.contains(config.name.as_str()) {
                return Err(Error::Config(format!(
                    "computed detector {} shadows a detector name",
                    config.name
                )));
            }
            if resolved
                .iter()
                .any(|c: &ComputedDetector| c.name == config.name)
            {
                return Err(Error::Config(format!(
                    "duplicate computed detector {}",
                    config.name
                )));
            }
            if config.components.is_empty() {
                return Err(Error::Config(format!(
                    "computed detector {} has no components",
                    config.name
                )));
            }

            let mut components = Vec::with_capacity(config.components.len());
            for component in &config.components {
                let position = detectors
                    .iter()
                    .position(|d| &d.name == component)
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "computed detector {} references unknown detector {component}",
                            config.name
                        ))
                    })?;
                #[allow(clippy::cast_possible_truncation)]
                let id = DetectorId(position as u16);
                components.push(id);
            }

            let max_channels = components
                .iter()
                .map(|id| detectors[id.index()].max_channels)
                .max()
                .unwrap_or(0);

            resolved.push(ComputedDetector {
                name: config.name,
                components,
                max_channels,
            });
        }

        Ok(Self {
            x_mask,
            y_mask,
            detectors,
            computed: resolved,
            by_bit,
        })
    }

    /// Trigger mask carrying the X scan coordinate.
    #[inline]
    #[must_use]
    pub fn x_mask(&self) -> u16 {
        self.x_mask
    }

    /// Trigger mask carrying the Y scan coordinate.
    #[inline]
    #[must_use]
    pub fn y_mask(&self) -> u16 {
        self.y_mask
    }

    /// Resolves a trigger mask to a base detector.
    #[inline]
    #[must_use]
    pub fn resolve(&self, trigger_mask: u16) -> Option<DetectorId> {
        if trigger_mask.is_power_of_two() {
            self.by_bit[trigger_mask.trailing_zeros() as usize]
        } else {
            None
        }
    }

    #[must_use]
    pub fn detector(&self, id: DetectorId) -> &DetectorConfig {
        &self.detectors[id.index()]
    }

    #[must_use]
    pub fn detectors(&self) -> &[DetectorConfig] {
        &self.detectors
    }

    #[must_use]
    pub fn computed(&self) -> &[ComputedDetector] {
        &self.computed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

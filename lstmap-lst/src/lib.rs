//! lstmap-lst: LST header reader, event decoder and detector configuration.
//!
//! This crate provides the format-specific half of the pipeline: the text
//! header that precedes the binary section, the word-level decoder for
//! list-mode events, and the JSON detector layout.
//!
//! # Key Components
//!
//! - [`read_header`] - Parses geometry and experiment settings up to `[LISTDATA]`
//! - [`EventDecoder`] - Lazy iterator over positioned events
//! - [`LstConfig`] - Axis masks, base detectors and computed detectors
//!
//! # Processing Pipeline
//!
//! 1. Read the header and keep the reader positioned on the first word.
//! 2. Decode events from a [`SliceWords`] (mapped file) or a
//!    [`ReaderWords`] (buffered stream).
//! 3. Feed every event into a [`lstmap_core::HistogramSet`].

pub mod decoder;
mod error;
pub mod header;

pub use decoder::{
    DecodeStats, EventDecoder, ReaderWords, SliceWords, WordSource, EVENT_TAG, MARKER_WORD,
};
pub use error::{Error, Result};
pub use header::{read_header, ExperimentInfo, LstHeader, SENTINEL};

use lstmap_core::{ComputedDetectorConfig, DetectorConfig, DetectorTable};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Detector layout for list-mode decoding.
///
/// Holds unvalidated configuration; [`LstConfig::to_table`] turns it into
/// the immutable [`DetectorTable`] used by the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LstConfig {
    /// Trigger mask carrying the X scan coordinate.
    pub x_mask: u16,
    /// Trigger mask carrying the Y scan coordinate.
    pub y_mask: u16,
    pub detectors: Vec<DetectorConfig>,
    pub computed: Vec<ComputedDetectorConfig>,
}

impl Default for LstConfig {
    fn default() -> Self {
        Self::aglae_defaults()
    }
}

// Intermediate structs for the JSON layout file
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonConfig {
    x: u32,
    y: u32,
    detectors: BTreeMap<String, JsonDetector>,
    #[serde(default)]
    computed_detectors: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonDetector {
    adc: u32,
    channels: u32,
}

impl LstConfig {
    /// Stock AGLAE layout.
    ///
    /// - X on trigger 256, Y on trigger 512
    /// - HE1..HE4, LE0 with 2048 channels, GAMMA and GAMMA_20 with 4096, RBS with 512
    /// - HE10 = HE1+HE2+HE3+HE4, HE11 = HE1+HE2, HE12 = HE3+HE4, HE13 = HE1+HE2+HE3
    #[must_use]
    pub fn aglae_defaults() -> Self {
        Self {
            x_mask: 256,
            y_mask: 512,
            detectors: vec![
                DetectorConfig::new("HE1", 1, 2048),
                DetectorConfig::new("HE2", 2, 2048),
                DetectorConfig::new("HE3", 4, 2048),
                DetectorConfig::new("HE4", 8, 2048),
                DetectorConfig::new("LE0", 16, 2048),
                DetectorConfig::new("GAMMA", 32, 4096),
                DetectorConfig::new("RBS", 64, 512),
                DetectorConfig::new("GAMMA_20", 1024, 4096),
            ],
            computed: vec![
                ComputedDetectorConfig::new("HE10", ["HE1", "HE2", "HE3", "HE4"]),
                ComputedDetectorConfig::new("HE11", ["HE1", "HE2"]),
                ComputedDetectorConfig::new("HE12", ["HE3", "HE4"]),
                ComputedDetectorConfig::new("HE13", ["HE1", "HE2", "HE3"]),
            ],
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// describes an invalid detector layout.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or describes an
    /// invalid detector layout.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let detectors = config
            .detectors
            .into_iter()
            .map(|(name, detector)| {
                let mask = mask_u16(&name, detector.adc)?;
                Ok(DetectorConfig::new(name, mask, detector.channels))
            })
            .collect::<Result<Vec<_>>>()?;

        let computed = config
            .computed_detectors
            .into_iter()
            .map(|(name, components)| ComputedDetectorConfig::new(name, components))
            .collect();

        let config = Self {
            x_mask: mask_u16("x", config.x)?,
            y_mask: mask_u16("y", config.y)?,
            detectors,
            computed,
        };

        // Validate once at load time, before any file is touched
        config.to_table()?;
        log::debug!(
            "loaded {} detectors and {} computed detectors",
            config.detectors.len(),
            config.computed.len()
        );

        Ok(config)
    }

    /// Builds the validated detector table.
    ///
    /// # Errors
    /// Returns a configuration error when masks collide, names repeat,
    /// channel counts are zero, or computed components are unknown.
    pub fn to_table(&self) -> Result<DetectorTable> {
        Ok(DetectorTable::new(
            self.x_mask,
            self.y_mask,
            self.detectors.clone(),
            self.computed.clone(),
        )?)
    }
}

fn mask_u16(name: &str, mask: u32) -> Result<u16> {
    u16::try_from(mask)
        .map_err(|_| Error::Config(format!("trigger mask {mask} of {name} exceeds 16 bits")))
}

//! lstmap-core: Core types for list-mode (LST) map processing.
//!
//! This crate provides the detector table, scan geometry, decoded event
//! type, histogram accumulation and computed-detector aggregation shared by
//! the format and I/O crates.
//!

pub mod computed;
pub mod detector;
pub mod error;
pub mod event;
pub mod geometry;
pub mod histogram;

pub use computed::{aggregate, ComputedHistogram};
pub use detector::{
    ComputedDetector, ComputedDetectorConfig, DetectorConfig, DetectorId, DetectorTable,
};
pub use error::{Error, Result};
pub use event::{ChannelHit, Event, MAX_ACTIVE_TRIGGERS};
pub use geometry::MapGeometry;
pub use histogram::{Histogram, HistogramSet};

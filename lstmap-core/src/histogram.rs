//! Per-detector occupancy histograms.
//!
//! Each detector owns a dense `(x, y, channel)` array of `u32` counts.
//! Arrays are allocated lazily on the first count a detector receives, so
//! detectors that stay silent for a whole file never cost memory and never
//! reach the output.

use crate::{DetectorTable, Event, MapGeometry};
use ndarray::Array3;
use std::sync::Arc;

/// A finished histogram, ready to be handed to an output sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    pub name: String,
    /// Counts indexed `[x, y, channel]`.
    pub counts: Array3<u32>,
}

impl Histogram {
    /// Total number of counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Channel depth.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.counts.dim().2
    }
}

/// Accumulates decoded events into per-detector histograms.
pub struct HistogramSet {
    table: Arc<DetectorTable>,
    geometry: MapGeometry,
    slots: Vec<Option<Array3<u32>>>,
    events: Vec<u64>,
}

impl HistogramSet {
    #[must_use]
    pub fn new(table: Arc<DetectorTable>, geometry: MapGeometry) -> Self {
        let detectors = table.len();
        Self {
            table,
            geometry,
            slots: vec![None; detectors],
            events: vec![0; detectors],
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &MapGeometry {
        &self.geometry
    }

    /// Adds one count per channel reading of `event`.
    ///
    /// Readings outside the histogram bounds are skipped; the decoder never
    /// produces them.
    pub fn apply(&mut self, event: &Event) {
        let x = usize::from(event.x);
        let y = usize::from(event.y);
        if x >= self.geometry.max_x() as usize || y >= self.geometry.max_y() as usize {
            return;
        }

        for hit in event.hits() {
            let index = hit.detector.index();
            let Some(detector) = self.table.detectors().get(index) else {
                continue;
            };
            if u32::from(hit.channel) >= detector.max_channels {
                continue;
            }

            let shape = self.geometry.histogram_shape(detector.max_channels);
            let counts = self.slots[index].get_or_insert_with(|| {
                log::debug!("allocating histogram {} with shape {:?}", detector.name, shape);
                Array3::zeros(shape)
            });
            counts[[x, y, usize::from(hit.channel)]] += 1;
            self.events[index] += 1;
        }
    }

    /// Number of counts recorded for each detector, in configuration order.
    #[must_use]
    pub fn event_counts(&self) -> Vec<(String, u64)> {
        self.table
            .detectors()
            .iter()
            .zip(&self.events)
            .map(|(detector, &count)| (detector.name.clone(), count))
            .collect()
    }

    /// Total number of counts across all detectors.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.events.iter().sum()
    }

    /// Finalizes the set, returning the non-empty histograms in
    /// configuration order.
    #[must_use]
    pub fn finish(self) -> Vec<Histogram> {
        self.table
            .detectors()
            .iter()
            .zip(self.slots)
            .filter_map(|(detector, slot)| {
                slot.map(|counts| Histogram {
                    name: detector.name.clone(),
                    counts,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DetectorConfig, DetectorId};

    fn table() -> Arc<DetectorTable> {
        Arc::new(
            DetectorTable::new(
                256,
                512,
                vec![
                    DetectorConfig::new("HE1", 1, 8),
                    DetectorConfig::new("HE2", 2, 4),
                    DetectorConfig::new("RBS", 64, 16),
                ],
                vec![],
            )
            .unwrap(),
        )
    }

    fn geometry() -> MapGeometry {
        MapGeometry::new(40, 30, 10, 10, 0).unwrap()
    }

    #[test]
    fn test_apply_increments_single_cell() {
        let mut set = HistogramSet::new(table(), geometry());
        let mut event = Event::new(1, 2);
        event.push(DetectorId(0), 5);
        set.apply(&event);
        set.apply(&event);

        assert_eq!(set.total_events(), 2);
        let histograms = set.finish();
        assert_eq!(histograms.len(), 1);
        assert_eq!(histograms[0].name, "HE1");
        assert_eq!(histograms[0].counts.dim(), (4, 3, 8));
        assert_eq!(histograms[0].counts[[1, 2, 5]], 2);
        assert_eq!(histograms[0].total(), 2);
    }

    #[test]
    fn test_silent_detectors_are_not_allocated() {
        let mut set = HistogramSet::new(table(), geometry());
        let mut event = Event::new(3, 1);
        event.push(DetectorId(2), 15);
        set.apply(&event);

        let counts = set.event_counts();
        assert_eq!(
            counts,
            vec![
                ("HE1".to_string(), 0),
                ("HE2".to_string(), 0),
                ("RBS".to_string(), 1)
            ]
        );

        let names: Vec<_> = set.finish().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["RBS"]);
    }

    #[test]
    fn test_out_of_bounds_readings_are_skipped() {
        let mut set = HistogramSet::new(table(), geometry());

        let mut event = Event::new(4, 0);
        event.push(DetectorId(0), 1);
        set.apply(&event);

        let mut event = Event::new(0, 0);
        event.push(DetectorId(1), 4);
        event.push(DetectorId(9), 0);
        set.apply(&event);

        assert_eq!(set.total_events(), 0);
        assert!(set.finish().is_empty());
    }

    #[test]
    fn test_multi_detector_event() {
        let mut set = HistogramSet::new(table(), geometry());
        let mut event = Event::new(2, 2);
        event.push(DetectorId(0), 0);
        event.push(DetectorId(1), 3);
        set.apply(&event);

        let histograms = set.finish();
        assert_eq!(histograms.len(), 2);
        assert_eq!(histograms[0].counts[[2, 2, 0]], 1);
        assert_eq!(histograms[1].counts[[2, 2, 3]], 1);
        assert_eq!(histograms[1].channels(), 4);
    }
}

//! Computed (virtual) detectors built as sums of base detector histograms.

use crate::{DetectorTable, Histogram, MapGeometry};
use ndarray::{s, Array3};

/// A computed detector histogram and the components that fed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedHistogram {
    pub histogram: Histogram,
    /// Names of the components that had data, in configuration order.
    pub sources: Vec<String>,
}

/// Derives every computed detector from the finished base histograms.
///
/// A component adds into the first `component.max_channels` channels of the
/// computed array. Components without a histogram contribute nothing and are
/// left out of `sources`; a computed detector with no sources at all is
/// omitted, matching the handling of silent base detectors. A component
/// whose x/y extent differs from `geometry` is skipped.
#[must_use]
pub fn aggregate(
    table: &DetectorTable,
    geometry: &MapGeometry,
    histograms: &[Histogram],
) -> Vec<ComputedHistogram> {
    let mut computed = Vec::with_capacity(table.computed().len());

    for detector in table.computed() {
        let mut counts: Option<Array3<u32>> = None;
        let mut sources = Vec::new();
        let shape = geometry.histogram_shape(detector.max_channels);

        for &component in &detector.components {
            let name = &table.detector(component).name;
            let Some(source) = histograms.iter().find(|h| &h.name == name) else {
                continue;
            };

            let (x, y, _) = source.counts.dim();
            if (x, y) != (shape.0, shape.1) {
                log::debug!(
                    "computed detector {}: skipping {} with map {}x{}, expected {}x{}",
                    detector.name,
                    name,
                    x,
                    y,
                    shape.0,
                    shape.1
                );
                continue;
            }

            let sum = counts.get_or_insert_with(|| Array3::zeros(shape));
            let depth = source.channels().min(sum.dim().2);
            let mut target = sum.slice_mut(s![.., .., ..depth]);
            target += &source.counts.slice(s![.., .., ..depth]);
            sources.push(name.clone());
        }

        match counts {
            Some(counts) => {
                log::debug!(
                    "computed detector {} shape {:?} from {:?}",
                    detector.name,
                    counts.dim(),
                    sources
                );
                computed.push(ComputedHistogram {
                    histogram: Histogram {
                        name: detector.name.clone(),
                        counts,
                    },
                    sources,
                });
            }
            None => log::debug!("computed detector {} has no data", detector.name),
        }
    }

    computed
}

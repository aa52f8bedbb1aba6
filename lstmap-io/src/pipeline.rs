//! File-to-histogram conversion, single file and parallel batches.

use crate::load::LoadConfig;
use crate::reader::LstFileReader;
use crate::sink::HistogramSink;
use crate::{Error, Result};
use lstmap_core::{aggregate, ComputedHistogram, DetectorTable, Histogram};
use lstmap_lst::DecodeStats;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Result of converting one LST file, handed to a sink by move.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub source: PathBuf,
    /// Geometry and experiment settings, flattened.
    pub attributes: BTreeMap<String, String>,
    /// Base detector histograms that received counts, in configuration order.
    pub histograms: Vec<Histogram>,
    /// Computed detectors with at least one contributing component.
    pub computed: Vec<ComputedHistogram>,
    /// Counts per base detector, in configuration order (silent ones included).
    pub event_counts: Vec<(String, u64)>,
    pub stats: DecodeStats,
}

impl ConversionOutput {
    /// File stem used to name outputs.
    #[must_use]
    pub fn stem(&self) -> String {
        output_stem(&self.source)
    }

    /// Looks up a base or computed histogram by name.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        self.histograms
            .iter()
            .chain(self.computed.iter().map(|c| &c.histogram))
            .find(|h| h.name == name)
    }

    /// Total counts over base detectors.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.event_counts.iter().map(|(_, count)| count).sum()
    }
}

/// Output name of an input file: its stem, or `output` when it has none.
#[must_use]
pub fn output_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned())
}

/// Per-file outcome of a batch conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSummary {
    pub total_events: u64,
    pub histograms: usize,
    pub computed: usize,
    pub stats: DecodeStats,
}

/// Outcome of one file in [`convert_files`].
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<FileSummary>,
}

/// Converts one LST file into base and computed histograms.
///
/// # Errors
/// Returns an error if the file is not a readable, non-empty `.lst` file,
/// if its header is malformed, or if the memory budget cannot be resolved.
pub fn convert_file<P: AsRef<Path>>(
    path: P,
    table: &Arc<DetectorTable>,
    load: &LoadConfig,
) -> Result<ConversionOutput> {
    let reader = LstFileReader::open(&path)?;
    let strategy = load.resolve(reader.file_size())?;
    let decoded = reader.decode(table, strategy)?;

    if decoded.stats.truncated {
        log::warn!(
            "{}: stream ends inside an event, last event dropped",
            reader.path().display()
        );
    }

    let event_counts = decoded.histograms.event_counts();
    let geometry = *decoded.histograms.geometry();
    let histograms = decoded.histograms.finish();
    let computed = aggregate(table, &geometry, &histograms);

    let output = ConversionOutput {
        source: reader.path().to_path_buf(),
        attributes: decoded.header.attributes(),
        histograms,
        computed,
        event_counts,
        stats: decoded.stats,
    };
    log::info!(
        "{}: {} events, {} histograms, {} computed ({} unpositioned, {} dropped fields)",
        reader.path().display(),
        output.total_events(),
        output.histograms.len(),
        output.computed.len(),
        output.stats.unpositioned,
        output.stats.dropped_fields
    );
    Ok(output)
}

/// Converts many files in parallel, writing each result to `sink`.
///
/// Files share only the detector table. A file that fails is reported in
/// its [`FileReport`] and the batch carries on. Reports keep input order.
///
/// Output names must be unique within a batch: a file whose stem was
/// already taken by an earlier input is rejected without being converted.
pub fn convert_files<P, S>(
    paths: &[P],
    table: &Arc<DetectorTable>,
    load: &LoadConfig,
    sink: &mut S,
) -> Vec<FileReport>
where
    P: AsRef<Path> + Sync,
    S: HistogramSink + Send,
{
    let owners = stem_owners(paths);
    let sink = Mutex::new(sink);

    paths
        .par_iter()
        .zip(&owners)
        .map(|(path, owner)| {
            let path = path.as_ref();
            let result = match owner {
                Some(owner) => Err(Error::InvalidFormat(format!(
                    "{} maps to output name {} already used by {}",
                    path.display(),
                    output_stem(path),
                    owner.display()
                ))),
                None => convert_file(path, table, load),
            };
            let result = result.and_then(|output| {
                let summary = FileSummary {
                    total_events: output.total_events(),
                    histograms: output.histograms.len(),
                    computed: output.computed.len(),
                    stats: output.stats,
                };
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                sink.write(output)?;
                Ok(summary)
            });

            if let Err(err) = &result {
                log::warn!("skipping {}: {err}", path.display());
            }
            FileReport {
                path: path.to_path_buf(),
                result,
            }
        })
        .collect()
}

/// For each input, the earlier input already holding its output stem.
fn stem_owners<P: AsRef<Path>>(paths: &[P]) -> Vec<Option<&Path>> {
    let mut claimed: HashMap<String, &Path> = HashMap::with_capacity(paths.len());
    paths
        .iter()
        .map(|path| match claimed.entry(output_stem(path.as_ref())) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(path.as_ref());
                None
            }
        })
        .collect()
}

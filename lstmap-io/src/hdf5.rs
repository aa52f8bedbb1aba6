//! HDF5 histogram output.
//!
//! One file per converted input, `<dir>/<stem>.hdf5`:
//!
//! - file attribute `lstmap_format_version`
//! - group `data` carrying the header attributes as strings
//! - one `u32` dataset `(x, y, channel)` per base and computed detector;
//!   base datasets carry an `events` count, computed ones a `sources` list

use crate::pipeline::ConversionOutput;
use crate::sink::HistogramSink;
use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use lstmap_core::Histogram;
use ndarray::{Array3, ArrayView1, Ix3};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Version written to the `lstmap_format_version` file attribute.
pub const FORMAT_VERSION: &str = "0.1";
const DATA_GROUP: &str = "data";

/// Histogram write configuration.
#[derive(Clone, Debug)]
pub struct HistogramWriteOptions {
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for HistogramWriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(4),
            shuffle: false,
        }
    }
}

/// Sink writing one HDF5 file per conversion into a directory.
pub struct Hdf5Sink {
    dir: PathBuf,
    options: HistogramWriteOptions,
    written: Vec<PathBuf>,
}

impl Hdf5Sink {
    /// Create a sink writing into `dir`, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn create<P: AsRef<Path>>(dir: P, options: HistogramWriteOptions) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            options,
            written: Vec::new(),
        })
    }

    /// Output path for a given input stem.
    #[must_use]
    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.hdf5"))
    }

    /// Files written so far, in write order.
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl HistogramSink for Hdf5Sink {
    fn write(&mut self, output: ConversionOutput) -> Result<()> {
        let path = self.output_path(&output.stem());
        if self.written.contains(&path) {
            return Err(Error::InvalidFormat(format!(
                "{} would overwrite {} written earlier",
                output.source.display(),
                path.display()
            )));
        }
        write_histograms_hdf5(&path, &output, &self.options)?;
        log::debug!("wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

/// A dataset read back from an output file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredHistogram {
    pub name: String,
    pub counts: Array3<u32>,
    /// Base detector event count.
    pub events: Option<u64>,
    /// Components of a computed detector.
    pub sources: Option<Vec<String>>,
}

/// Contents of an output file.
#[derive(Clone, Debug)]
pub struct StoredHistograms {
    pub format_version: String,
    pub attributes: BTreeMap<String, String>,
    pub histograms: Vec<StoredHistogram>,
}

impl StoredHistograms {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StoredHistogram> {
        self.histograms.iter().find(|h| h.name == name)
    }
}

/// Writes one conversion to an HDF5 file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_histograms_hdf5<P: AsRef<Path>>(
    path: P,
    output: &ConversionOutput,
    options: &HistogramWriteOptions,
) -> Result<()> {
    let file = File::create(path)?;
    set_attr_str_file(&file, "lstmap_format_version", FORMAT_VERSION)?;

    let data = file.create_group(DATA_GROUP)?;
    for (key, value) in &output.attributes {
        set_attr_str_group(&data, key, value)?;
    }

    let counts: BTreeMap<&str, u64> = output
        .event_counts
        .iter()
        .map(|(name, count)| (name.as_str(), *count))
        .collect();

    for histogram in &output.histograms {
        let dataset = write_counts(&data, histogram, options)?;
        let events = counts.get(histogram.name.as_str()).copied().unwrap_or(0);
        dataset
            .new_attr::<u64>()
            .create("events")?
            .write_scalar(&events)?;
    }

    for computed in &output.computed {
        let dataset = write_counts(&data, &computed.histogram, options)?;
        let sources: Vec<&str> = computed.sources.iter().map(String::as_str).collect();
        set_attr_str_list(&dataset, "sources", &sources)?;
    }

    Ok(())
}

/// Reads an output file back.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or a dataset is not 3-D.
pub fn read_histograms_hdf5<P: AsRef<Path>>(path: P) -> Result<StoredHistograms> {
    let file = File::open(path)?;
    let format_version = read_attr_string(&file, "lstmap_format_version")?;
    let data = file.group(DATA_GROUP)?;

    let mut attributes = BTreeMap::new();
    for name in data.attr_names()? {
        let value = read_attr_string(&data, &name)?;
        attributes.insert(name, value);
    }

    let mut histograms = Vec::new();
    for name in data.member_names()? {
        let dataset = data.dataset(&name)?;
        if dataset.ndim() != 3 {
            return Err(Error::InvalidFormat(format!(
                "dataset {name} must be 3-D (x, y, channel)"
            )));
        }
        let counts = dataset.read::<u32, Ix3>()?;
        let events = read_attr_opt::<u64>(&dataset, "events")?;
        let sources = match dataset.attr("sources") {
            Ok(attr) => Some(
                attr.read_raw::<VarLenUnicode>()?
                    .into_iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            Err(_) => None,
        };
        histograms.push(StoredHistogram {
            name,
            counts,
            events,
            sources,
        });
    }

    Ok(StoredHistograms {
        format_version,
        attributes,
        histograms,
    })
}

fn write_counts(
    group: &Group,
    histogram: &Histogram,
    options: &HistogramWriteOptions,
) -> Result<Dataset> {
    let (x, y, channels) = histogram.counts.dim();
    let dataset = create_fixed_dataset::<u32>(
        group,
        &histogram.name,
        [x, y, channels],
        options.compression,
        options.shuffle,
    )?;
    dataset.write(histogram.counts.view())?;
    log::debug!("dataset {} shape {:?}", histogram.name, (x, y, channels));
    Ok(dataset)
}

fn create_fixed_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    shape: [usize; 3],
    compression: Option<u8>,
    shuffle: bool,
) -> Result<Dataset> {
    let mut builder = group.new_dataset::<T>().shape(shape);

    if compression.is_some() || shuffle {
        // One x column per chunk
        builder = builder.chunk([1, shape[1], shape[2]]);
    }

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_group(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_list(dataset: &Dataset, name: &str, values: &[&str]) -> Result<()> {
    let values: Vec<VarLenUnicode> = values
        .iter()
        .map(|value| to_var_len_unicode(value))
        .collect::<Result<Vec<_>>>()?;
    let attr = dataset
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?;
    attr.write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}

fn read_attr_string(location: &hdf5::Location, name: &str) -> Result<String> {
    let value: VarLenUnicode = location.attr(name)?.read_scalar()?;
    Ok(value.to_string())
}

fn read_attr_opt<T: H5Type + Clone>(dataset: &Dataset, name: &str) -> Result<Option<T>> {
    match dataset.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

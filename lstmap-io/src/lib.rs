//! lstmap-io: File access and batch conversion for lstmap.
//!
//! This crate opens LST files (memory-mapped or streamed), drives the
//! decoder into histograms, derives computed detectors and hands the result
//! to an output sink. Batches of files are converted in parallel.
//!

mod discover;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod load;
pub mod pipeline;
mod reader;
pub mod sink;

pub use discover::{discover_lst_files, expand_inputs};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use self::hdf5::{
    read_histograms_hdf5, Hdf5Sink, HistogramWriteOptions, StoredHistogram, StoredHistograms,
};
pub use load::{LoadConfig, LoadStrategy};
pub use pipeline::{
    convert_file, convert_files, output_stem, ConversionOutput, FileReport, FileSummary,
};
pub use reader::{DecodedFile, LstFileReader, MappedFileReader};
pub use sink::{HistogramSink, MemorySink};

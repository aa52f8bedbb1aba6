//! LST file readers.
//!

use crate::load::LoadStrategy;
use crate::{Error, Result};
use lstmap_core::{DetectorTable, HistogramSet};
use lstmap_lst::{read_header, DecodeStats, EventDecoder, LstHeader, ReaderWords, WordSource};
use memmap2::Mmap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STREAM_BUFFER_BYTES: usize = 1 << 20;

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            Error::MmapError(format!("{}: {e}", path.as_ref().display()))
        })?;
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Everything decoded from one file, before computed detectors are derived.
pub struct DecodedFile {
    pub header: LstHeader,
    pub histograms: HistogramSet,
    pub stats: DecodeStats,
}

/// An LST file validated for decoding.
pub struct LstFileReader {
    path: PathBuf,
    size: u64,
}

impl LstFileReader {
    /// Opens an LST file.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the path does not carry the `lst`
    /// extension, does not exist or is empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let has_lst_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("lst"));
        if !has_lst_extension {
            return Err(Error::InvalidFormat(format!(
                "{} is not an .lst file",
                path.display()
            )));
        }

        let metadata = std::fs::metadata(path).map_err(|e| {
            Error::InvalidFormat(format!("{} cannot be read: {e}", path.display()))
        })?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(Error::InvalidFormat(format!(
                "{} is empty or not a regular file",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.size
    }

    /// Reads only the text header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the header is malformed.
    pub fn read_header(&self) -> Result<LstHeader> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        Ok(read_header(&mut reader)?)
    }

    /// Decodes the whole file into per-detector histograms.
    ///
    /// `strategy` must be [`LoadStrategy::Mapped`] or [`LoadStrategy::Streamed`];
    /// `Auto` falls back to streaming.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the header is malformed.
    pub fn decode(&self, table: &Arc<DetectorTable>, strategy: LoadStrategy) -> Result<DecodedFile> {
        log::debug!("decoding {} ({:?})", self.path.display(), strategy);
        match strategy {
            LoadStrategy::Mapped => self.decode_mapped(table),
            LoadStrategy::Auto | LoadStrategy::Streamed => self.decode_streamed(table),
        }
    }

    fn decode_mapped(&self, table: &Arc<DetectorTable>) -> Result<DecodedFile> {
        let reader = MappedFileReader::open(&self.path)?;
        let mut bytes = reader.as_bytes();
        let header = read_header(&mut bytes)?;

        let decoder = EventDecoder::from_slice(bytes, table, &header.geometry);
        let (_, stats, histograms) = accumulate(decoder, table, &header);
        Ok(DecodedFile {
            header,
            histograms,
            stats,
        })
    }

    fn decode_streamed(&self, table: &Arc<DetectorTable>) -> Result<DecodedFile> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::with_capacity(STREAM_BUFFER_BYTES, file);
        let header = read_header(&mut reader)?;

        let decoder = EventDecoder::new(ReaderWords::new(reader), table, &header.geometry);
        let (mut source, stats, histograms) = accumulate(decoder, table, &header);
        if let Some(err) = source.take_error() {
            return Err(Error::Io(err));
        }
        Ok(DecodedFile {
            header,
            histograms,
            stats,
        })
    }
}

fn accumulate<S: WordSource>(
    mut decoder: EventDecoder<'_, S>,
    table: &Arc<DetectorTable>,
    header: &LstHeader,
) -> (S, DecodeStats, HistogramSet) {
    let mut histograms = HistogramSet::new(Arc::clone(table), header.geometry);
    for event in decoder.by_ref() {
        histograms.apply(&event);
    }
    let (source, stats) = decoder.into_parts();
    (source, stats, histograms)
}

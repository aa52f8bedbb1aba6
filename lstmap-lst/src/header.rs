//! Textual LST header.
//!
//! The header is a sequence of UTF-8 lines terminated by the `[LISTDATA]`
//! sentinel; binary event words start right after the sentinel line.

use crate::{Error, Result};
use lstmap_core::MapGeometry;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Line separating the text header from the binary event words.
pub const SENTINEL: &str = "[LISTDATA]";

const MAP_SIZE_KEY: &str = "Map size";
const EXP_INFO_KEY: &str = "Exp.Info";

/// Experiment settings from the `Exp.Info` header line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExperimentInfo {
    pub particle: String,
    pub beam_energy: String,
    pub le0_filter: String,
    pub he1_filter: String,
    pub he2_filter: String,
    pub he3_filter: String,
    pub he4_filter: String,
}

impl ExperimentInfo {
    fn parse(line: &str) -> Result<Self> {
        let fields = fields_after_colon(line, EXP_INFO_KEY)?;
        let [particle, beam_energy, le0, he1, he2, he3, he4] =
            <[&str; 7]>::try_from(fields.as_slice()).map_err(|_| {
                Error::Format(format!(
                    "{EXP_INFO_KEY} expects 7 fields, found {}",
                    fields.len()
                ))
            })?;

        Ok(Self {
            particle: particle.to_string(),
            beam_energy: beam_energy.to_string(),
            le0_filter: le0.to_string(),
            he1_filter: he1.to_string(),
            he2_filter: he2.to_string(),
            he3_filter: he3.to_string(),
            he4_filter: he4.to_string(),
        })
    }

    /// Flat key/value view used for output attributes.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        vec![
            ("particle", self.particle.clone()),
            ("beam_energy", self.beam_energy.clone()),
            ("le0_filter", self.le0_filter.clone()),
            ("he1_filter", self.he1_filter.clone()),
            ("he2_filter", self.he2_filter.clone()),
            ("he3_filter", self.he3_filter.clone()),
            ("he4_filter", self.he4_filter.clone()),
        ]
    }
}

/// Parsed header of an LST file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LstHeader {
    pub geometry: MapGeometry,
    pub experiment: Option<ExperimentInfo>,
    /// Byte offset of the first event word (just past the sentinel line).
    pub data_offset: u64,
}

impl LstHeader {
    /// Geometry and experiment settings as one flat attribute map.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attributes: BTreeMap<String, String> = self
            .geometry
            .attributes()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        if let Some(experiment) = &self.experiment {
            attributes.extend(
                experiment
                    .attributes()
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value)),
            );
        }
        attributes
    }
}

/// Reads the header from the start of an LST stream.
///
/// On success the reader is positioned on the first event word.
///
/// # Errors
/// Returns [`Error::Format`] if the sentinel is missing, if the `Map size`
/// line is missing or malformed, or if an `Exp.Info` line is malformed.
/// Zero pixel dimensions surface as a core format error.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<LstHeader> {
    let mut geometry = None;
    let mut experiment = None;
    let mut offset: u64 = 0;
    let mut buffer = Vec::with_capacity(256);

    loop {
        buffer.clear();
        let bytes_read = reader.read_until(b'\n', &mut buffer)?;
        if bytes_read == 0 {
            return Err(Error::Format(format!("{SENTINEL} sentinel not found")));
        }
        offset += bytes_read as u64;

        let line = String::from_utf8_lossy(&buffer);
        let content = line.trim();

        if content == SENTINEL {
            break;
        } else if content.contains(MAP_SIZE_KEY) {
            geometry = Some(parse_map_size(content)?);
        } else if content.contains(EXP_INFO_KEY) {
            experiment = Some(ExperimentInfo::parse(content)?);
        }
    }

    let geometry =
        geometry.ok_or_else(|| Error::Format(format!("{MAP_SIZE_KEY} line not found")))?;
    log::debug!(
        "map {}x{} with {}x{} pixels -> {}x{} grid, data at byte {offset}",
        geometry.map_width,
        geometry.map_height,
        geometry.pixel_width,
        geometry.pixel_height,
        geometry.max_x(),
        geometry.max_y()
    );

    Ok(LstHeader {
        geometry,
        experiment,
        data_offset: offset,
    })
}

fn parse_map_size(line: &str) -> Result<MapGeometry> {
    let fields = fields_after_colon(line, MAP_SIZE_KEY)?;
    if fields.len() != 5 {
        return Err(Error::Format(format!(
            "{MAP_SIZE_KEY} expects 5 fields, found {}",
            fields.len()
        )));
    }

    let mut values = [0u32; 5];
    for (value, field) in values.iter_mut().zip(&fields) {
        *value = field.parse().map_err(|_| {
            Error::Format(format!("{MAP_SIZE_KEY} field {field:?} is not an integer"))
        })?;
    }

    let [width, height, pixel_width, pixel_height, pen_size] = values;
    Ok(MapGeometry::new(
        width,
        height,
        pixel_width,
        pixel_height,
        pen_size,
    )?)
}

fn fields_after_colon<'a>(line: &'a str, key: &str) -> Result<Vec<&'a str>> {
    let (_, rest) = line
        .split_once(':')
        .ok_or_else(|| Error::Format(format!("{key} line has no ':' separator")))?;
    Ok(rest.split(',').map(str::trim).collect())
}

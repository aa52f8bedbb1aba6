//! Input discovery: expands directories into the `.lst` files below them.

use crate::Result;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};

const LST_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Finds every `.lst` file under `dir`, at any depth, sorted by path.
///
/// The extension matches case-insensitively. Directories whose name ends
/// in `.lst` are not returned.
///
/// # Errors
/// Propagates [`glob`] errors, e.g. an unreadable subdirectory.
pub fn discover_lst_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let root = Pattern::escape(&dir.as_ref().to_string_lossy());
    let pattern = format!("{root}/**/*.lst");

    let mut files = Vec::new();
    for entry in glob::glob_with(&pattern, LST_OPTIONS)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    log::debug!("{}: found {} LST file(s)", dir.as_ref().display(), files.len());
    Ok(files)
}

/// Replaces each directory in `inputs` by [`discover_lst_files`] on it.
///
/// Other inputs pass through unchanged so that missing or misnamed files
/// are still reported per file by the conversion. Input order is kept.
///
/// # Errors
/// Propagates [`discover_lst_files`] errors.
pub fn expand_inputs<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(inputs.len());
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            paths.extend(discover_lst_files(input)?);
        } else {
            paths.push(input.to_path_buf());
        }
    }
    Ok(paths)
}

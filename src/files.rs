//! Media file renaming.
//!
//! Image folders usually arrive with arbitrary file names while the default
//! file name template expects `<record>.png`. `rename_files` renumbers every
//! file of one extension in name order.

use crate::models::{ConfigError, GiftdropError, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rename every file in `dir` ending in `ext` (case-insensitive) to
/// `<start_index + n>.<ext>`, in file name order.
///
/// Files are first moved to temporary names so an existing `3.png` is never
/// overwritten by the file that should become `3.png`. Returns the
/// `(old, new)` pairs.
pub fn rename_files(dir: &Path, ext: &str, start_index: usize) -> Result<Vec<(PathBuf, PathBuf)>> {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        return Err(ConfigError::Invalid {
            field: "ext".to_string(),
            reason: "extension must not be empty".to_string(),
        }
        .into());
    }
    if !dir.is_dir() {
        return Err(GiftdropError::Validation(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(ext)
    );
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let mut files: Vec<PathBuf> = glob::glob_with(&pattern, options)
        .map_err(|e| GiftdropError::Internal(format!("Invalid glob pattern: {e}")))?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.is_empty() {
        info!(dir = %dir.display(), ext, "No files to rename");
        return Ok(Vec::new());
    }

    let mut staged = Vec::with_capacity(files.len());
    for (n, path) in files.iter().enumerate() {
        let temp = dir.join(format!(".giftdrop-rename-{n}.tmp"));
        fs::rename(path, &temp)
            .map_err(|e| GiftdropError::io(format!("moving {} aside", path.display()), e))?;
        staged.push(temp);
    }

    let mut renamed = Vec::with_capacity(files.len());
    for (n, (original, temp)) in files.into_iter().zip(staged).enumerate() {
        let target = dir.join(format!("{}.{ext}", start_index + n));
        fs::rename(&temp, &target)
            .map_err(|e| GiftdropError::io(format!("renaming to {}", target.display()), e))?;
        debug!(from = %original.display(), to = %target.display(), "Renamed");
        renamed.push((original, target));
    }

    info!(dir = %dir.display(), count = renamed.len(), "Files renamed");
    Ok(renamed)
}

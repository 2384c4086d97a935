//! Durable header+rows storage.
//!
//! Tables are stored as CSV. Writes go to a temporary file in the target
//! directory which is fsynced and then renamed over the checkpoint, so a
//! crash mid-write leaves either the old or the new file, never a torn one.

use crate::models::{GiftdropError, Result};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const CLASS_FILE: &str = "class.csv";
const BATCH_FILE: &str = "batch.csv";
const DATA_FILE: &str = "data.csv";

/// Header and rows as read from or written to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Load a table. Returns `None` when no file exists at `path`.
///
/// Rows shorter than the header are padded with empty values; longer rows
/// are rejected.
pub fn load(path: &Path) -> Result<Option<TableData>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(GiftdropError::io(
                format!("opening {}", path.display()),
                e,
            ))
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(record) => record
            .map_err(|e| GiftdropError::csv(format!("reading header of {}", path.display()), e))?
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if i == 0 {
                    field.trim_start_matches('\u{feff}').to_string()
                } else {
                    field.to_string()
                }
            })
            .collect(),
        None => {
            return Err(GiftdropError::StateConsistency(format!(
                "{} has no header row",
                path.display()
            )))
        }
    };

    let mut rows = Vec::new();
    for (line, record) in records.enumerate() {
        let record = record
            .map_err(|e| GiftdropError::csv(format!("reading {}", path.display()), e))?;
        if record.len() > header.len() {
            return Err(GiftdropError::StateConsistency(format!(
                "{} row {} has {} fields but the header has {}",
                path.display(),
                line + 1,
                record.len(),
                header.len()
            )));
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(header.len(), String::new());
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "Loaded table");
    Ok(Some(TableData { header, rows }))
}

/// Save a table, replacing any previous content atomically.
pub fn save(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|e| GiftdropError::io(format!("creating {}", dir.display()), e))?;

    // Removed automatically if anything below fails.
    let mut temp = NamedTempFile::new_in(&dir)
        .map_err(|e| GiftdropError::io("creating temp checkpoint", e))?;

    {
        let mut writer = csv::WriterBuilder::new().from_writer(temp.as_file_mut());
        writer
            .write_record(header)
            .map_err(|e| GiftdropError::csv("writing checkpoint header", e))?;
        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| GiftdropError::csv("writing checkpoint row", e))?;
        }
        writer
            .flush()
            .map_err(|e| GiftdropError::io("flushing checkpoint", e))?;
    }
    temp.as_file_mut()
        .flush()
        .map_err(|e| GiftdropError::io("flushing checkpoint", e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| GiftdropError::io("syncing checkpoint", e))?;

    temp.persist(path).map_err(|e| {
        GiftdropError::io(format!("renaming checkpoint to {}", path.display()), e.error)
    })?;

    debug!(path = %path.display(), rows = rows.len(), "Checkpoint saved");
    Ok(())
}

/// Delete a checkpoint file. Returns whether one existed.
pub fn remove(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(GiftdropError::io(
            format!("removing {}", path.display()),
            e,
        )),
    }
}

/// Layout of the checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Class record path.
    pub fn class_path(&self) -> PathBuf {
        self.dir.join(CLASS_FILE)
    }

    /// Batch progress record path.
    pub fn batch_path(&self) -> PathBuf {
        self.dir.join(BATCH_FILE)
    }

    /// Mirrored data table path.
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    /// Whether any checkpoint file exists.
    pub fn exists(&self) -> bool {
        [self.class_path(), self.batch_path(), self.data_path()]
            .iter()
            .any(|p| p.exists())
    }

    /// Delete every checkpoint file, and the directory when left empty.
    pub fn clear(&self) -> Result<()> {
        for path in [self.class_path(), self.batch_path(), self.data_path()] {
            if remove(&path)? {
                debug!(path = %path.display(), "Removed checkpoint");
            }
        }
        // Only succeeds when nothing else lives in the directory.
        let _ = fs::remove_dir(&self.dir);
        Ok(())
    }
}

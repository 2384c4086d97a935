//! Column-oriented projection over the beneficiary table.

use super::store::{self, TableData};
use crate::models::{GiftdropError, Result};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Appended column titles.
pub mod columns {
    pub const SECRET: &str = "secret";
    pub const ADDRESS: &str = "address";
    pub const IMAGE_CID: &str = "imageCid";
    pub const METADATA_CID: &str = "metadataCid";
    pub const INSTANCE_ID: &str = "instanceId";
}

/// One column of the table, values aligned with the rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub title: String,
    pub values: Vec<String>,
}

impl Column {
    pub fn new(title: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            title: title.into(),
            values,
        }
    }
}

/// The beneficiary table with its fixed record range.
#[derive(Debug, Clone)]
pub struct DataTable {
    path: PathBuf,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    start: usize,
    end: usize,
}

impl DataTable {
    /// Build a table checkpointed at `path`, restricted to `count` records
    /// from `offset` (all remaining when `count` is `None`).
    pub fn new(
        path: impl Into<PathBuf>,
        data: TableData,
        offset: usize,
        count: Option<usize>,
    ) -> Result<Self> {
        let TableData { header, mut rows } = data;
        for row in &mut rows {
            if row.len() > header.len() {
                return Err(GiftdropError::StateConsistency(format!(
                    "row has {} fields but the header has {}",
                    row.len(),
                    header.len()
                )));
            }
            row.resize(header.len(), String::new());
        }

        if offset > rows.len() {
            return Err(crate::models::ConfigError::OffsetOutOfRange {
                offset,
                rows: rows.len(),
            }
            .into());
        }
        let end = match count {
            Some(count) => offset.saturating_add(count).min(rows.len()),
            None => rows.len(),
        };

        Ok(Self {
            path: path.into(),
            header,
            rows,
            start: offset,
            end,
        })
    }

    /// Load the checkpoint at `path`, falling back to `source` when none
    /// exists yet. Returns the table and whether it came from the checkpoint.
    pub fn load_or_init(
        path: &Path,
        source: &Path,
        offset: usize,
        count: Option<usize>,
    ) -> Result<(Self, bool)> {
        if let Some(data) = store::load(path)? {
            debug!(path = %path.display(), "Resuming data table from checkpoint");
            return Ok((Self::new(path, data, offset, count)?, true));
        }

        let data = store::load(source)?.ok_or_else(|| {
            GiftdropError::Config(crate::models::ConfigError::Invalid {
                field: "instance.data.csvFile".to_string(),
                reason: format!("{} does not exist", source.display()),
            })
        })?;
        Ok((Self::new(path, data, offset, count)?, false))
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First record in range.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last record in range.
    pub fn end(&self) -> usize {
        self.end
    }

    /// `[start, end)`.
    pub fn record_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Records in range.
    pub fn record_count(&self) -> usize {
        self.end - self.start
    }

    /// Position of `title` in the header.
    pub fn column_index(&self, title: &str) -> Option<usize> {
        self.header.iter().position(|h| h == title)
    }

    /// Project columns by title. Unknown titles yield `None` in place.
    pub fn get_columns(&self, titles: &[&str]) -> Vec<Option<Column>> {
        titles
            .iter()
            .map(|title| {
                self.column_index(title).map(|index| Column {
                    title: title.to_string(),
                    values: self.rows.iter().map(|row| row[index].clone()).collect(),
                })
            })
            .collect()
    }

    /// Overwrite (or append) columns. Either every column is applied or,
    /// on a length mismatch, none is.
    pub fn set_columns(&mut self, columns: Vec<Column>) -> Result<()> {
        if let Some(bad) = columns.iter().find(|c| c.values.len() != self.rows.len()) {
            return Err(GiftdropError::ColumnLengthMismatch {
                title: bad.title.clone(),
                expected: self.rows.len(),
                actual: bad.values.len(),
            });
        }

        for column in columns {
            let index = self.ensure_column(&column.title);
            for (row, value) in self.rows.iter_mut().zip(column.values) {
                row[index] = value;
            }
        }
        Ok(())
    }

    /// Value at `row` for `title`; `None` when the column is missing or the
    /// value is empty.
    pub fn value(&self, row: usize, title: &str) -> Option<&str> {
        let index = self.column_index(title)?;
        self.rows
            .get(row)
            .map(|r| r[index].as_str())
            .filter(|v| !v.is_empty())
    }

    /// Write a single value, appending the column if needed.
    pub fn set_value(&mut self, row: usize, title: &str, value: impl Into<String>) -> Result<()> {
        if row >= self.rows.len() {
            return Err(GiftdropError::StateConsistency(format!(
                "row {row} is out of range (table has {} rows)",
                self.rows.len()
            )));
        }
        let index = self.ensure_column(title);
        self.rows[row][index] = value.into();
        Ok(())
    }

    /// Require `title` to be present at `row`.
    pub fn require(&self, row: usize, title: &str) -> Result<&str> {
        self.value(row, title).ok_or_else(|| {
            GiftdropError::StateConsistency(format!("'{title}' is missing for record {row}"))
        })
    }

    /// Require `titles` at the first and last record of the range.
    pub fn require_at_range_bounds(&self, titles: &[&str]) -> Result<()> {
        if self.start == self.end {
            return Ok(());
        }
        for row in [self.start, self.end - 1] {
            for title in titles {
                self.require(row, title)?;
            }
        }
        Ok(())
    }

    /// Title → value map for one row, used by templates.
    pub fn row_fields(&self, row: usize) -> HashMap<&str, &str> {
        match self.rows.get(row) {
            Some(values) => self
                .header
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(String::as_str))
                .collect(),
            None => HashMap::new(),
        }
    }

    /// Persist to the checkpoint path.
    pub fn checkpoint(&self) -> Result<()> {
        store::save(&self.path, &self.header, &self.rows)
    }

    /// Write the full table somewhere else (final output).
    pub fn write_to(&self, path: &Path) -> Result<()> {
        store::save(path, &self.header, &self.rows)
    }

    fn ensure_column(&mut self, title: &str) -> usize {
        if let Some(index) = self.column_index(title) {
            return index;
        }
        self.header.push(title.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.header.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(rows: usize) -> DataTable {
        let data = TableData {
            header: vec!["name".to_string(), "email".to_string()],
            rows: (0..rows)
                .map(|i| vec![format!("user{i}"), format!("user{i}@example.com")])
                .collect(),
        };
        DataTable::new("unused.csv", data, 0, None).unwrap()
    }

    #[test]
    fn test_get_columns_unknown_title_is_none() {
        let table = table(3);
        let columns = table.get_columns(&["email", "missing", "name"]);

        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].as_ref().unwrap().values[2], "user2@example.com");
        assert!(columns[1].is_none());
        assert_eq!(columns[2].as_ref().unwrap().title, "name");
    }

    #[test]
    fn test_set_columns_appends_new_column() {
        let mut table = table(2);
        table
            .set_columns(vec![
                Column::new("name", vec!["a".into(), "b".into()]),
                Column::new("address", vec!["0x1".into(), "0x2".into()]),
            ])
            .unwrap();

        assert_eq!(table.header(), &["name", "email", "address"]);
        assert_eq!(table.column_index("address"), Some(2));
        assert_eq!(table.value(1, "name"), Some("b"));
        assert_eq!(table.value(0, "address"), Some("0x1"));
    }

    #[test]
    fn test_set_columns_length_mismatch_leaves_table_unchanged() {
        let mut table = table(3);
        let before = table.get_columns(&["name", "email"]);

        let err = table
            .set_columns(vec![
                Column::new("name", vec!["x".into(), "y".into(), "z".into()]),
                Column::new("address", vec!["0x1".into()]),
            ])
            .unwrap_err();

        assert!(matches!(
            err,
            GiftdropError::ColumnLengthMismatch {
                expected: 3,
                actual: 1,
                ..
            }
        ));
        assert_eq!(table.header(), &["name", "email"]);
        assert_eq!(table.get_columns(&["name", "email"]), before);
    }

    #[test]
    fn test_record_range_from_offset_and_count() {
        let data = TableData {
            header: vec!["name".to_string()],
            rows: (0..10).map(|i| vec![i.to_string()]).collect(),
        };
        let t = DataTable::new("x.csv", data.clone(), 2, Some(5)).unwrap();
        assert_eq!(t.record_range(), 2..7);

        let t = DataTable::new("x.csv", data.clone(), 8, Some(5)).unwrap();
        assert_eq!(t.record_range(), 8..10);

        let t = DataTable::new("x.csv", data.clone(), 10, None).unwrap();
        assert_eq!(t.record_count(), 0);

        assert!(matches!(
            DataTable::new("x.csv", data, 11, None),
            Err(GiftdropError::Config(_))
        ));
    }

    #[test]
    fn test_require_at_range_bounds() {
        let mut table = table(4);
        assert!(matches!(
            table.require_at_range_bounds(&[columns::ADDRESS]),
            Err(GiftdropError::StateConsistency(_))
        ));

        table.set_value(0, columns::ADDRESS, "0xa").unwrap();
        assert!(table.require_at_range_bounds(&[columns::ADDRESS]).is_err());

        table.set_value(3, columns::ADDRESS, "0xd").unwrap();
        table.require_at_range_bounds(&[columns::ADDRESS]).unwrap();
        assert_eq!(table.value(1, columns::ADDRESS), None);
    }

    #[test]
    fn test_checkpoint_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint = temp_dir.path().join("data.csv");
        let source = temp_dir.path().join("input.csv");
        std::fs::write(&source, "name\nann\nbob\n").unwrap();

        let (mut table, resumed) = DataTable::load_or_init(&checkpoint, &source, 0, None).unwrap();
        assert!(!resumed);
        table.set_value(1, columns::SECRET, "s").unwrap();
        table.checkpoint().unwrap();

        let (table, resumed) = DataTable::load_or_init(&checkpoint, &source, 0, None).unwrap();
        assert!(resumed);
        assert_eq!(table.value(1, columns::SECRET), Some("s"));
        assert_eq!(table.value(0, columns::SECRET), None);
    }
}

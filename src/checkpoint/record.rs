//! Single-row checkpointed records.

use super::store;
use crate::models::{GiftdropError, Result};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

/// Named scalar fields persisted as one row.
pub trait RecordFields: Default {
    /// Column titles, in storage order.
    const HEADER: &'static [&'static str];

    /// Values in `HEADER` order.
    fn to_row(&self) -> Vec<String>;

    /// Set one field from its stored text.
    fn set_field(&mut self, title: &str, value: &str) -> Result<()>;
}

/// A `RecordFields` value bound to its checkpoint path.
#[derive(Debug, Clone)]
pub struct SingletonRecord<T> {
    path: PathBuf,
    fields: T,
}

impl<T: RecordFields> SingletonRecord<T> {
    /// Load from `path`, keeping defaults for anything not stored.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut fields = T::default();

        if let Some(data) = store::load(&path)? {
            if data.rows.len() > 1 {
                return Err(GiftdropError::StateConsistency(format!(
                    "{} holds {} rows, expected one",
                    path.display(),
                    data.rows.len()
                )));
            }
            if let Some(row) = data.rows.first() {
                for (title, value) in data.header.iter().zip(row) {
                    if T::HEADER.contains(&title.as_str()) {
                        fields.set_field(title, value)?;
                    }
                }
            }
        }

        Ok(Self { path, fields })
    }

    /// Persist the current values as the sole row.
    pub fn checkpoint(&self) -> Result<()> {
        let header: Vec<String> = T::HEADER.iter().map(|s| s.to_string()).collect();
        store::save(&self.path, &header, &[self.fields.to_row()])
    }
}

impl<T> Deref for SingletonRecord<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.fields
    }
}

impl<T> DerefMut for SingletonRecord<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.fields
    }
}

/// Class identity and metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassState {
    pub class_id: Option<String>,
    pub class_metadata: Option<String>,
}

impl RecordFields for ClassState {
    const HEADER: &'static [&'static str] = &["classId", "classMetadata"];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.class_id.clone().unwrap_or_default(),
            self.class_metadata.clone().unwrap_or_default(),
        ]
    }

    fn set_field(&mut self, title: &str, value: &str) -> Result<()> {
        let value = (!value.is_empty()).then(|| value.to_string());
        match title {
            "classId" => self.class_id = value,
            "classMetadata" => self.class_metadata = value,
            _ => {}
        }
        Ok(())
    }
}

/// Kind of batched ledger operation; each has its own progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Mint,
    Metadata,
    Funds,
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchKind::Mint => write!(f, "mint"),
            BatchKind::Metadata => write!(f, "metadata"),
            BatchKind::Funds => write!(f, "funds"),
        }
    }
}

/// Completed-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub last_mint_batch: usize,
    pub last_metadata_batch: usize,
    pub last_balance_tx_batch: usize,
}

impl BatchProgress {
    pub fn get(&self, kind: BatchKind) -> usize {
        match kind {
            BatchKind::Mint => self.last_mint_batch,
            BatchKind::Metadata => self.last_metadata_batch,
            BatchKind::Funds => self.last_balance_tx_batch,
        }
    }

    pub fn counter_mut(&mut self, kind: BatchKind) -> &mut usize {
        match kind {
            BatchKind::Mint => &mut self.last_mint_batch,
            BatchKind::Metadata => &mut self.last_metadata_batch,
            BatchKind::Funds => &mut self.last_balance_tx_batch,
        }
    }
}

impl RecordFields for BatchProgress {
    const HEADER: &'static [&'static str] =
        &["lastMintBatch", "lastMetadataBatch", "lastBalanceTxBatch"];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.last_mint_batch.to_string(),
            self.last_metadata_batch.to_string(),
            self.last_balance_tx_batch.to_string(),
        ]
    }

    fn set_field(&mut self, title: &str, value: &str) -> Result<()> {
        let parsed = if value.is_empty() {
            0
        } else {
            value.trim().parse::<usize>().map_err(|_| {
                GiftdropError::StateConsistency(format!(
                    "batch counter {title} is not a non-negative integer: '{value}'"
                ))
            })?
        };
        match title {
            "lastMintBatch" => self.last_mint_batch = parsed,
            "lastMetadataBatch" => self.last_metadata_batch = parsed,
            "lastBalanceTxBatch" => self.last_balance_tx_batch = parsed,
            _ => {}
        }
        Ok(())
    }
}

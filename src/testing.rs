//! In-memory collaborators for tests.

use crate::checkpoint::BatchKind;
use crate::client::{Account, KeyGenerator, Ledger, LedgerCall, Pinner};
use crate::models::{GiftdropError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Ledger call as seen by `RecordingLedger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    ClassExists(String),
    CreateClass(String),
    SetClassMetadata(String, String),
    MinimumDeposit,
    Batch(BatchKind, Vec<LedgerCall>),
}

impl Recorded {
    /// Whether the call changes ledger state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateClass(_) | Self::SetClassMetadata(..) | Self::Batch(..)
        )
    }
}

/// Ledger that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingLedger {
    pub existing_classes: Mutex<HashSet<String>>,
    pub minimum_deposit: u128,
    calls: Mutex<Vec<Recorded>>,
    /// Fail the batch of this kind whose first call is at this position in
    /// the kind's submission order (0-based), once.
    fail_batch: Mutex<Option<(BatchKind, usize)>>,
    submitted: Mutex<Vec<BatchKind>>,
}

impl RecordingLedger {
    pub fn new(minimum_deposit: u128) -> Self {
        Self {
            minimum_deposit,
            ..Default::default()
        }
    }

    pub fn with_existing_class(self, class_id: &str) -> Self {
        if let Ok(mut classes) = self.existing_classes.lock() {
            classes.insert(class_id.to_string());
        }
        self
    }

    /// Fail the `nth` batch submitted for `kind` (counting from zero).
    pub fn fail_nth_batch(&self, kind: BatchKind, nth: usize) {
        *self.fail_batch.lock().unwrap() = Some((kind, nth));
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<Recorded> {
        self.calls().into_iter().filter(Recorded::is_mutating).collect()
    }

    pub fn batches(&self, kind: BatchKind) -> Vec<Vec<LedgerCall>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Recorded::Batch(k, calls) if k == kind => Some(calls),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Recorded) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn class_exists(&self, class_id: &str) -> Result<bool> {
        self.record(Recorded::ClassExists(class_id.to_string()));
        Ok(self.existing_classes.lock().unwrap().contains(class_id))
    }

    async fn create_class(&self, class_id: &str, dry_run: bool) -> Result<()> {
        self.record(Recorded::CreateClass(class_id.to_string()));
        if !dry_run {
            self.existing_classes
                .lock()
                .unwrap()
                .insert(class_id.to_string());
        }
        Ok(())
    }

    async fn set_class_metadata(&self, class_id: &str, cid: &str, _dry_run: bool) -> Result<()> {
        self.record(Recorded::SetClassMetadata(
            class_id.to_string(),
            cid.to_string(),
        ));
        Ok(())
    }

    async fn minimum_deposit(&self) -> Result<u128> {
        self.record(Recorded::MinimumDeposit);
        Ok(self.minimum_deposit)
    }

    async fn submit_batch(
        &self,
        kind: BatchKind,
        calls: &[LedgerCall],
        _dry_run: bool,
    ) -> Result<()> {
        let nth = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(kind);
            submitted.iter().filter(|k| **k == kind).count() - 1
        };
        let mut fail = self.fail_batch.lock().unwrap();
        if *fail == Some((kind, nth)) {
            *fail = None;
            return Err(GiftdropError::external(
                format!("Submitting {kind} batch"),
                "simulated outage",
            ));
        }
        drop(fail);
        self.record(Recorded::Batch(kind, calls.to_vec()));
        Ok(())
    }
}

/// Pinner returning deterministic content ids.
#[derive(Default)]
pub struct RecordingPinner {
    pinned: Mutex<Vec<(String, Vec<u8>)>>,
    fail_after: Mutex<Option<usize>>,
}

impl RecordingPinner {
    /// Fail every pin after `count` successful ones.
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.lock().unwrap() = Some(count);
    }

    pub fn names(&self) -> Vec<String> {
        self.pinned
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn documents(&self) -> Vec<serde_json::Value> {
        self.pinned
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, data)| serde_json::from_slice(data).ok())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.pinned.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.pinned.lock().unwrap().clear();
    }
}

#[async_trait]
impl Pinner for RecordingPinner {
    async fn pin(&self, name: &str, data: Vec<u8>) -> Result<String> {
        let mut pinned = self.pinned.lock().unwrap();
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if pinned.len() >= limit {
                return Err(GiftdropError::external(format!("Pinning {name}"), "status 502"));
            }
        }
        pinned.push((name.to_string(), data));
        Ok(format!("cid-{}-{}", pinned.len(), name))
    }
}

/// Keys `secret-N` / `addr-N`.
#[derive(Default)]
pub struct SequentialKeys {
    next: AtomicUsize,
}

impl KeyGenerator for SequentialKeys {
    fn generate(&self) -> Account {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Account {
            secret: format!("secret-{n}"),
            address: format!("addr-{n}"),
        }
    }
}

//! State aggregate for one workflow run.

use crate::checkpoint::{BatchProgress, CheckpointStore, ClassState, DataTable, SingletonRecord};
use crate::client::{Ledger, Pinner};
use crate::models::{Result, WorkflowConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a step reads or mutates. Constructed once per run and passed
/// to each step by `&mut`.
pub struct WorkflowContext {
    pub ledger: Arc<dyn Ledger>,
    pub pinner: Arc<dyn Pinner>,
    pub table: DataTable,
    pub class: SingletonRecord<ClassState>,
    pub batches: SingletonRecord<BatchProgress>,
    pub dry_run: bool,
    store: CheckpointStore,
    resumed: bool,
}

impl WorkflowContext {
    /// Load every checkpoint from `store`, initializing the data table from
    /// the configured CSV when there is no checkpoint yet. Nothing is
    /// written.
    pub fn load(
        config: &WorkflowConfig,
        store: CheckpointStore,
        ledger: Arc<dyn Ledger>,
        pinner: Arc<dyn Pinner>,
        dry_run: bool,
    ) -> Result<Self> {
        let data = &config.instance.data;
        let (table, resumed) =
            DataTable::load_or_init(&store.data_path(), &data.csv_file, data.offset, data.count)?;
        let class = SingletonRecord::<ClassState>::load(store.class_path())?;
        let batches = SingletonRecord::<BatchProgress>::load(store.batch_path())?;

        info!(
            rows = table.row_count(),
            start = table.start(),
            end = table.end(),
            resumed,
            dry_run,
            "Workflow context loaded"
        );

        Ok(Self {
            ledger,
            pinner,
            table,
            class,
            batches,
            dry_run,
            store,
            resumed,
        })
    }

    /// Whether the data table came from an existing checkpoint.
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Persist the data table unless this is a dry run.
    pub fn checkpoint_table(&self) -> Result<()> {
        if self.dry_run {
            debug!("Dry run: data checkpoint skipped");
            return Ok(());
        }
        self.table.checkpoint()
    }

    /// Persist the class record unless this is a dry run.
    pub fn checkpoint_class(&self) -> Result<()> {
        if self.dry_run {
            debug!("Dry run: class checkpoint skipped");
            return Ok(());
        }
        self.class.checkpoint()
    }

    /// Persist the batch record unless this is a dry run.
    pub fn checkpoint_batches(&self) -> Result<()> {
        if self.dry_run {
            debug!("Dry run: batch checkpoint skipped");
            return Ok(());
        }
        self.batches.checkpoint()
    }

    /// Write the final table to `output` and delete all checkpoint state.
    pub fn finalize(&mut self, output: &Path) -> Result<()> {
        self.table.write_to(output)?;
        self.store.clear()?;
        self.resumed = false;
        info!(output = %output.display(), "Final table written, checkpoints removed");
        Ok(())
    }
}

//! Checkpoint module for resumable workflow execution.
//!
//! Provides:
//! - `store`: CSV load/save with atomic replacement
//! - `DataTable`: column projection over the beneficiary rows
//! - `SingletonRecord`: one-row records for class identity and batch progress

pub mod store;
mod record;
mod table;

pub use record::*;
pub use store::{CheckpointStore, TableData};
pub use table::*;

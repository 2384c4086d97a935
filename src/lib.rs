//! giftdrop - checkpointed, resumable batch gift drops on a ledger.
//!
//! ## Architecture
//!
//! A drop creates (or appends to) a class, generates one account per
//! beneficiary row, mints an instance to each account, pins per-row media
//! and metadata, points every instance at its metadata, and funds the
//! accounts. Ledger and pinning writes are grouped into batches.
//!
//! ## Resumability
//!
//! - Every step checks checkpointed state first and skips completed work
//! - Batch progress is persisted after each successful batch
//! - Checkpoints are CSV files replaced atomically
//! - A finished run writes the output table and removes its checkpoints

pub mod checkpoint;
pub mod client;
pub mod files;
pub mod models;
pub mod pipeline;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use checkpoint::{CheckpointStore, DataTable};
pub use client::{GatewayLedger, PinataClient};
pub use models::{GiftdropError, Result, RunStats, WorkflowConfig};
pub use pipeline::{WorkflowContext, WorkflowPipeline};

//! Core data models for giftdrop.
//!
//! - `config`: workflow configuration and amount parsing
//! - `error`: error taxonomy
//! - `metadata`: pinned metadata documents, stages and run statistics

mod config;
mod error;
mod metadata;

pub use config::*;
pub use error::*;
pub use metadata::*;

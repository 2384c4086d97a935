//! Pipeline module - the resumable gift-drop workflow.

mod batch;
mod context;
mod template;
mod validate;
mod workflow;

pub use batch::*;
pub use context::*;
pub use template::*;
pub use validate::*;
pub use workflow::*;

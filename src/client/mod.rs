//! External collaborators: ledger, pinning service, operator decisions and
//! account generation.

mod decision;
mod keys;
mod ledger;
mod pinning;

pub use decision::*;
pub use keys::*;
pub use ledger::*;
pub use pinning::*;

//! Sync domain models and helpers.

mod sync_model;
mod sync_outcome;
mod sync_scheduler;
mod sync_state_model;

pub use sync_model::*;
pub use sync_outcome::*;
pub use sync_scheduler::*;
pub use sync_state_model::*;

//! Domain models, local persistence contracts and sync primitives for the journal.

pub mod clock;
pub mod errors;
pub mod journal;
pub mod storage;
pub mod sync;

pub use clock::{Clock, SystemClock};
pub use errors::{DatabaseError, Error, Result};

//! Journal entries, consent records and their local persistence.

mod journal_model;
mod local_journal;

pub use journal_model::*;
pub use local_journal::LocalJournal;

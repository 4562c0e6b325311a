//! Local-first sync between the journal's local store and a hosted record store.
//!
//! This crate provides:
//! - A REST client for the hosted backend ([`RemoteClient`]) behind the [`RemoteStore`] port
//! - Identity bootstrap ([`BootstrapIdentityResolver`])
//! - Push, pull and merge passes ([`SyncEngine`])
//! - Timer, manual and forced orchestration ([`AutoSyncScheduler`])
//! - The operator aggregate ([`AdminAggregator`])

pub mod admin;
pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod identity;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use admin::{AdminAggregator, AdminRunResult, UserFetchFailure};
pub use client::RemoteClient;
pub use config::SyncConfig;
pub use context::{SyncContext, SyncServices};
pub use engine::SyncEngine;
pub use error::{RemoteError, Result};
pub use identity::{BootstrapIdentityResolver, IdentityProvider, StaticIdentity};
pub use scheduler::{AutoSyncScheduler, SchedulerSettings};
pub use store::RemoteStore;
pub use types::{ListFilter, Resource, SortOrder};

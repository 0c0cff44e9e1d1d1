//! nook-core - Core library for Nook
//!
//! A local-first personal data store: records live in an on-device libSQL
//! cache, are pushed to and pulled from a remote authoritative store by the
//! sync engine, and vault items are encrypted under the user's PIN.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;
pub mod vault;

pub use error::{Error, Result};
pub use models::{Collection, Record, RecordId, Synced};
pub use services::LocalStore;
pub use state::{LockState, SyncState};
pub use sync::{SyncConfig, SyncEngine, SyncHandle};

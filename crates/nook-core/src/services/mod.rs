//! Shared services used by every client.

mod local_store;

pub use local_store::{ApplyOutcome, ChangeKind, LocalStore, StoreChange};

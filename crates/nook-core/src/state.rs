//! Shared cross-module state types.

/// Sync status published by the sync engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No sync session is running.
    Offline,
    /// A push cycle is in flight.
    Syncing,
    /// The last push cycle drained every due record.
    Synced,
    /// The last push cycle left at least one record for retry.
    Error,
}

/// Lock state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

//! Session context shared by PIN auth, biometric unlock and the vault

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::VaultKey;
use crate::error::Result;
use crate::services::LocalStore;
use crate::state::LockState;
use crate::sync::SyncHandle;

struct SessionState {
    lock: LockState,
    vault_key: Option<VaultKey>,
    failed_attempts: u32,
}

/// One signed-in user on this device.
///
/// Holds the lock state and, while unlocked, the vault key. Share it by
/// [`Arc`]; every component that reads or changes the lock state takes the
/// session explicitly.
pub struct Session {
    user_id: String,
    state: Mutex<SessionState>,
}

impl Session {
    /// A new session in the given lock state, without a vault key
    pub fn new(user_id: impl Into<String>, lock: LockState) -> Arc<Self> {
        Arc::new(Self {
            user_id: user_id.into(),
            state: Mutex::new(SessionState {
                lock,
                vault_key: None,
                failed_attempts: 0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn lock_state(&self) -> LockState {
        self.state().lock
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock_state() == LockState::Unlocked
    }

    /// The vault key, if the vault is unlocked
    pub fn vault_key(&self) -> Option<VaultKey> {
        let state = self.state();
        match state.lock {
            LockState::Unlocked => state.vault_key.clone(),
            LockState::Locked => None,
        }
    }

    /// Consecutive failed unlock attempts since the last success
    pub fn failed_attempts(&self) -> u32 {
        self.state().failed_attempts
    }

    pub(crate) fn unlock_with(&self, key: VaultKey) {
        let mut state = self.state();
        state.lock = LockState::Unlocked;
        state.vault_key = Some(key);
        state.failed_attempts = 0;
    }

    /// Unlock the app shell without holding a vault key (no PIN configured)
    pub(crate) fn unlock_without_key(&self) {
        let mut state = self.state();
        state.lock = LockState::Unlocked;
        state.vault_key = None;
    }

    pub(crate) fn record_failed_attempt(&self) -> u32 {
        let mut state = self.state();
        state.failed_attempts = state.failed_attempts.saturating_add(1);
        state.failed_attempts
    }

    /// Lock and drop the vault key
    pub(crate) fn lock(&self) {
        let mut state = self.state();
        state.lock = LockState::Locked;
        state.vault_key = None;
    }

    /// End the session.
    ///
    /// Sync is stopped first so no late pull can repopulate the cache, then
    /// the vault key is dropped, then the local store is cleared.
    pub async fn sign_out(&self, sync: Option<SyncHandle>, store: &LocalStore) -> Result<()> {
        if let Some(sync) = sync {
            sync.shutdown().await;
        }
        self.lock();
        store.clear_all().await?;
        tracing::info!("Signed out user {}", self.user_id);
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("lock", &state.lock)
            .field("has_vault_key", &state.vault_key.is_some())
            .field("failed_attempts", &state.failed_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, EntryKind};
    use crate::remote::MemoryRemoteStore;
    use crate::sync::{SyncConfig, SyncEngine};

    #[test]
    fn test_locked_session_hides_key() {
        let session = Session::new("u1", LockState::Locked);
        assert!(session.vault_key().is_none());

        session.unlock_with(VaultKey::new("4821"));
        assert_eq!(session.vault_key().unwrap().expose(), "4821");

        session.lock();
        assert_eq!(session.lock_state(), LockState::Locked);
        assert!(session.vault_key().is_none());
    }

    #[test]
    fn test_independent_sessions() {
        let first = Session::new("u1", LockState::Locked);
        let second = Session::new("u2", LockState::Locked);
        first.unlock_with(VaultKey::new("1111"));
        assert!(second.vault_key().is_none());
        assert!(!format!("{first:?}").contains("1111"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sign_out_stops_sync_then_clears() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = MemoryRemoteStore::new();
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(remote.clone()),
            "u1",
            SyncConfig::default(),
        );
        store
            .create(Entry::new("kept", "", EntryKind::Note, ["x"]))
            .await
            .unwrap();
        let handle = engine.start().await.unwrap();

        let session = Session::new("u1", LockState::Locked);
        session.unlock_with(VaultKey::new("4821"));
        session.sign_out(Some(handle), &store).await.unwrap();

        assert!(session.vault_key().is_none());
        assert!(store.list::<Entry>().await.unwrap().is_empty());
        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(remote.subscriber_count("u1", crate::remote::FeedTarget::Settings), 0);
    }
}

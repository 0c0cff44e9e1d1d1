//! PIN lifecycle and unlock.
//!
//! Entering the correct PIN unlocks the app and the vault in one step: the
//! PIN itself becomes the vault key.

use std::sync::Arc;

use super::{AuthError, AuthResult, DevicePersistence, Session, VaultKey};
use crate::crypto::{compare_pin, VaultCrypto};
use crate::services::LocalStore;
use crate::state::LockState;

pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 12;

/// Result of an unlock attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked(VaultKey),
    Rejected,
}

/// Check that a PIN is 4 to 12 ASCII digits
pub fn validate_pin(pin: &str) -> AuthResult<()> {
    if (MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
    {
        Ok(())
    } else {
        Err(AuthError::InvalidPin)
    }
}

#[derive(Clone)]
pub struct PinAuth<D: DevicePersistence> {
    device: D,
    store: LocalStore,
    crypto: VaultCrypto,
}

impl<D: DevicePersistence> PinAuth<D> {
    pub const fn new(device: D, store: LocalStore, crypto: VaultCrypto) -> Self {
        Self {
            device,
            store,
            crypto,
        }
    }

    pub fn has_pin(&self) -> AuthResult<bool> {
        Ok(self.device.load()?.pin_hash.is_some())
    }

    /// Start a session: locked when a PIN is configured, open otherwise
    pub fn begin_session(&self, user_id: impl Into<String>) -> AuthResult<Arc<Session>> {
        let lock = if self.has_pin()? {
            LockState::Locked
        } else {
            LockState::Unlocked
        };
        Ok(Session::new(user_id, lock))
    }

    /// Configure the first PIN; the session is unlocked with it
    pub fn set_pin(&self, session: &Session, pin: &str) -> AuthResult<VaultKey> {
        validate_pin(pin)?;
        let mut secrets = self.device.load()?;
        if secrets.pin_hash.is_some() {
            return Err(AuthError::PinAlreadySet);
        }

        secrets.pin_hash = Some(self.crypto.hash_pin(pin)?);
        self.device.save(&secrets)?;

        let key = VaultKey::new(pin);
        session.unlock_with(key.clone());
        tracing::info!("PIN configured for user {}", session.user_id());
        Ok(key)
    }

    /// Verify a candidate PIN and, on success, unlock with it as vault key.
    ///
    /// A wrong PIN (or no PIN configured) leaves the session untouched apart
    /// from the failed-attempt counter.
    pub fn unlock(&self, session: &Session, candidate: &str) -> AuthResult<UnlockOutcome> {
        let Some(hash) = self.device.load()?.pin_hash else {
            return Ok(UnlockOutcome::Rejected);
        };

        if validate_pin(candidate).is_ok() && compare_pin(candidate, &hash) {
            let key = VaultKey::new(candidate);
            session.unlock_with(key.clone());
            tracing::debug!("Session unlocked with PIN");
            Ok(UnlockOutcome::Unlocked(key))
        } else {
            let attempts = session.record_failed_attempt();
            tracing::debug!("PIN rejected ({} consecutive failures)", attempts);
            Ok(UnlockOutcome::Rejected)
        }
    }

    /// Boolean view of [`Self::unlock`]
    pub fn verify(&self, session: &Session, candidate: &str) -> AuthResult<bool> {
        Ok(matches!(
            self.unlock(session, candidate)?,
            UnlockOutcome::Unlocked(_)
        ))
    }

    /// Lock the session and drop the vault key
    pub fn lock(&self, session: &Session) -> AuthResult<()> {
        if !self.has_pin()? {
            return Err(AuthError::PinNotSet);
        }
        session.lock();
        tracing::debug!("Session locked");
        Ok(())
    }

    /// Replace the PIN after verifying the current one.
    ///
    /// Existing vault items stay encrypted under the previous PIN and can no
    /// longer be decrypted. A registered biometric credential is re-wrapped
    /// around the new PIN.
    pub async fn change_pin(
        &self,
        session: &Session,
        current: &str,
        new_pin: &str,
    ) -> AuthResult<VaultKey> {
        validate_pin(new_pin)?;
        if !self.verify(session, current)? {
            return Err(AuthError::IncorrectPin);
        }

        let mut secrets = self.device.load()?;
        secrets.pin_hash = Some(self.crypto.hash_pin(new_pin)?);
        self.device.save(&secrets)?;

        if let Some(credential_id) = &secrets.credential_id {
            let wrapped = self.crypto.seal(new_pin.as_bytes(), credential_id)?;
            self.store
                .update_settings(|settings| settings.wrapped_pin = Some(wrapped))
                .await?;
        }

        let key = VaultKey::new(new_pin);
        session.unlock_with(key.clone());
        tracing::info!("PIN changed for user {}", session.user_id());
        Ok(key)
    }

    /// Remove the PIN after verifying it. Biometric unlock is deregistered
    /// too and the session keeps no vault key.
    pub async fn clear_pin(&self, session: &Session, current: &str) -> AuthResult<()> {
        if !self.verify(session, current)? {
            return Err(AuthError::IncorrectPin);
        }

        self.device.clear()?;
        let settings = self.store.load_settings().await?;
        if settings.wrapped_pin.is_some() {
            self.store
                .update_settings(|settings| settings.wrapped_pin = None)
                .await?;
        }

        session.unlock_without_key();
        tracing::info!("PIN cleared for user {}", session.user_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryDeviceStore;
    use crate::crypto::KdfParams;

    async fn setup() -> PinAuth<MemoryDeviceStore> {
        PinAuth::new(
            MemoryDeviceStore::new(),
            LocalStore::open_in_memory().await.unwrap(),
            VaultCrypto::new(KdfParams::new(1024, 1, 1)),
        )
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("4821").is_ok());
        assert!(validate_pin("123456789012").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("1234567890123").is_err());
        assert!(validate_pin("12a4").is_err());
        assert!(validate_pin("١٢٣٤").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_open_without_pin() {
        let auth = setup().await;
        let session = auth.begin_session("u1").unwrap();
        assert_eq!(session.lock_state(), LockState::Unlocked);
        assert!(session.vault_key().is_none());

        // Nothing to verify against
        assert!(!auth.verify(&session, "4821").unwrap());
        assert!(matches!(auth.lock(&session), Err(AuthError::PinNotSet)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_pin_twice_is_rejected() {
        let auth = setup().await;
        let session = auth.begin_session("u1").unwrap();
        auth.set_pin(&session, "4821").unwrap();
        assert!(matches!(
            auth.set_pin(&session, "1111"),
            Err(AuthError::PinAlreadySet)
        ));
        assert!(matches!(auth.set_pin(&session, "12"), Err(AuthError::InvalidPin)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_attempts_reset_on_success() {
        let auth = setup().await;
        let session = auth.begin_session("u1").unwrap();
        auth.set_pin(&session, "4821").unwrap();
        auth.lock(&session).unwrap();

        assert!(!auth.verify(&session, "0000").unwrap());
        assert!(!auth.verify(&session, "not a pin").unwrap());
        assert_eq!(session.failed_attempts(), 2);
        assert_eq!(session.lock_state(), LockState::Locked);

        assert!(auth.verify(&session, "4821").unwrap());
        assert_eq!(session.failed_attempts(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_change_pin_requires_current() {
        let auth = setup().await;
        let session = auth.begin_session("u1").unwrap();
        auth.set_pin(&session, "4821").unwrap();

        assert!(matches!(
            auth.change_pin(&session, "0000", "5555").await,
            Err(AuthError::IncorrectPin)
        ));

        let key = auth.change_pin(&session, "4821", "5555").await.unwrap();
        assert_eq!(key.expose(), "5555");
        auth.lock(&session).unwrap();
        assert!(!auth.verify(&session, "4821").unwrap());
        assert!(auth.verify(&session, "5555").unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_pin_drops_vault_key() {
        let auth = setup().await;
        let session = auth.begin_session("u1").unwrap();
        auth.set_pin(&session, "4821").unwrap();

        auth.clear_pin(&session, "4821").await.unwrap();
        assert!(!auth.has_pin().unwrap());
        assert_eq!(session.lock_state(), LockState::Unlocked);
        assert!(session.vault_key().is_none());
    }
}

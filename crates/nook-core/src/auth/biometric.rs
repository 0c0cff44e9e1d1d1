//! Biometric unlock.
//!
//! Registration creates a platform credential and wraps the current PIN
//! under the credential id. A later successful assertion unwraps the PIN,
//! so biometric unlock yields exactly the vault key typing the PIN would.
//! Any failure on the unlock path falls back to PIN entry; it is never an
//! error.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{AuthError, AuthResult, DevicePersistence, Session, VaultKey};
use crate::crypto::{compare_pin, VaultCrypto};
use crate::services::LocalStore;

#[derive(Debug, Error)]
pub enum BiometricError {
    #[error("Platform authenticator error: {0}")]
    Platform(String),
}

/// Result of a platform assertion ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    Verified(String),
    Cancelled,
    Unsupported,
}

/// Platform-bound credential API (user verification required)
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Create a credential and return its identifier
    async fn register_credential(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<String, BiometricError>;

    /// Request an assertion for a credential
    async fn authenticate(&self, credential_id: &str) -> Result<Assertion, BiometricError>;
}

/// Why biometric unlock handed over to PIN entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NotRegistered,
    Cancelled,
    Unsupported,
    PlatformError,
    /// The wrapped PIN could not be unwrapped with the credential
    CredentialInvalidated,
    /// The unwrapped PIN no longer matches the configured PIN
    StalePin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricUnlock {
    Unlocked(VaultKey),
    FallbackToPin(FallbackReason),
}

#[derive(Clone)]
pub struct BiometricBridge<D: DevicePersistence> {
    device: D,
    store: LocalStore,
    crypto: VaultCrypto,
    platform: Arc<dyn PlatformAuthenticator>,
}

impl<D: DevicePersistence> BiometricBridge<D> {
    pub fn new(
        device: D,
        store: LocalStore,
        crypto: VaultCrypto,
        platform: Arc<dyn PlatformAuthenticator>,
    ) -> Self {
        Self {
            device,
            store,
            crypto,
            platform,
        }
    }

    pub async fn is_registered(&self) -> AuthResult<bool> {
        let secrets = self.device.load()?;
        let settings = self.store.load_settings().await?;
        Ok(secrets.credential_id.is_some() && settings.wrapped_pin.is_some())
    }

    /// Register a credential for the unlocked session.
    ///
    /// Requires a configured PIN and an unlocked session holding the vault
    /// key; both are checked before the platform ceremony starts.
    pub async fn register(&self, session: &Session, display_name: &str) -> AuthResult<()> {
        let mut secrets = self.device.load()?;
        if secrets.pin_hash.is_none() {
            return Err(AuthError::PinNotSet);
        }
        let Some(key) = session.vault_key() else {
            return Err(AuthError::Locked);
        };

        let credential_id = self
            .platform
            .register_credential(session.user_id(), display_name)
            .await?;
        let wrapped = self.crypto.seal(key.expose().as_bytes(), &credential_id)?;

        secrets.credential_id = Some(credential_id);
        self.device.save(&secrets)?;
        self.store
            .update_settings(|settings| settings.wrapped_pin = Some(wrapped))
            .await?;

        tracing::info!("Biometric unlock registered for user {}", session.user_id());
        Ok(())
    }

    /// Try to unlock the session with a platform assertion
    pub async fn unlock(&self, session: &Session) -> BiometricUnlock {
        match self.try_unlock(session).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!("Biometric unlock failed: {}", error);
                BiometricUnlock::FallbackToPin(FallbackReason::PlatformError)
            }
        }
    }

    async fn try_unlock(&self, session: &Session) -> AuthResult<BiometricUnlock> {
        use BiometricUnlock::FallbackToPin;

        let secrets = self.device.load()?;
        let (Some(credential_id), Some(pin_hash)) = (secrets.credential_id, secrets.pin_hash)
        else {
            return Ok(FallbackToPin(FallbackReason::NotRegistered));
        };
        let Some(wrapped) = self.store.load_settings().await?.wrapped_pin else {
            return Ok(FallbackToPin(FallbackReason::NotRegistered));
        };

        match self.platform.authenticate(&credential_id).await? {
            Assertion::Verified(_) => {}
            Assertion::Cancelled => return Ok(FallbackToPin(FallbackReason::Cancelled)),
            Assertion::Unsupported => return Ok(FallbackToPin(FallbackReason::Unsupported)),
        }

        let Some(pin) = self
            .crypto
            .open(&wrapped, &credential_id)
            .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
        else {
            return Ok(FallbackToPin(FallbackReason::CredentialInvalidated));
        };
        let key = VaultKey::new(pin);
        if !compare_pin(key.expose(), &pin_hash) {
            return Ok(FallbackToPin(FallbackReason::StalePin));
        }

        session.unlock_with(key.clone());
        tracing::debug!("Session unlocked with biometric credential");
        Ok(BiometricUnlock::Unlocked(key))
    }

    /// Forget the credential and the wrapped PIN; the PIN itself stays
    pub async fn deregister(&self) -> AuthResult<()> {
        let mut secrets = self.device.load()?;
        if secrets.credential_id.take().is_some() {
            self.device.save(&secrets)?;
        }
        if self.store.load_settings().await?.wrapped_pin.is_some() {
            self.store
                .update_settings(|settings| settings.wrapped_pin = None)
                .await?;
        }
        tracing::info!("Biometric unlock deregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryDeviceStore, PinAuth};
    use crate::crypto::KdfParams;
    use crate::state::LockState;
    use std::sync::Mutex;

    struct FakePlatform {
        next: Mutex<Option<Assertion>>,
    }

    impl FakePlatform {
        fn answering(assertion: Assertion) -> Arc<Self> {
            Arc::new(Self {
                next: Mutex::new(Some(assertion)),
            })
        }
    }

    #[async_trait]
    impl PlatformAuthenticator for FakePlatform {
        async fn register_credential(
            &self,
            user_id: &str,
            _display_name: &str,
        ) -> Result<String, BiometricError> {
            Ok(format!("cred-{user_id}"))
        }

        async fn authenticate(&self, credential_id: &str) -> Result<Assertion, BiometricError> {
            self.next
                .lock()
                .unwrap()
                .take()
                .map_or_else(
                    || Err(BiometricError::Platform("no assertion queued".to_string())),
                    |assertion| match assertion {
                        Assertion::Verified(_) => Ok(Assertion::Verified(credential_id.to_string())),
                        other => Ok(other),
                    },
                )
        }
    }

    async fn setup(
        platform: Arc<FakePlatform>,
    ) -> (PinAuth<MemoryDeviceStore>, BiometricBridge<MemoryDeviceStore>) {
        let device = MemoryDeviceStore::new();
        let store = LocalStore::open_in_memory().await.unwrap();
        let crypto = VaultCrypto::new(KdfParams::new(1024, 1, 1));
        (
            PinAuth::new(device.clone(), store.clone(), crypto),
            BiometricBridge::new(device, store, crypto, platform),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_checks_preconditions() {
        let (pins, bridge) = setup(FakePlatform::answering(Assertion::Cancelled)).await;
        let session = pins.begin_session("u1").unwrap();
        assert!(matches!(
            bridge.register(&session, "Phone").await,
            Err(AuthError::PinNotSet)
        ));

        pins.set_pin(&session, "4821").unwrap();
        pins.lock(&session).unwrap();
        assert!(matches!(
            bridge.register(&session, "Phone").await,
            Err(AuthError::Locked)
        ));
        assert!(!bridge.is_registered().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_assertion_falls_back() {
        let (pins, bridge) = setup(FakePlatform::answering(Assertion::Cancelled)).await;
        let session = pins.begin_session("u1").unwrap();
        pins.set_pin(&session, "4821").unwrap();
        bridge.register(&session, "Phone").await.unwrap();
        pins.lock(&session).unwrap();

        assert_eq!(
            bridge.unlock(&session).await,
            BiometricUnlock::FallbackToPin(FallbackReason::Cancelled)
        );
        assert_eq!(session.lock_state(), LockState::Locked);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unregistered_falls_back() {
        let (pins, bridge) =
            setup(FakePlatform::answering(Assertion::Verified(String::new()))).await;
        let session = pins.begin_session("u1").unwrap();
        assert_eq!(
            bridge.unlock(&session).await,
            BiometricUnlock::FallbackToPin(FallbackReason::NotRegistered)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_platform_error_falls_back() {
        let platform = Arc::new(FakePlatform {
            next: Mutex::new(None),
        });
        let (pins, bridge) = setup(platform).await;
        let session = pins.begin_session("u1").unwrap();
        pins.set_pin(&session, "4821").unwrap();
        bridge.register(&session, "Phone").await.unwrap();
        pins.lock(&session).unwrap();

        assert_eq!(
            bridge.unlock(&session).await,
            BiometricUnlock::FallbackToPin(FallbackReason::PlatformError)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deregister_keeps_pin() {
        let (pins, bridge) =
            setup(FakePlatform::answering(Assertion::Verified(String::new()))).await;
        let session = pins.begin_session("u1").unwrap();
        pins.set_pin(&session, "4821").unwrap();
        bridge.register(&session, "Phone").await.unwrap();
        assert!(bridge.is_registered().await.unwrap());

        bridge.deregister().await.unwrap();
        assert!(!bridge.is_registered().await.unwrap());
        assert!(pins.has_pin().unwrap());

        pins.lock(&session).unwrap();
        assert_eq!(
            bridge.unlock(&session).await,
            BiometricUnlock::FallbackToPin(FallbackReason::NotRegistered)
        );
    }
}

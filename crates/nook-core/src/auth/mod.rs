//! App lock, PIN handling and biometric unlock

mod biometric;
mod device;
mod pin;
mod session;
mod vault_key;

use thiserror::Error;

use crate::crypto::CryptoError;

pub use biometric::{
    Assertion, BiometricBridge, BiometricError, BiometricUnlock, FallbackReason,
    PlatformAuthenticator,
};
pub use device::{DevicePersistence, DeviceSecrets, FileDeviceStore, MemoryDeviceStore};
pub use pin::{validate_pin, PinAuth, UnlockOutcome, MAX_PIN_LEN, MIN_PIN_LEN};
pub use session::Session;
pub use vault_key::VaultKey;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("PIN must be {MIN_PIN_LEN} to {MAX_PIN_LEN} digits")]
    InvalidPin,

    #[error("A PIN is already configured")]
    PinAlreadySet,

    #[error("No PIN is configured")]
    PinNotSet,

    #[error("Incorrect PIN")]
    IncorrectPin,

    #[error("Session is locked")]
    Locked,

    #[error(transparent)]
    Biometric(#[from] BiometricError),

    #[error("Device storage error: {0}")]
    DeviceStorage(String),

    #[error("Device secrets are corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] crate::Error),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

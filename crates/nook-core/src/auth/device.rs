//! Device-local secrets: the PIN hash and the biometric credential id.
//!
//! These never leave the device and are kept apart from the synced settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::{AuthError, AuthResult};

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSecrets {
    /// Argon2id PHC hash of the PIN
    pub pin_hash: Option<String>,
    /// Identifier of the registered platform credential
    pub credential_id: Option<String>,
}

impl fmt::Debug for DeviceSecrets {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DeviceSecrets")
            .field("pin_hash", &self.pin_hash.as_ref().map(|_| "[REDACTED]"))
            .field("credential_id", &self.credential_id)
            .finish()
    }
}

pub trait DevicePersistence: Clone + Send + Sync + 'static {
    fn load(&self) -> AuthResult<DeviceSecrets>;
    fn save(&self, secrets: &DeviceSecrets) -> AuthResult<()>;
    fn clear(&self) -> AuthResult<()>;
}

/// JSON file next to the local database
#[derive(Debug, Clone)]
pub struct FileDeviceStore {
    path: PathBuf,
}

impl FileDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DevicePersistence for FileDeviceStore {
    fn load(&self) -> AuthResult<DeviceSecrets> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(DeviceSecrets::default())
            }
            Err(error) => Err(AuthError::DeviceStorage(error.to_string())),
        }
    }

    fn save(&self, secrets: &DeviceSecrets) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| AuthError::DeviceStorage(error.to_string()))?;
        }
        let serialized = serde_json::to_string_pretty(secrets)?;
        std::fs::write(&self.path, serialized)
            .map_err(|error| AuthError::DeviceStorage(error.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|error| AuthError::DeviceStorage(error.to_string()))?;
        }
        Ok(())
    }

    fn clear(&self) -> AuthResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AuthError::DeviceStorage(error.to_string())),
        }
    }
}

/// In-process store for tests and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceStore {
    secrets: Arc<Mutex<DeviceSecrets>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DevicePersistence for MemoryDeviceStore {
    fn load(&self) -> AuthResult<DeviceSecrets> {
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, secrets: &DeviceSecrets) -> AuthResult<()> {
        *self.secrets.lock().unwrap_or_else(PoisonError::into_inner) = secrets.clone();
        Ok(())
    }

    fn clear(&self) -> AuthResult<()> {
        self.save(&DeviceSecrets::default())
    }
}

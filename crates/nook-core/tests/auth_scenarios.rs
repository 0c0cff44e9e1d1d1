//! PIN, biometric and vault flows across restarts.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nook_core::auth::{
    Assertion, BiometricBridge, BiometricError, BiometricUnlock, FallbackReason,
    FileDeviceStore, PinAuth, PlatformAuthenticator, UnlockOutcome,
};
use nook_core::crypto::{KdfParams, VaultCrypto, VaultRecord};
use nook_core::models::VaultItemKind;
use nook_core::vault::{VaultContents, VaultService};
use nook_core::{LocalStore, LockState};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn crypto() -> VaultCrypto {
    VaultCrypto::new(KdfParams::new(1024, 1, 1))
}

/// Platform authenticator that verifies every assertion for the credential
/// it issued, until told the credential was revoked.
#[derive(Default)]
struct FakePlatform {
    issued: Mutex<Option<String>>,
    revoked: Mutex<bool>,
}

#[async_trait]
impl PlatformAuthenticator for FakePlatform {
    async fn register_credential(
        &self,
        user_id: &str,
        _display_name: &str,
    ) -> Result<String, BiometricError> {
        let credential_id = format!("credential-{user_id}-{}", uuid::Uuid::now_v7());
        *self.issued.lock().unwrap() = Some(credential_id.clone());
        Ok(credential_id)
    }

    async fn authenticate(&self, credential_id: &str) -> Result<Assertion, BiometricError> {
        if *self.revoked.lock().unwrap() {
            return Ok(Assertion::Unsupported);
        }
        match self.issued.lock().unwrap().as_deref() {
            Some(issued) if issued == credential_id => {
                Ok(Assertion::Verified(credential_id.to_string()))
            }
            _ => Err(BiometricError::Platform("unknown credential".to_string())),
        }
    }
}

struct Device {
    dir: TempDir,
}

impl Device {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Open the stores as a fresh process would
    async fn boot(&self) -> (LocalStore, PinAuth<FileDeviceStore>) {
        let store = LocalStore::open(self.dir.path().join("nook.db")).await.unwrap();
        let device = FileDeviceStore::new(self.dir.path().join("device.json"));
        let pins = PinAuth::new(device, store.clone(), crypto());
        (store, pins)
    }

    fn bridge(
        &self,
        store: &LocalStore,
        platform: Arc<FakePlatform>,
    ) -> BiometricBridge<FileDeviceStore> {
        BiometricBridge::new(
            FileDeviceStore::new(self.dir.path().join("device.json")),
            store.clone(),
            crypto(),
            platform,
        )
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pin_lifecycle_across_restart() {
    let device = Device::new();
    {
        let (_store, pins) = device.boot().await;
        let session = pins.begin_session("u1").unwrap();
        assert_eq!(session.lock_state(), LockState::Unlocked);
        pins.set_pin(&session, "4821").unwrap();
    }

    let (_store, pins) = device.boot().await;
    let session = pins.begin_session("u1").unwrap();
    assert_eq!(session.lock_state(), LockState::Locked);

    assert!(!pins.verify(&session, "0000").unwrap());
    assert_eq!(session.lock_state(), LockState::Locked);
    assert!(session.vault_key().is_none());

    assert!(pins.verify(&session, "4821").unwrap());
    assert_eq!(session.lock_state(), LockState::Unlocked);
    assert_eq!(session.vault_key().unwrap().expose(), "4821");

    pins.lock(&session).unwrap();
    assert!(session.vault_key().is_none());
    match pins.unlock(&session, "4821").unwrap() {
        UnlockOutcome::Unlocked(key) => assert_eq!(key.expose(), "4821"),
        UnlockOutcome::Rejected => panic!("correct PIN rejected"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_biometric_round_trip() {
    let device = Device::new();
    let platform = Arc::new(FakePlatform::default());
    let (store, pins) = device.boot().await;
    let bridge = device.bridge(&store, platform.clone());

    let session = pins.begin_session("u1").unwrap();
    pins.set_pin(&session, "4821").unwrap();
    bridge.register(&session, "Pixel").await.unwrap();

    // The wrapped PIN is synced with the settings, never the PIN itself
    let settings = store.load_settings().await.unwrap();
    let wrapped = settings.wrapped_pin.unwrap();
    assert!(!wrapped.contains("4821"));
    assert!(!store.settings_row().await.unwrap().is_synced);

    pins.lock(&session).unwrap();
    assert_eq!(session.lock_state(), LockState::Locked);

    match bridge.unlock(&session).await {
        BiometricUnlock::Unlocked(key) => assert_eq!(key.expose(), "4821"),
        BiometricUnlock::FallbackToPin(reason) => panic!("fell back: {reason:?}"),
    }
    assert_eq!(session.lock_state(), LockState::Unlocked);
    assert_eq!(session.vault_key().unwrap().expose(), "4821");

    // Survives a restart
    drop((bridge, pins, store));
    let (store, pins) = device.boot().await;
    let bridge = device.bridge(&store, platform.clone());
    let session = pins.begin_session("u1").unwrap();
    assert!(matches!(bridge.unlock(&session).await, BiometricUnlock::Unlocked(_)));

    // Revoked credentials fall back to PIN entry without an error
    *platform.revoked.lock().unwrap() = true;
    pins.lock(&session).unwrap();
    assert_eq!(
        bridge.unlock(&session).await,
        BiometricUnlock::FallbackToPin(FallbackReason::Unsupported)
    );
    assert_eq!(session.lock_state(), LockState::Locked);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_changed_pin_rewraps_biometric_credential() {
    let device = Device::new();
    let platform = Arc::new(FakePlatform::default());
    let (store, pins) = device.boot().await;
    let bridge = device.bridge(&store, platform);

    let session = pins.begin_session("u1").unwrap();
    pins.set_pin(&session, "4821").unwrap();
    bridge.register(&session, "Pixel").await.unwrap();
    pins.change_pin(&session, "4821", "7390").await.unwrap();
    pins.lock(&session).unwrap();

    match bridge.unlock(&session).await {
        BiometricUnlock::Unlocked(key) => assert_eq!(key.expose(), "7390"),
        BiometricUnlock::FallbackToPin(reason) => panic!("fell back: {reason:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_changed_pin_strands_existing_vault_items() {
    let device = Device::new();
    let (store, pins) = device.boot().await;
    let vault = VaultService::new(store.clone(), crypto());

    let session = pins.begin_session("u1").unwrap();
    pins.set_pin(&session, "4821").unwrap();
    let secret: VaultRecord = [("password".to_string(), "hunter2".to_string())]
        .into_iter()
        .collect();
    let item = vault
        .create(&session, "Bank", VaultItemKind::Password, &secret)
        .await
        .unwrap();

    pins.change_pin(&session, "4821", "7390").await.unwrap();
    let view = vault.open(&session, &item.id).await.unwrap().unwrap();
    assert_eq!(view.contents, VaultContents::CannotDecrypt);

    // New items use the new PIN
    let fresh = vault
        .create(&session, "Mail", VaultItemKind::Password, &secret)
        .await
        .unwrap();
    let view = vault.open(&session, &fresh.id).await.unwrap().unwrap();
    assert_eq!(view.contents, VaultContents::Decrypted(secret));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vault_ciphertext_only_at_rest() {
    let device = Device::new();
    let (store, pins) = device.boot().await;
    let vault = VaultService::new(store.clone(), crypto());
    let session = pins.begin_session("u1").unwrap();
    pins.set_pin(&session, "4821").unwrap();

    let secret: VaultRecord = [("password".to_string(), "correct horse".to_string())]
        .into_iter()
        .collect();
    let item = vault
        .create(&session, "Bank", VaultItemKind::Password, &secret)
        .await
        .unwrap();

    let raw = store
        .raw_record(nook_core::Collection::VaultItems, &item.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!raw.payload.to_string().contains("correct horse"));

    pins.lock(&session).unwrap();
    let views = vault.list(&session).await.unwrap();
    assert_eq!(views[0].contents, VaultContents::Locked);
}

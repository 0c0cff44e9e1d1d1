//! Vault item service.
//!
//! Vault fields are encrypted under the session's vault key before they
//! reach the local store, so plaintext only ever lives in the returned
//! views.

use std::fmt;

use crate::auth::{Session, VaultKey};
use crate::crypto::{VaultCrypto, VaultRecord};
use crate::error::{Error, Result};
use crate::models::{RecordId, Synced, VaultItem, VaultItemKind};
use crate::services::LocalStore;

/// What the caller can see of a vault item's fields
#[derive(Clone, PartialEq, Eq)]
pub enum VaultContents {
    Decrypted(VaultRecord),
    /// The blob does not open with the current key (e.g. written under an
    /// earlier PIN)
    CannotDecrypt,
    Locked,
}

impl fmt::Debug for VaultContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decrypted(record) => f
                .debug_tuple("Decrypted")
                .field(&record.keys().collect::<Vec<_>>())
                .finish(),
            Self::CannotDecrypt => f.write_str("CannotDecrypt"),
            Self::Locked => f.write_str("Locked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultItemView {
    pub item: Synced<VaultItem>,
    pub contents: VaultContents,
}

#[derive(Clone)]
pub struct VaultService {
    store: LocalStore,
    crypto: VaultCrypto,
}

impl VaultService {
    pub const fn new(store: LocalStore, crypto: VaultCrypto) -> Self {
        Self { store, crypto }
    }

    fn key(session: &Session) -> Result<VaultKey> {
        session.vault_key().ok_or(Error::VaultLocked)
    }

    fn normalize_title(title: &str) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("Vault item title is required".to_string()));
        }
        Ok(title.to_string())
    }

    pub async fn create(
        &self,
        session: &Session,
        title: &str,
        kind: VaultItemKind,
        fields: &VaultRecord,
    ) -> Result<Synced<VaultItem>> {
        let title = Self::normalize_title(title)?;
        let key = Self::key(session)?;
        let encrypted_data = self.crypto.encrypt(fields, key.expose())?;

        self.store
            .create(VaultItem {
                title,
                kind,
                encrypted_data,
            })
            .await
    }

    /// Re-encrypt the item's fields under the current key
    pub async fn update_fields(
        &self,
        session: &Session,
        id: &RecordId,
        fields: &VaultRecord,
    ) -> Result<Synced<VaultItem>> {
        let key = Self::key(session)?;
        let encrypted_data = self.crypto.encrypt(fields, key.expose())?;
        self.store
            .modify(id, move |item: &mut VaultItem| {
                item.encrypted_data = encrypted_data;
            })
            .await
    }

    /// Titles are stored in the clear; renaming needs no key
    pub async fn rename(&self, id: &RecordId, title: &str) -> Result<Synced<VaultItem>> {
        let title = Self::normalize_title(title)?;
        self.store
            .modify(id, move |item: &mut VaultItem| item.title = title)
            .await
    }

    pub async fn delete(&self, id: &RecordId) -> Result<bool> {
        self.store.delete::<VaultItem>(id).await
    }

    pub async fn open(&self, session: &Session, id: &RecordId) -> Result<Option<VaultItemView>> {
        let key = session.vault_key();
        Ok(self
            .store
            .get::<VaultItem>(id)
            .await?
            .map(|item| self.view(item, key.as_ref())))
    }

    /// Every live vault item, decrypted where the key allows
    pub async fn list(&self, session: &Session) -> Result<Vec<VaultItemView>> {
        let key = session.vault_key();
        Ok(self
            .store
            .list::<VaultItem>()
            .await?
            .into_iter()
            .map(|item| self.view(item, key.as_ref()))
            .collect())
    }

    fn view(&self, item: Synced<VaultItem>, key: Option<&VaultKey>) -> VaultItemView {
        let contents = match key {
            None => VaultContents::Locked,
            Some(key) => match self.crypto.decrypt(&item.data.encrypted_data, key.expose()) {
                Some(record) => VaultContents::Decrypted(record),
                None => {
                    tracing::warn!("Vault item {} could not be decrypted", item.id);
                    VaultContents::CannotDecrypt
                }
            },
        };
        VaultItemView { item, contents }
    }
}

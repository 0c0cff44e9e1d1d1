//! Vault item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Collection, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VaultItemKind {
    #[default]
    Password,
    Contact,
    Note,
}

impl VaultItemKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Contact => "contact",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for VaultItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for VaultItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "contact" => Ok(Self::Contact),
            "note" => Ok(Self::Note),
            other => Err(format!("unknown vault item type '{other}'")),
        }
    }
}

/// A vault item. Only the ciphertext of its fields is ever stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultItem {
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: VaultItemKind,
    /// Opaque blob produced by [`crate::crypto::VaultCrypto::encrypt`]
    pub encrypted_data: String,
}

impl Record for VaultItem {
    const COLLECTION: Collection = Collection::VaultItems;
}

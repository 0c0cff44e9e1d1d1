//! Record identity and the sync envelope shared by every collection

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::unix_millis_now;

/// A unique identifier for a record, using UUID v7 (time-sortable).
///
/// Always generated on the client; it is the join key between the local
/// cache and the remote store and never changes once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// The five synced record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Entries,
    Reminders,
    Goals,
    Tasks,
    VaultItems,
}

impl Collection {
    /// Every collection, in push order.
    pub const ALL: [Self; 5] = [
        Self::Entries,
        Self::Reminders,
        Self::Goals,
        Self::Tasks,
        Self::VaultItems,
    ];

    /// Name of the collection in the remote store (`users/{uid}/{name}`).
    pub const fn remote_name(self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::Reminders => "reminders",
            Self::Goals => "goals",
            Self::Tasks => "tasks",
            Self::VaultItems => "vaultItems",
        }
    }

    /// Name of the local table backing the collection.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::Reminders => "reminders",
            Self::Goals => "goals",
            Self::Tasks => "tasks",
            Self::VaultItems => "vault_items",
        }
    }

    /// Resolve a collection from its remote name.
    pub fn from_remote_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.remote_name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_name())
    }
}

/// Entity payload stored in one of the synced collections.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection the entity lives in
    const COLLECTION: Collection;
}

/// A record with its sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synced<T> {
    /// Client-generated identifier
    pub id: RecordId,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms), the only conflict-resolution signal
    pub updated_at: i64,
    /// True iff the last local mutation was acknowledged by the remote store
    pub is_synced: bool,
    /// Tombstone flag; tombstones are never returned by reads
    pub is_deleted: bool,
    /// Entity fields
    pub data: T,
}

impl<T: Record> Synced<T> {
    /// Wrap a freshly created entity: new id, both timestamps now, unsynced.
    #[must_use]
    pub fn new(data: T) -> Self {
        let now = unix_millis_now();
        Self {
            id: RecordId::new(),
            created_at: now,
            updated_at: now,
            is_synced: false,
            is_deleted: false,
            data,
        }
    }

    /// Collection this record belongs to
    pub const fn collection(&self) -> Collection {
        T::COLLECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_unique() {
        let id1 = RecordId::new();
        let id2 = RecordId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-an-id".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_collection_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(
                Collection::from_remote_name(collection.remote_name()),
                Some(collection)
            );
        }
        assert_eq!(Collection::VaultItems.remote_name(), "vaultItems");
        assert_eq!(Collection::VaultItems.table(), "vault_items");
        assert_eq!(Collection::from_remote_name("settings"), None);
    }
}

//! Remote authoritative store boundary.
//!
//! The remote store is organised per user: one document per record under
//! `users/{uid}/{collection}/{id}` and a singleton document at
//! `users/{uid}/settings`. Writes are merges; the server stamps `updatedAt`
//! with its own clock. Each collection (and the settings document) exposes a
//! change feed that first replays every extant document as `Added` and then
//! delivers ordered batches of further changes.

mod http;
mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{Collection, RecordId};

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

/// Document id used for the settings singleton
pub const SETTINGS_DOCUMENT_ID: &str = "settings";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote store is unreachable")]
    Offline,
    #[error("Remote store returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Remote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A document as held by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A merge-write of one record
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub id: RecordId,
    pub fields: Map<String, Value>,
    /// Preserved when present; the server clock is used otherwise
    pub created_at: Option<i64>,
}

/// What a change feed is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedTarget {
    Collection(Collection),
    Settings,
}

impl FeedTarget {
    /// Every feed a sync session listens to
    pub fn all() -> impl Iterator<Item = Self> {
        Collection::ALL
            .into_iter()
            .map(Self::Collection)
            .chain(std::iter::once(Self::Settings))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Collection(collection) => collection.remote_name(),
            Self::Settings => SETTINGS_DOCUMENT_ID,
        }
    }
}

impl fmt::Display for FeedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Address of a feed target in the per-user namespace
pub fn document_path(uid: &str, target: FeedTarget) -> String {
    format!("users/{uid}/{}", target.name())
}

/// A single change delivered by a feed
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added(RemoteDocument),
    Modified(RemoteDocument),
    Removed(String),
}

/// One delivery from a feed: an ordered batch or a non-fatal error
pub type FeedMessage = RemoteResult<Vec<Change>>;

/// Receiving side of a change feed subscription.
///
/// Dropping the stream (or calling [`ChangeStream::unsubscribe`]) stops
/// delivery and any background polling attached to it.
pub struct ChangeStream {
    receiver: mpsc::UnboundedReceiver<FeedMessage>,
    poller: Option<JoinHandle<()>>,
}

impl ChangeStream {
    /// Create a stream and the sender the store delivers into
    pub fn channel() -> (mpsc::UnboundedSender<FeedMessage>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            sender,
            Self {
                receiver,
                poller: None,
            },
        )
    }

    /// Tie a background task's lifetime to this stream
    #[must_use]
    pub fn with_poller(mut self, poller: JoinHandle<()>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Wait for the next delivery; `None` once the feed has closed
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }

    /// Stop delivery
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl fmt::Debug for ChangeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeStream")
            .field("polling", &self.poller.is_some())
            .finish()
    }
}

/// Authoritative per-user store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Merge-write a record; returns the stored document
    async fn upsert(
        &self,
        uid: &str,
        collection: Collection,
        write: RemoteWrite,
    ) -> RemoteResult<RemoteDocument>;

    /// Delete a record; deleting a missing document succeeds
    async fn delete(&self, uid: &str, collection: Collection, id: &RecordId) -> RemoteResult<()>;

    /// Merge-write the settings singleton; returns the stored document
    async fn upsert_settings(
        &self,
        uid: &str,
        fields: Map<String, Value>,
    ) -> RemoteResult<RemoteDocument>;

    /// Current documents of a collection or the settings document
    async fn snapshot(&self, uid: &str, target: FeedTarget) -> RemoteResult<Vec<RemoteDocument>>;

    /// Subscribe to a collection or the settings document
    async fn subscribe(&self, uid: &str, target: FeedTarget) -> RemoteResult<ChangeStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_paths_follow_user_namespace() {
        assert_eq!(
            document_path("u1", FeedTarget::Collection(Collection::VaultItems)),
            "users/u1/vaultItems"
        );
        assert_eq!(document_path("u1", FeedTarget::Settings), "users/u1/settings");
        assert_eq!(FeedTarget::all().count(), 6);
    }

    #[test]
    fn remote_document_uses_camel_case() {
        let document = RemoteDocument {
            id: "a".to_string(),
            fields: Map::new(),
            created_at: 1,
            updated_at: 2,
        };
        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["createdAt"], 1);
        assert_eq!(value["updatedAt"], 2);
    }
}

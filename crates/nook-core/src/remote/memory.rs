//! In-process remote store
//!
//! Behaves like the hosted document store: merge-writes stamped with a
//! monotonic server clock, per-target change feeds that replay a snapshot
//! on subscribe, and delete notifications only for documents that existed.
//! Tests drive it directly to simulate other devices, outages and
//! transient failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::{
    Change, ChangeStream, FeedMessage, FeedTarget, RemoteDocument, RemoteError, RemoteResult,
    RemoteStore, RemoteWrite, SETTINGS_DOCUMENT_ID,
};
use crate::models::{Collection, RecordId};
use crate::util::unix_millis_now;

type Subscribers = Vec<mpsc::UnboundedSender<FeedMessage>>;

#[derive(Default)]
struct State {
    documents: HashMap<(String, FeedTarget), BTreeMap<String, RemoteDocument>>,
    subscribers: HashMap<(String, FeedTarget), Subscribers>,
    offline: bool,
    failures_remaining: u32,
    latency: Option<Duration>,
    last_timestamp: i64,
    writes: u64,
}

impl State {
    /// Server clock: wall time, strictly increasing across writes
    fn tick(&mut self) -> i64 {
        self.last_timestamp = unix_millis_now().max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn check_available(&mut self) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Offline);
        }
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn notify(&mut self, key: &(String, FeedTarget), message: &FeedMessage) {
        if let Some(subscribers) = self.subscribers.get_mut(key) {
            subscribers.retain(|sender| sender.send(clone_message(message)).is_ok());
        }
    }

    fn merge(
        &mut self,
        key: (String, FeedTarget),
        id: String,
        fields: Map<String, Value>,
        created_at: Option<i64>,
        updated_at: i64,
    ) -> RemoteDocument {
        let documents = self.documents.entry(key.clone()).or_default();
        let (document, change) = if let Some(existing) = documents.get_mut(&id) {
            existing.fields.extend(fields);
            existing.updated_at = updated_at;
            (existing.clone(), Change::Modified(existing.clone()))
        } else {
            let document = RemoteDocument {
                id: id.clone(),
                fields,
                created_at: created_at.unwrap_or(updated_at),
                updated_at,
            };
            documents.insert(id, document.clone());
            (document.clone(), Change::Added(document))
        };

        self.notify(&key, &Ok(vec![change]));
        document
    }

    fn remove(&mut self, key: (String, FeedTarget), id: &str) {
        let existed = self
            .documents
            .get_mut(&key)
            .and_then(|documents| documents.remove(id))
            .is_some();
        if existed {
            self.notify(&key, &Ok(vec![Change::Removed(id.to_string())]));
        }
    }
}

fn clone_message(message: &FeedMessage) -> FeedMessage {
    match message {
        Ok(changes) => Ok(changes.clone()),
        Err(error) => Err(RemoteError::Unavailable(error.to_string())),
    }
}

/// Shared, cloneable in-memory remote store
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<State>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate losing (or regaining) connectivity; writes fail while offline
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make the next `count` writes fail with a transient error
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    /// Delay every write by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Number of writes (upserts and deletes) that reached the store
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    /// Fetch one document
    pub fn document(&self, uid: &str, target: FeedTarget, id: &str) -> Option<RemoteDocument> {
        self.lock()
            .documents
            .get(&(uid.to_string(), target))
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    /// All documents of a target, ordered by id
    pub fn documents(&self, uid: &str, target: FeedTarget) -> Vec<RemoteDocument> {
        self.lock()
            .documents
            .get(&(uid.to_string(), target))
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write a document as another device would, with an explicit timestamp
    pub fn put_external(
        &self,
        uid: &str,
        target: FeedTarget,
        id: &str,
        fields: Map<String, Value>,
        updated_at: i64,
    ) -> RemoteDocument {
        let mut state = self.lock();
        state.last_timestamp = state.last_timestamp.max(updated_at);
        state.merge(
            (uid.to_string(), target),
            id.to_string(),
            fields,
            Some(updated_at),
            updated_at,
        )
    }

    /// Delete a document as another device would
    pub fn remove_external(&self, uid: &str, target: FeedTarget, id: &str) {
        self.lock().remove((uid.to_string(), target), id);
    }

    /// Deliver a feed error to every subscriber of a target
    pub fn emit_error(&self, uid: &str, target: FeedTarget, message: &str) {
        let error = Err(RemoteError::Unavailable(message.to_string()));
        self.lock().notify(&(uid.to_string(), target), &error);
    }

    /// Number of open subscriptions to a target
    pub fn subscriber_count(&self, uid: &str, target: FeedTarget) -> usize {
        self.lock()
            .subscribers
            .get(&(uid.to_string(), target))
            .map_or(0, |subscribers| {
                subscribers.iter().filter(|sender| !sender.is_closed()).count()
            })
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(
        &self,
        uid: &str,
        collection: Collection,
        write: RemoteWrite,
    ) -> RemoteResult<RemoteDocument> {
        self.delay().await;
        let mut state = self.lock();
        state.check_available()?;
        state.writes += 1;
        let updated_at = state.tick();
        Ok(state.merge(
            (uid.to_string(), FeedTarget::Collection(collection)),
            write.id.as_str(),
            write.fields,
            write.created_at,
            updated_at,
        ))
    }

    async fn delete(&self, uid: &str, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        self.delay().await;
        let mut state = self.lock();
        state.check_available()?;
        state.writes += 1;
        state.remove(
            (uid.to_string(), FeedTarget::Collection(collection)),
            &id.as_str(),
        );
        Ok(())
    }

    async fn upsert_settings(
        &self,
        uid: &str,
        fields: Map<String, Value>,
    ) -> RemoteResult<RemoteDocument> {
        self.delay().await;
        let mut state = self.lock();
        state.check_available()?;
        state.writes += 1;
        let updated_at = state.tick();
        Ok(state.merge(
            (uid.to_string(), FeedTarget::Settings),
            SETTINGS_DOCUMENT_ID.to_string(),
            fields,
            None,
            updated_at,
        ))
    }

    async fn snapshot(&self, uid: &str, target: FeedTarget) -> RemoteResult<Vec<RemoteDocument>> {
        self.delay().await;
        self.lock().check_available()?;
        Ok(self.documents(uid, target))
    }

    async fn subscribe(&self, uid: &str, target: FeedTarget) -> RemoteResult<ChangeStream> {
        let (sender, stream) = ChangeStream::channel();
        let key = (uid.to_string(), target);
        let mut state = self.lock();

        let snapshot: Vec<Change> = state
            .documents
            .get(&key)
            .map(|documents| documents.values().cloned().map(Change::Added).collect())
            .unwrap_or_default();
        if !snapshot.is_empty() {
            // Receiver is alive: it is owned by `stream`
            let _ = sender.send(Ok(snapshot));
        }

        state.subscribers.entry(key).or_default().push(sender);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    const ENTRIES: FeedTarget = FeedTarget::Collection(Collection::Entries);

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_merges_and_preserves_created_at() {
        let store = MemoryRemoteStore::new();
        let id = RecordId::new();

        let first = store
            .upsert(
                "u1",
                Collection::Entries,
                RemoteWrite {
                    id,
                    fields: fields(json!({"title": "a", "content": "x"})),
                    created_at: Some(5),
                },
            )
            .await
            .unwrap();
        let second = store
            .upsert(
                "u1",
                Collection::Entries,
                RemoteWrite {
                    id,
                    fields: fields(json!({"title": "b"})),
                    created_at: Some(99),
                },
            )
            .await
            .unwrap();

        assert_eq!(second.created_at, 5);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.fields["title"], "b");
        assert_eq!(second.fields["content"], "x");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscribe_replays_snapshot_then_changes() {
        let store = MemoryRemoteStore::new();
        store.put_external("u1", ENTRIES, "a", fields(json!({"title": "a"})), 10);

        let mut stream = store.subscribe("u1", ENTRIES).await.unwrap();
        let snapshot = stream.next().await.unwrap().unwrap();
        assert!(matches!(&snapshot[..], [Change::Added(doc)] if doc.id == "a"));

        store.remove_external("u1", ENTRIES, "a");
        store.remove_external("u1", ENTRIES, "missing");
        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch, vec![Change::Removed("a".to_string())]);

        store.emit_error("u1", ENTRIES, "listener reset");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_and_injected_failures() {
        let store = MemoryRemoteStore::new();
        let id = RecordId::new();

        store.set_offline(true);
        assert!(matches!(
            store.delete("u1", Collection::Tasks, &id).await,
            Err(RemoteError::Offline)
        ));
        store.set_offline(false);

        store.fail_next(1);
        assert!(store.delete("u1", Collection::Tasks, &id).await.is_err());
        assert!(store.delete("u1", Collection::Tasks, &id).await.is_ok());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_stream_unsubscribes() {
        let store = MemoryRemoteStore::new();
        let stream = store.subscribe("u1", FeedTarget::Settings).await.unwrap();
        assert_eq!(store.subscriber_count("u1", FeedTarget::Settings), 1);

        stream.unsubscribe();
        assert_eq!(store.subscriber_count("u1", FeedTarget::Settings), 0);
    }
}

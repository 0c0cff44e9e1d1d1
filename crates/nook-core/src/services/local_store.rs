//! Device-resident cache shared by the UI, the sync engine and the vault.
//!
//! All access goes through one `tokio::sync::Mutex` around the connection,
//! so a pull-side write and a push-side acknowledgement can never interleave
//! on the same row. Every local mutation enqueues its outbox entry in the
//! same transaction as the row write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};

use crate::db::{
    Database, LibSqlOutboxRepository, LibSqlRecordRepository, LibSqlSettingsRepository,
    OutboxEntry, OutboxOp, OutboxRepository, RawRecord, RecordRepository, SettingsRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    Collection, Entry, Goal, GoalStatus, Record, RecordId, Reminder, Settings, SettingsRow,
    Synced, Task, VaultItem,
};
use crate::remote::RemoteDocument;
use crate::util::next_mutation_timestamp;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    /// Tombstoned locally
    Deleted,
    /// Physically removed after a remote deletion
    Removed,
    /// Replaced by a newer remote copy
    Pulled,
}

/// Notification emitted after every committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Record {
        collection: Collection,
        id: RecordId,
        kind: ChangeKind,
    },
    Settings,
    Cleared,
}

/// Result of offering a remote copy to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The local row is at least as new (or the document was unusable)
    Skipped,
}

/// Thread-safe local store.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    changes: broadcast::Sender<StoreChange>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            changes,
        }
    }

    /// Filesystem path of the backing database, if any.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Subscribe to committed writes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine
        let _ = self.changes.send(change);
    }

    fn notify_record(&self, collection: Collection, id: RecordId, kind: ChangeKind) {
        self.notify(StoreChange::Record {
            collection,
            id,
            kind,
        });
    }

    // Typed CRUD

    /// Create a record: new id, both timestamps now, unsynced
    pub async fn create<T: Record>(&self, data: T) -> Result<Synced<T>> {
        let record = Synced::new(data);
        let raw = RawRecord::from_synced(&record)?;
        {
            let db = self.db.lock().await;
            let tx = db.connection().transaction().await?;
            LibSqlRecordRepository::new(&tx)
                .insert(T::COLLECTION, &raw)
                .await?;
            LibSqlOutboxRepository::new(&tx)
                .enqueue(T::COLLECTION, &record.id, OutboxOp::Upsert, record.updated_at)
                .await?;
            tx.commit().await?;
        }
        self.notify_record(T::COLLECTION, record.id, ChangeKind::Created);
        Ok(record)
    }

    /// Get a live record
    pub async fn get<T: Record>(&self, id: &RecordId) -> Result<Option<Synced<T>>> {
        let db = self.db.lock().await;
        let raw = LibSqlRecordRepository::new(db.connection())
            .get(T::COLLECTION, id, false)
            .await?;
        raw.map(RawRecord::into_synced).transpose()
    }

    /// List live records, most recently updated first
    pub async fn list<T: Record>(&self) -> Result<Vec<Synced<T>>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list(T::COLLECTION)
            .await?
            .into_iter()
            .map(RawRecord::into_synced)
            .collect()
    }

    /// Replace the entity fields of a live record
    pub async fn update<T: Record>(&self, id: &RecordId, data: T) -> Result<Synced<T>> {
        self.modify(id, move |current: &mut T| *current = data).await
    }

    /// Edit a live record in place
    pub async fn modify<T, F>(&self, id: &RecordId, edit: F) -> Result<Synced<T>>
    where
        T: Record,
        F: FnOnce(&mut T),
    {
        let record = {
            let db = self.db.lock().await;
            let tx = db.connection().transaction().await?;
            let records = LibSqlRecordRepository::new(&tx);

            let current = records
                .get(T::COLLECTION, id, false)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", T::COLLECTION)))?;
            let mut record: Synced<T> = current.into_synced()?;
            edit(&mut record.data);
            record.updated_at = next_mutation_timestamp(record.updated_at);
            record.is_synced = false;

            let payload = serde_json::to_value(&record.data)?;
            records
                .update_payload(T::COLLECTION, id, &payload, record.updated_at)
                .await?;
            LibSqlOutboxRepository::new(&tx)
                .enqueue(T::COLLECTION, id, OutboxOp::Upsert, record.updated_at)
                .await?;
            tx.commit().await?;
            record
        };
        self.notify_record(T::COLLECTION, record.id, ChangeKind::Updated);
        Ok(record)
    }

    /// Tombstone a live record; returns false when there was nothing to delete
    pub async fn delete<T: Record>(&self, id: &RecordId) -> Result<bool> {
        self.delete_in(T::COLLECTION, id).await
    }

    /// Tombstone a live record of any collection. Deleting a goal also
    /// tombstones its tasks.
    pub async fn delete_in(&self, collection: Collection, id: &RecordId) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            let tx = db.connection().transaction().await?;

            let mut deleted = Vec::new();
            if tombstone(&tx, collection, id).await? {
                deleted.push((collection, *id));
                if collection == Collection::Goals {
                    let tasks = LibSqlRecordRepository::new(&tx)
                        .list_by_field(Collection::Tasks, "goalId", &id.as_str())
                        .await?;
                    for task in tasks {
                        if tombstone(&tx, Collection::Tasks, &task.id).await? {
                            deleted.push((Collection::Tasks, task.id));
                        }
                    }
                }
            }
            tx.commit().await?;
            deleted
        };

        if deleted.len() > 1 {
            tracing::debug!("Deleted goal {} with {} tasks", id, deleted.len() - 1);
        }
        let found = !deleted.is_empty();
        for (collection, id) in deleted {
            self.notify_record(collection, id, ChangeKind::Deleted);
        }
        Ok(found)
    }

    // Domain helpers

    /// Live tasks of a goal, oldest first
    pub async fn list_tasks_for_goal(&self, goal_id: &RecordId) -> Result<Vec<Synced<Task>>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_by_field(Collection::Tasks, "goalId", &goal_id.as_str())
            .await?
            .into_iter()
            .map(RawRecord::into_synced)
            .collect()
    }

    /// Add a task to a live goal
    pub async fn add_task(&self, goal_id: &RecordId, text: &str) -> Result<Synced<Task>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("task text cannot be empty".to_string()));
        }
        if self.get::<Goal>(goal_id).await?.is_none() {
            return Err(Error::NotFound(format!("goal {goal_id}")));
        }
        self.create(Task::new(*goal_id, text)).await
    }

    pub async fn set_task_completed(&self, id: &RecordId, completed: bool) -> Result<Synced<Task>> {
        self.modify(id, |task: &mut Task| task.completed = completed)
            .await
    }

    pub async fn set_goal_status(&self, id: &RecordId, status: GoalStatus) -> Result<Synced<Goal>> {
        self.modify(id, |goal: &mut Goal| goal.status = status).await
    }

    /// Live reminders due on a `YYYY-MM-DD` day
    pub async fn list_reminders_due(&self, date_key: &str) -> Result<Vec<Synced<Reminder>>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_by_field(Collection::Reminders, "dueDate", date_key.trim())
            .await?
            .into_iter()
            .map(RawRecord::into_synced)
            .collect()
    }

    // Settings

    /// Current settings, defaults when never saved
    pub async fn load_settings(&self) -> Result<Settings> {
        Ok(self.settings_row().await?.settings)
    }

    /// Settings with their sync metadata
    pub async fn settings_row(&self) -> Result<SettingsRow> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection()).load().await
    }

    /// Save settings edited on this device; marks them dirty
    pub async fn save_settings(&self, settings: &Settings) -> Result<SettingsRow> {
        self.update_settings(|current| *current = settings.clone())
            .await
    }

    /// Edit settings in place; marks them dirty
    pub async fn update_settings<F>(&self, edit: F) -> Result<SettingsRow>
    where
        F: FnOnce(&mut Settings),
    {
        let row = {
            let db = self.db.lock().await;
            let repo = LibSqlSettingsRepository::new(db.connection());
            let mut row = repo.load().await?;
            edit(&mut row.settings);
            row.updated_at = next_mutation_timestamp(row.updated_at);
            row.is_synced = false;
            repo.save(&row.settings, row.updated_at).await?;
            row
        };
        self.notify(StoreChange::Settings);
        Ok(row)
    }

    // Sync-facing API

    /// A stored row including tombstones
    pub async fn raw_record(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<RawRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .get(collection, id, true)
            .await
    }

    /// Outbox entries of a collection due for an attempt at `now`
    pub async fn due_outbox(&self, collection: Collection, now: i64) -> Result<Vec<OutboxEntry>> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .due(collection, now)
            .await
    }

    /// Acknowledge a pushed mutation.
    ///
    /// The row is marked synced and the outbox entry cleared only if both
    /// still describe the pushed version; a newer local edit stays pending.
    pub async fn mark_pushed(&self, entry: &OutboxEntry) -> Result<bool> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let completed = LibSqlOutboxRepository::new(&tx)
            .complete(entry.collection, &entry.record_id, entry.version)
            .await?;
        LibSqlRecordRepository::new(&tx)
            .mark_synced(entry.collection, &entry.record_id, entry.version)
            .await?;
        tx.commit().await?;
        Ok(completed)
    }

    /// Record a failed push and defer the entry until `next_attempt_at`
    pub async fn record_push_failure(
        &self,
        entry: &OutboxEntry,
        next_attempt_at: i64,
        error: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .record_failure(entry, next_attempt_at, error)
            .await
    }

    /// Offer a remote copy to the store.
    ///
    /// The copy is written (as synced) only if no local row exists or the
    /// local row is strictly older; a pending local mutation it replaces is
    /// dropped from the outbox.
    pub async fn apply_remote(
        &self,
        collection: Collection,
        document: &RemoteDocument,
    ) -> Result<ApplyOutcome> {
        let Ok(id) = document.id.parse::<RecordId>() else {
            tracing::warn!("Ignoring {} document with invalid id {}", collection, document.id);
            return Ok(ApplyOutcome::Skipped);
        };
        let payload = Value::Object(document.fields.clone());
        if !payload_is_valid(collection, &payload) {
            tracing::warn!("Ignoring malformed {} document {}", collection, id);
            return Ok(ApplyOutcome::Skipped);
        }

        let outcome = {
            let db = self.db.lock().await;
            let tx = db.connection().transaction().await?;
            let records = LibSqlRecordRepository::new(&tx);

            let existing = records.get(collection, &id, true).await?;
            if existing.is_some_and(|local| local.updated_at >= document.updated_at) {
                ApplyOutcome::Skipped
            } else {
                records
                    .put(
                        collection,
                        &RawRecord {
                            id,
                            payload,
                            created_at: document.created_at,
                            updated_at: document.updated_at,
                            is_synced: true,
                            is_deleted: false,
                        },
                    )
                    .await?;
                LibSqlOutboxRepository::new(&tx)
                    .discard(collection, &id)
                    .await?;
                tx.commit().await?;
                ApplyOutcome::Applied
            }
        };

        if outcome == ApplyOutcome::Applied {
            self.notify_record(collection, id, ChangeKind::Pulled);
        }
        Ok(outcome)
    }

    /// Physically remove a row deleted remotely
    pub async fn remove_local(&self, collection: Collection, id: &str) -> Result<bool> {
        let Ok(id) = id.parse::<RecordId>() else {
            tracing::warn!("Ignoring {} removal with invalid id {}", collection, id);
            return Ok(false);
        };

        let removed = {
            let db = self.db.lock().await;
            let tx = db.connection().transaction().await?;
            let removed = LibSqlRecordRepository::new(&tx)
                .remove(collection, &id)
                .await?;
            LibSqlOutboxRepository::new(&tx)
                .discard(collection, &id)
                .await?;
            tx.commit().await?;
            removed
        };

        if removed {
            self.notify_record(collection, id, ChangeKind::Removed);
        }
        Ok(removed)
    }

    /// Live records the remote has acknowledged with nothing left to push
    pub async fn settled_ids(&self, collection: Collection) -> Result<Vec<RecordId>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .settled_ids(collection)
            .await
    }

    /// Settings as a remote field map
    pub fn settings_fields(settings: &Settings) -> Result<Map<String, Value>> {
        match serde_json::to_value(settings)? {
            Value::Object(fields) => Ok(fields),
            _ => Err(Error::InvalidInput(
                "settings must serialize to an object".to_string(),
            )),
        }
    }

    /// Mark settings synced if they still carry the pushed version
    pub async fn mark_settings_synced(&self, version: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .mark_synced(version)
            .await
    }

    /// Offer the remote settings document; same rule as [`Self::apply_remote`]
    pub async fn apply_remote_settings(&self, document: &RemoteDocument) -> Result<ApplyOutcome> {
        let Ok(settings) = serde_json::from_value::<Settings>(Value::Object(document.fields.clone()))
        else {
            tracing::warn!("Ignoring malformed settings document");
            return Ok(ApplyOutcome::Skipped);
        };

        let outcome = {
            let db = self.db.lock().await;
            let repo = LibSqlSettingsRepository::new(db.connection());
            let local = repo.load().await?;
            if local.updated_at >= document.updated_at {
                ApplyOutcome::Skipped
            } else {
                repo.put_synced(&settings, document.updated_at).await?;
                ApplyOutcome::Applied
            }
        };

        if outcome == ApplyOutcome::Applied {
            self.notify(StoreChange::Settings);
        }
        Ok(outcome)
    }

    /// Number of mutations waiting to be pushed
    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection()).count().await
    }

    /// Physically remove tombstones whose deletion the remote acknowledged.
    ///
    /// Never called by the sync engine; acknowledged tombstones are kept
    /// unless a caller opts in.
    pub async fn purge_synced_tombstones(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let records = LibSqlRecordRepository::new(db.connection());
        let mut purged = 0;
        for collection in Collection::ALL {
            purged += records.purge_synced_tombstones(collection).await?;
        }
        if purged > 0 {
            tracing::info!("Purged {} acknowledged tombstones", purged);
        }
        Ok(purged)
    }

    /// Remove every record, the settings and the outbox
    pub async fn clear_all(&self) -> Result<()> {
        {
            let db = self.db.lock().await;
            let tx = db.connection().transaction().await?;
            let records = LibSqlRecordRepository::new(&tx);
            for collection in Collection::ALL {
                records.clear(collection).await?;
            }
            LibSqlSettingsRepository::new(&tx).clear().await?;
            LibSqlOutboxRepository::new(&tx).clear().await?;
            tx.commit().await?;
        }
        tracing::info!("Cleared local store");
        self.notify(StoreChange::Cleared);
        Ok(())
    }
}

/// Tombstone a row and enqueue its deletion
async fn tombstone(conn: &libsql::Connection, collection: Collection, id: &RecordId) -> Result<bool> {
    let records = LibSqlRecordRepository::new(conn);
    let Some(current) = records.get(collection, id, false).await? else {
        return Ok(false);
    };
    let updated_at = next_mutation_timestamp(current.updated_at);
    if !records.tombstone(collection, id, updated_at).await? {
        return Ok(false);
    }
    LibSqlOutboxRepository::new(conn)
        .enqueue(collection, id, OutboxOp::Delete, updated_at)
        .await?;
    Ok(true)
}

fn payload_is_valid(collection: Collection, payload: &Value) -> bool {
    fn parses<T: Record>(payload: &Value) -> bool {
        T::deserialize(payload).is_ok()
    }

    match collection {
        Collection::Entries => parses::<Entry>(payload),
        Collection::Reminders => parses::<Reminder>(payload),
        Collection::Goals => parses::<Goal>(payload),
        Collection::Tasks => parses::<Task>(payload),
        Collection::VaultItems => parses::<VaultItem>(payload),
    }
}

//! Sync engine: reconciles the local store with the remote store.
//!
//! Push drains the outbox on a timer; overlapping cycles are skipped, never
//! queued. Pull keeps one change-feed listener per collection plus one for
//! settings and applies every batch in delivery order under the
//! last-write-wins rule of [`LocalStore::apply_remote`].

mod backoff;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{OutboxEntry, OutboxOp};
use crate::error::Result;
use crate::models::{Collection, RecordId};
use crate::remote::{Change, ChangeStream, FeedTarget, RemoteStore, RemoteWrite};
use crate::services::{ApplyOutcome, LocalStore};
use crate::state::SyncState;
use crate::util::unix_millis_now;

pub use backoff::Backoff;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timing of a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    push_interval: Duration,
    poll_interval: Duration,
    backoff: Backoff,
}

impl SyncConfig {
    pub const MIN_PUSH_INTERVAL: Duration = Duration::from_secs(10);
    pub const MAX_PUSH_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(15);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Push interval, clamped to 10..=30 seconds
    #[must_use]
    pub fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = interval.clamp(Self::MIN_PUSH_INTERVAL, Self::MAX_PUSH_INTERVAL);
        self
    }

    /// Poll interval for remote stores that emulate change feeds
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub const fn push_interval(&self) -> Duration {
        self.push_interval
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_interval: Self::DEFAULT_PUSH_INTERVAL,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            backoff: Backoff::default(),
        }
    }
}

/// Outcome of one push cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Another cycle was in flight; nothing was attempted
    pub skipped: bool,
    pub settings_pushed: bool,
    pub upserted: usize,
    pub deleted: usize,
    /// Attempts left for retry (settings included)
    pub failed: usize,
}

/// Observable sync activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    PushCompleted(PushReport),
    /// A change feed reported an error; the local cache is left as is
    FeedError { target: FeedTarget, message: String },
    /// A remote copy replaced (or created) a local row
    RemoteApplied { target: FeedTarget, id: String },
    /// A remote deletion removed a local row
    RemoteRemoved { collection: Collection, id: String },
}

enum EntryOutcome {
    Pushed(OutboxOp),
    /// The row changed after the entry was read; the next cycle picks it up
    Superseded,
    Failed,
}

/// Clears the in-flight flag when dropped, including on panic or cancellation
struct PushGuard<'a>(&'a AtomicBool);

impl<'a> PushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    uid: String,
    config: SyncConfig,
    pushing: AtomicBool,
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

/// Sync engine for one signed-in user. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        uid: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Offline);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                uid: uid.into(),
                config,
                pushing: AtomicBool::new(false),
                state,
                events,
            }),
        }
    }

    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    pub fn config(&self) -> SyncConfig {
        self.inner.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Current sync state
    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    /// Watch sync state transitions
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to sync events
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    fn set_state(&self, state: SyncState) {
        self.inner.state.send_replace(state);
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Run one push cycle unless one is already in flight
    pub async fn push_once(&self) -> Result<PushReport> {
        let Some(_guard) = PushGuard::acquire(&self.inner.pushing) else {
            tracing::debug!("Push already in flight, skipping");
            return Ok(PushReport {
                skipped: true,
                ..PushReport::default()
            });
        };

        self.set_state(SyncState::Syncing);
        let report = match self.push_pending().await {
            Ok(report) => report,
            Err(error) => {
                tracing::error!("Push cycle aborted: {}", error);
                self.set_state(SyncState::Error);
                return Err(error);
            }
        };

        self.set_state(if report.failed == 0 {
            SyncState::Synced
        } else {
            SyncState::Error
        });
        if report.upserted + report.deleted + report.failed > 0 {
            tracing::info!(
                "Push cycle: {} upserted, {} deleted, {} failed, settings pushed: {}",
                report.upserted,
                report.deleted,
                report.failed,
                report.settings_pushed
            );
        }
        self.emit(SyncEvent::PushCompleted(report.clone()));
        Ok(report)
    }

    async fn push_pending(&self) -> Result<PushReport> {
        let mut report = PushReport::default();

        match self.push_settings().await {
            Ok(pushed) => report.settings_pushed = pushed,
            Err(error) => {
                tracing::warn!("Failed to push settings: {}", error);
                report.failed += 1;
            }
        }

        let now = unix_millis_now();
        for collection in Collection::ALL {
            let entries = self.inner.store.due_outbox(collection, now).await?;
            // Rows are independent; one failure never aborts the batch
            let outcomes = join_all(entries.iter().map(|entry| self.push_entry(entry))).await;
            for outcome in outcomes {
                match outcome? {
                    EntryOutcome::Pushed(OutboxOp::Upsert) => report.upserted += 1,
                    EntryOutcome::Pushed(OutboxOp::Delete) => report.deleted += 1,
                    EntryOutcome::Superseded => {}
                    EntryOutcome::Failed => report.failed += 1,
                }
            }
        }

        Ok(report)
    }

    /// Upsert the local settings row on every cycle once one exists.
    ///
    /// A device that never saved settings pushes nothing, so it cannot
    /// overwrite the remote document with defaults before its first pull.
    async fn push_settings(&self) -> Result<bool> {
        let row = self.inner.store.settings_row().await?;
        if row.updated_at == 0 {
            return Ok(false);
        }
        let fields = LocalStore::settings_fields(&row.settings)?;
        self.inner
            .remote
            .upsert_settings(&self.inner.uid, fields)
            .await?;
        if !row.is_synced {
            self.inner.store.mark_settings_synced(row.updated_at).await?;
        }
        tracing::debug!("Pushed settings (dirty: {})", !row.is_synced);
        Ok(true)
    }

    async fn push_entry(&self, entry: &OutboxEntry) -> Result<EntryOutcome> {
        let remote = &self.inner.remote;
        let uid = self.inner.uid.as_str();

        let result = match entry.op {
            OutboxOp::Upsert => {
                let Some(raw) = self
                    .inner
                    .store
                    .raw_record(entry.collection, &entry.record_id)
                    .await?
                else {
                    return Ok(EntryOutcome::Superseded);
                };
                if raw.is_deleted || raw.updated_at != entry.version {
                    return Ok(EntryOutcome::Superseded);
                }
                let Value::Object(fields) = raw.payload else {
                    tracing::warn!(
                        "Stored {} {} has a non-object payload",
                        entry.collection,
                        entry.record_id
                    );
                    return Ok(EntryOutcome::Failed);
                };
                remote
                    .upsert(
                        uid,
                        entry.collection,
                        RemoteWrite {
                            id: raw.id,
                            fields,
                            created_at: Some(raw.created_at),
                        },
                    )
                    .await
                    .map(|_| ())
            }
            OutboxOp::Delete => remote.delete(uid, entry.collection, &entry.record_id).await,
        };

        match result {
            Ok(()) => {
                self.inner.store.mark_pushed(entry).await?;
                Ok(EntryOutcome::Pushed(entry.op))
            }
            Err(error) => {
                let failures = entry.attempts.saturating_add(1);
                let delay = self.inner.config.backoff.delay_millis(failures);
                tracing::warn!(
                    "Push of {} {} failed (attempt {}), retrying in {} ms: {}",
                    entry.collection,
                    entry.record_id,
                    failures,
                    delay,
                    error
                );
                self.inner
                    .store
                    .record_push_failure(
                        entry,
                        unix_millis_now().saturating_add(delay),
                        &error.to_string(),
                    )
                    .await?;
                Ok(EntryOutcome::Failed)
            }
        }
    }

    /// Apply one change-feed batch strictly in delivery order.
    ///
    /// Returns the number of local rows written or removed.
    pub async fn apply_changes(&self, target: FeedTarget, changes: Vec<Change>) -> Result<usize> {
        let store = &self.inner.store;
        let mut applied = 0;

        for change in changes {
            match (target, change) {
                (FeedTarget::Collection(collection), Change::Added(document) | Change::Modified(document)) => {
                    if store.apply_remote(collection, &document).await? == ApplyOutcome::Applied {
                        applied += 1;
                        self.emit(SyncEvent::RemoteApplied {
                            target,
                            id: document.id,
                        });
                    }
                }
                (FeedTarget::Collection(collection), Change::Removed(id)) => {
                    if store.remove_local(collection, &id).await? {
                        applied += 1;
                        self.emit(SyncEvent::RemoteRemoved { collection, id });
                    }
                }
                (FeedTarget::Settings, Change::Added(document) | Change::Modified(document)) => {
                    if store.apply_remote_settings(&document).await? == ApplyOutcome::Applied {
                        applied += 1;
                        self.emit(SyncEvent::RemoteApplied {
                            target,
                            id: document.id,
                        });
                    }
                }
                (FeedTarget::Settings, Change::Removed(_)) => {
                    tracing::debug!("Remote settings removed; keeping local copy");
                }
            }
        }

        Ok(applied)
    }

    /// Fetch the current remote state of every target once and apply it.
    ///
    /// A settled local record (acknowledged, nothing queued) that is missing
    /// from its collection snapshot was deleted remotely and is removed. The
    /// settled set is read on both sides of the snapshot so a record pushed or
    /// edited meanwhile is never dropped.
    pub async fn pull_once(&self) -> Result<usize> {
        let mut applied = 0;
        for target in FeedTarget::all() {
            let settled_before = match target {
                FeedTarget::Collection(collection) => {
                    self.inner.store.settled_ids(collection).await?
                }
                FeedTarget::Settings => Vec::new(),
            };

            let documents = self
                .inner
                .remote
                .snapshot(&self.inner.uid, target)
                .await?;

            let mut removed = Vec::new();
            if let FeedTarget::Collection(collection) = target {
                let present: HashSet<&str> =
                    documents.iter().map(|document| document.id.as_str()).collect();
                let settled_after: HashSet<RecordId> = self
                    .inner
                    .store
                    .settled_ids(collection)
                    .await?
                    .into_iter()
                    .collect();
                removed = settled_before
                    .into_iter()
                    .filter(|id| settled_after.contains(id))
                    .map(|id| id.to_string())
                    .filter(|id| !present.contains(id.as_str()))
                    .map(Change::Removed)
                    .collect();
            }

            let mut changes: Vec<Change> = documents.into_iter().map(Change::Added).collect();
            changes.extend(removed);
            applied += self.apply_changes(target, changes).await?;
        }
        tracing::debug!("Pulled {} remote changes", applied);
        Ok(applied)
    }

    /// Subscribe to every feed and start the push timer.
    ///
    /// The first push runs immediately.
    pub async fn start(&self) -> Result<SyncHandle> {
        let mut handle = SyncHandle {
            engine: self.clone(),
            tasks: Vec::new(),
        };

        for target in FeedTarget::all() {
            // On error `handle` is dropped, aborting listeners already spawned
            let stream = self
                .inner
                .remote
                .subscribe(&self.inner.uid, target)
                .await?;
            handle
                .tasks
                .push(tokio::spawn(self.clone().listen(target, stream)));
        }
        handle
            .tasks
            .push(tokio::spawn(self.clone().run_push_timer()));

        tracing::info!(
            "Sync started for user {} (push every {:?})",
            self.inner.uid,
            self.inner.config.push_interval
        );
        Ok(handle)
    }

    async fn listen(self, target: FeedTarget, mut stream: ChangeStream) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(changes) => {
                    if let Err(error) = self.apply_changes(target, changes).await {
                        tracing::error!("Failed to apply {} changes: {}", target, error);
                    }
                }
                Err(error) => {
                    tracing::warn!("{} feed error: {}", target, error);
                    self.emit(SyncEvent::FeedError {
                        target,
                        message: error.to_string(),
                    });
                }
            }
        }
        tracing::debug!("{} feed closed", target);
    }

    async fn run_push_timer(self) {
        let mut interval = tokio::time::interval(self.inner.config.push_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(error) = self.push_once().await {
                tracing::warn!("Scheduled push failed: {}", error);
            }
        }
    }
}

/// Running sync session. Dropping it aborts every task; prefer
/// [`SyncHandle::shutdown`], which also waits for them to stop.
pub struct SyncHandle {
    engine: SyncEngine,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Cancel the push timer and every feed listener and wait for them
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            if let Err(error) = task.await {
                if !error.is_cancelled() {
                    tracing::error!("Sync task failed during shutdown: {}", error);
                }
            }
        }
        self.engine.set_state(SyncState::Offline);
        tracing::info!("Sync stopped for user {}", self.engine.uid());
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

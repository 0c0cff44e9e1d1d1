//! Pending-mutation outbox
//!
//! Every local mutation enqueues one entry keyed by `(collection, record_id)`.
//! A later mutation of the same record replaces the pending entry, so the
//! push path only ever sees the latest operation per record.

use crate::error::{Error, Result};
use crate::models::{Collection, RecordId};
use libsql::Connection;

/// Operation to replay against the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxOp {
    Upsert,
    Delete,
}

impl OutboxOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(Error::Database(format!("unknown outbox op: {other}"))),
        }
    }
}

/// A pending mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub collection: Collection,
    pub record_id: RecordId,
    pub op: OutboxOp,
    /// `updated_at` of the row when the mutation was enqueued
    pub version: i64,
    pub attempts: u32,
    /// Unix ms before which the entry is not retried
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
}

/// Trait for outbox storage operations (async)
#[allow(async_fn_in_trait)]
pub trait OutboxRepository {
    /// Enqueue (or replace) the pending mutation for a record
    async fn enqueue(
        &self,
        collection: Collection,
        id: &RecordId,
        op: OutboxOp,
        version: i64,
    ) -> Result<()>;

    /// Entries of a collection that are due at `now`, oldest version first
    async fn due(&self, collection: Collection, now: i64) -> Result<Vec<OutboxEntry>>;

    /// Get the pending entry for a record
    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Option<OutboxEntry>>;

    /// Remove the entry if it still describes `version`
    async fn complete(&self, collection: Collection, id: &RecordId, version: i64) -> Result<bool>;

    /// Record a failed attempt for `version` and schedule the next one
    async fn record_failure(
        &self,
        entry: &OutboxEntry,
        next_attempt_at: i64,
        error: &str,
    ) -> Result<()>;

    /// Drop the pending entry for a record regardless of version
    async fn discard(&self, collection: Collection, id: &RecordId) -> Result<()>;

    /// Number of pending entries across all collections
    async fn count(&self) -> Result<usize>;

    /// Remove every pending entry
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `OutboxRepository`
pub struct LibSqlOutboxRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlOutboxRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<OutboxEntry> {
        let collection: String = row.get(0)?;
        let record_id: String = row.get(1)?;
        let op: String = row.get(2)?;
        let last_error = match row.get_value(6)? {
            libsql::Value::Text(text) => Some(text),
            _ => None,
        };
        Ok(OutboxEntry {
            collection: Collection::from_remote_name(&collection)
                .ok_or_else(|| Error::Database(format!("unknown collection: {collection}")))?,
            record_id: record_id
                .parse()
                .map_err(|_| Error::Database(format!("invalid record id: {record_id}")))?,
            op: OutboxOp::parse(&op)?,
            version: row.get(3)?,
            attempts: u32::try_from(row.get::<i64>(4)?).unwrap_or(u32::MAX),
            next_attempt_at: row.get(5)?,
            last_error,
        })
    }
}

impl OutboxRepository for LibSqlOutboxRepository<'_> {
    async fn enqueue(
        &self,
        collection: Collection,
        id: &RecordId,
        op: OutboxOp,
        version: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO outbox (collection, record_id, op, version, attempts, next_attempt_at, last_error)
                 VALUES (?, ?, ?, ?, 0, 0, NULL)
                 ON CONFLICT(collection, record_id) DO UPDATE SET
                     op = excluded.op,
                     version = excluded.version,
                     attempts = 0,
                     next_attempt_at = 0,
                     last_error = NULL",
                libsql::params![collection.remote_name(), id.as_str(), op.as_str(), version],
            )
            .await?;
        Ok(())
    }

    async fn due(&self, collection: Collection, now: i64) -> Result<Vec<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection, record_id, op, version, attempts, next_attempt_at, last_error
                 FROM outbox
                 WHERE collection = ? AND next_attempt_at <= ?
                 ORDER BY version ASC",
                libsql::params![collection.remote_name(), now],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Option<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collection, record_id, op, version, attempts, next_attempt_at, last_error
                 FROM outbox
                 WHERE collection = ? AND record_id = ?",
                libsql::params![collection.remote_name(), id.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, collection: Collection, id: &RecordId, version: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM outbox WHERE collection = ? AND record_id = ? AND version = ?",
                libsql::params![collection.remote_name(), id.as_str(), version],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn record_failure(
        &self,
        entry: &OutboxEntry,
        next_attempt_at: i64,
        error: &str,
    ) -> Result<()> {
        // A newer mutation may have replaced the entry meanwhile; leave it alone
        self.conn
            .execute(
                "UPDATE outbox SET attempts = attempts + 1, next_attempt_at = ?, last_error = ?
                 WHERE collection = ? AND record_id = ? AND version = ?",
                libsql::params![
                    next_attempt_at,
                    error,
                    entry.collection.remote_name(),
                    entry.record_id.as_str(),
                    entry.version
                ],
            )
            .await?;
        Ok(())
    }

    async fn discard(&self, collection: Collection, id: &RecordId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM outbox WHERE collection = ? AND record_id = ?",
                libsql::params![collection.remote_name(), id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM outbox", ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM outbox", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_replaces_pending_entry() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        let id = RecordId::new();

        repo.enqueue(Collection::Entries, &id, OutboxOp::Upsert, 10)
            .await
            .unwrap();
        repo.enqueue(Collection::Entries, &id, OutboxOp::Delete, 20)
            .await
            .unwrap();

        let due = repo.due(Collection::Entries, 0).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].op, OutboxOp::Delete);
        assert_eq!(due[0].version, 20);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_complete_ignores_stale_version() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        let id = RecordId::new();

        repo.enqueue(Collection::Goals, &id, OutboxOp::Upsert, 5)
            .await
            .unwrap();
        assert!(!repo.complete(Collection::Goals, &id, 4).await.unwrap());
        assert!(repo.complete(Collection::Goals, &id, 5).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_defers_entry() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        let id = RecordId::new();

        repo.enqueue(Collection::Tasks, &id, OutboxOp::Upsert, 7)
            .await
            .unwrap();
        let entry = repo.get(Collection::Tasks, &id).await.unwrap().unwrap();
        repo.record_failure(&entry, 1_000, "offline").await.unwrap();

        assert!(repo.due(Collection::Tasks, 999).await.unwrap().is_empty());
        let due = repo.due(Collection::Tasks, 1_000).await.unwrap();
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("offline"));

        // Re-enqueueing resets the schedule
        repo.enqueue(Collection::Tasks, &id, OutboxOp::Upsert, 8)
            .await
            .unwrap();
        let due = repo.due(Collection::Tasks, 0).await.unwrap();
        assert_eq!(due[0].attempts, 0);
        assert_eq!(due[0].last_error, None);
    }
}

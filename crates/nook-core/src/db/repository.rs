//! Record repository implementation

use crate::error::{Error, Result};
use crate::models::{Collection, Record, RecordId, Synced};
use libsql::Connection;

/// A stored row with its entity fields still in JSON form
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: RecordId,
    pub payload: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_synced: bool,
    pub is_deleted: bool,
}

impl RawRecord {
    /// Serialize a typed record into its stored form
    pub fn from_synced<T: Record>(record: &Synced<T>) -> Result<Self> {
        Ok(Self {
            id: record.id,
            payload: serde_json::to_value(&record.data)?,
            created_at: record.created_at,
            updated_at: record.updated_at,
            is_synced: record.is_synced,
            is_deleted: record.is_deleted,
        })
    }

    /// Deserialize the payload into a typed record
    pub fn into_synced<T: Record>(self) -> Result<Synced<T>> {
        Ok(Synced {
            id: self.id,
            data: serde_json::from_value(self.payload)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_synced: self.is_synced,
            is_deleted: self.is_deleted,
        })
    }
}

/// Trait for per-collection row storage (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert a new row
    async fn insert(&self, collection: Collection, record: &RawRecord) -> Result<()>;

    /// Get a row by ID, optionally including tombstones
    async fn get(
        &self,
        collection: Collection,
        id: &RecordId,
        include_deleted: bool,
    ) -> Result<Option<RawRecord>>;

    /// List live rows, newest first
    async fn list(&self, collection: Collection) -> Result<Vec<RawRecord>>;

    /// List live rows whose top-level payload field equals `value`
    async fn list_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<RawRecord>>;

    /// Replace the payload of a live row and mark it dirty
    async fn update_payload(
        &self,
        collection: Collection,
        id: &RecordId,
        payload: &serde_json::Value,
        updated_at: i64,
    ) -> Result<bool>;

    /// Turn a live row into a dirty tombstone
    async fn tombstone(&self, collection: Collection, id: &RecordId, updated_at: i64)
        -> Result<bool>;

    /// Write a row exactly as given, replacing any existing row with the same ID
    async fn put(&self, collection: Collection, record: &RawRecord) -> Result<()>;

    /// Mark a row synced if it still carries the pushed version
    async fn mark_synced(&self, collection: Collection, id: &RecordId, version: i64)
        -> Result<bool>;

    /// IDs of live rows the remote has acknowledged and that have no pending outbox entry
    async fn settled_ids(&self, collection: Collection) -> Result<Vec<RecordId>>;

    /// Physically remove a row
    async fn remove(&self, collection: Collection, id: &RecordId) -> Result<bool>;

    /// Physically remove tombstones whose deletion has been acknowledged
    async fn purge_synced_tombstones(&self, collection: Collection) -> Result<u64>;

    /// Remove every row of the collection
    async fn clear(&self, collection: Collection) -> Result<()>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &libsql::Row) -> Result<RawRecord> {
        let id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        Ok(RawRecord {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid record id in store: {id}")))?,
            payload: serde_json::from_str(&payload)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            is_synced: row.get::<i64>(4)? != 0,
            is_deleted: row.get::<i64>(5)? != 0,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn insert(&self, collection: Collection, record: &RawRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, payload, created_at, updated_at, is_synced, is_deleted)
             VALUES (?, ?, ?, ?, ?, ?)",
            collection.table()
        );
        self.conn
            .execute(
                &sql,
                libsql::params![
                    record.id.as_str(),
                    record.payload.to_string(),
                    record.created_at,
                    record.updated_at,
                    i64::from(record.is_synced),
                    i64::from(record.is_deleted)
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        collection: Collection,
        id: &RecordId,
        include_deleted: bool,
    ) -> Result<Option<RawRecord>> {
        let filter = if include_deleted {
            ""
        } else {
            " AND is_deleted = 0"
        };
        let sql = format!(
            "SELECT id, payload, created_at, updated_at, is_synced, is_deleted
             FROM {} WHERE id = ?{filter}",
            collection.table()
        );
        let mut rows = self.conn.query(&sql, [id.as_str()]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: Collection) -> Result<Vec<RawRecord>> {
        let sql = format!(
            "SELECT id, payload, created_at, updated_at, is_synced, is_deleted
             FROM {}
             WHERE is_deleted = 0
             ORDER BY updated_at DESC, id DESC",
            collection.table()
        );
        let rows = self.conn.query(&sql, ()).await?;
        Self::collect(rows).await
    }

    async fn list_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<RawRecord>> {
        if !field.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!("invalid field name: {field}")));
        }
        let sql = format!(
            "SELECT id, payload, created_at, updated_at, is_synced, is_deleted
             FROM {}
             WHERE is_deleted = 0 AND json_extract(payload, '$.{field}') = ?
             ORDER BY created_at ASC, id ASC",
            collection.table()
        );
        let rows = self.conn.query(&sql, [value]).await?;
        Self::collect(rows).await
    }

    async fn update_payload(
        &self,
        collection: Collection,
        id: &RecordId,
        payload: &serde_json::Value,
        updated_at: i64,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET payload = ?, updated_at = ?, is_synced = 0
             WHERE id = ? AND is_deleted = 0",
            collection.table()
        );
        let rows = self
            .conn
            .execute(
                &sql,
                libsql::params![payload.to_string(), updated_at, id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn tombstone(
        &self,
        collection: Collection,
        id: &RecordId,
        updated_at: i64,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET is_deleted = 1, is_synced = 0, updated_at = ?
             WHERE id = ? AND is_deleted = 0",
            collection.table()
        );
        let rows = self
            .conn
            .execute(&sql, libsql::params![updated_at, id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn put(&self, collection: Collection, record: &RawRecord) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, payload, created_at, updated_at, is_synced, is_deleted)
             VALUES (?, ?, ?, ?, ?, ?)",
            collection.table()
        );
        self.conn
            .execute(
                &sql,
                libsql::params![
                    record.id.as_str(),
                    record.payload.to_string(),
                    record.created_at,
                    record.updated_at,
                    i64::from(record.is_synced),
                    i64::from(record.is_deleted)
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_synced(
        &self,
        collection: Collection,
        id: &RecordId,
        version: i64,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET is_synced = 1 WHERE id = ? AND updated_at = ?",
            collection.table()
        );
        let rows = self
            .conn
            .execute(&sql, libsql::params![id.as_str(), version])
            .await?;
        Ok(rows > 0)
    }

    async fn settled_ids(&self, collection: Collection) -> Result<Vec<RecordId>> {
        let sql = format!(
            "SELECT id FROM {table} AS t
             WHERE t.is_deleted = 0 AND t.is_synced = 1
               AND NOT EXISTS (
                   SELECT 1 FROM outbox AS o
                   WHERE o.collection = ? AND o.record_id = t.id
               )",
            table = collection.table()
        );
        let mut rows = self.conn.query(&sql, [collection.remote_name()]).await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(
                id.parse()
                    .map_err(|_| Error::Database(format!("invalid record id in store: {id}")))?,
            );
        }
        Ok(ids)
    }

    async fn remove(&self, collection: Collection, id: &RecordId) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.table());
        let rows = self.conn.execute(&sql, [id.as_str()]).await?;
        Ok(rows > 0)
    }

    async fn purge_synced_tombstones(&self, collection: Collection) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE is_deleted = 1 AND is_synced = 1",
            collection.table()
        );
        Ok(self.conn.execute(&sql, ()).await?)
    }

    async fn clear(&self, collection: Collection) -> Result<()> {
        let sql = format!("DELETE FROM {}", collection.table());
        self.conn.execute(&sql, ()).await?;
        Ok(())
    }
}

//! Database layer for Nook

mod connection;
mod migrations;
mod outbox;
mod repository;
mod settings_repository;

pub use connection::Database;
pub use outbox::{LibSqlOutboxRepository, OutboxEntry, OutboxOp, OutboxRepository};
pub use repository::{LibSqlRecordRepository, RawRecord, RecordRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};

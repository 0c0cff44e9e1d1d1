//! Data models for Nook

mod entry;
mod goal;
mod record;
mod reminder;
mod settings;
mod vault_item;

pub use entry::{normalize_tags, Entry, EntryKind};
pub use goal::{Goal, GoalStatus, Task};
pub use record::{Collection, Record, RecordId, Synced};
pub use reminder::Reminder;
pub use settings::{Settings, SettingsRow, ThemeMode};
pub use vault_item::{VaultItem, VaultItemKind};

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use chrono::Utc;
use nook_core::auth::FileDeviceStore;
use nook_core::config::AppConfig;
use nook_core::crypto::VaultCrypto;
use nook_core::{LocalStore, Record, RecordId, Synced};
use serde::Serialize;

use crate::error::CliError;

const LOCAL_USER_ID: &str = "local";

/// Everything a command needs, opened once per invocation
pub struct Context {
    pub config: AppConfig,
    pub store: LocalStore,
    pub device: FileDeviceStore,
    pub crypto: VaultCrypto,
    pub json: bool,
}

impl Context {
    pub fn user_id(&self) -> &str {
        self.config.user_id.as_deref().unwrap_or(LOCAL_USER_ID)
    }
}

pub async fn open_context(cli_db_path: Option<PathBuf>, json: bool) -> Result<Context, CliError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = cli_db_path {
        config.db_path = Some(path);
    }
    let db_path = config.resolved_db_path()?;
    let device = FileDeviceStore::new(config.device_path()?);
    let store = LocalStore::open(db_path).await?;

    Ok(Context {
        config,
        store,
        device,
        crypto: VaultCrypto::default(),
        json,
    })
}

/// Find a live record by full id or unique id prefix
pub async fn resolve_record<T: Record>(
    store: &LocalStore,
    query: &str,
) -> Result<Synced<T>, CliError> {
    let query = normalize_identifier(query)?;
    if let Ok(id) = query.parse::<RecordId>() {
        if let Some(record) = store.get::<T>(&id).await? {
            return Ok(record);
        }
    }

    let mut matching = store
        .list::<T>()
        .await?
        .into_iter()
        .filter(|record| record.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::NotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|record| short_id(&record.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Words joined with spaces, or piped stdin when there are none
pub fn resolve_text(parts: &[String]) -> Result<Option<String>, CliError> {
    if let Some(content) = normalize_content(&parts.join(" ")) {
        return Ok(Some(content));
    }
    read_piped_stdin()
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// `today` or a `YYYY-MM-DD` key, in local time
pub fn resolve_date_key(raw: &str) -> String {
    if raw.trim().eq_ignore_ascii_case("today") {
        chrono::Local::now().format("%Y-%m-%d").to_string()
    } else {
        raw.trim().to_string()
    }
}

/// Split a `key=value` argument; the value may itself contain `=`
pub fn parse_field(raw: &str) -> Result<(String, String), CliError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(CliError::InvalidArgument(format!(
            "field '{raw}' must look like key=value"
        )));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "field '{raw}' has an empty key"
        )));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Sync marker shown next to list rows
pub const fn sync_marker(is_synced: bool) -> &'static str {
    if is_synced {
        " "
    } else {
        "*"
    }
}

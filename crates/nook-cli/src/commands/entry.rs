use nook_core::models::{normalize_tags, Entry, EntryKind};
use nook_core::Synced;
use serde::Serialize;

use crate::commands::common::{
    format_relative_time, now_millis, preview, print_json, resolve_record, resolve_text, short_id,
    sync_marker, Context,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub kind: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub is_synced: bool,
}

pub fn entry_to_list_item(entry: &Synced<Entry>, now_ms: i64) -> EntryListItem {
    EntryListItem {
        id: entry.id.to_string(),
        title: entry.data.title.clone(),
        preview: preview(&entry.data.content, 80),
        kind: entry.data.kind.to_string(),
        tags: entry.data.tags.iter().cloned().collect(),
        created_at: entry.created_at,
        updated_at: entry.updated_at,
        relative_time: format_relative_time(entry.updated_at, now_ms),
        is_synced: entry.is_synced,
    }
}

pub fn format_entry_lines(entries: &[Synced<Entry>], now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let title = preview(&entry.data.title, 32);
            let relative_time = format_relative_time(entry.updated_at, now_ms);
            let line = format!(
                "{}{:<13}  {:<10}  {title:<32}  {relative_time}",
                sync_marker(entry.is_synced),
                short_id(&entry.id),
                entry.data.kind,
            );
            if entry.data.tags.is_empty() {
                line
            } else {
                let tags = entry
                    .data
                    .tags
                    .iter()
                    .map(|tag| format!("#{tag}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{line}  {tags}")
            }
        })
        .collect()
}

pub async fn run_add(
    ctx: &Context,
    title: &str,
    content: &[String],
    kind: &str,
    tags: &[String],
) -> Result<(), CliError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CliError::InvalidArgument("Entry title cannot be empty".into()));
    }
    let kind = kind.parse::<EntryKind>().map_err(CliError::InvalidArgument)?;
    let content = resolve_text(content)?.unwrap_or_default();

    let entry = ctx
        .store
        .create(Entry::new(title, content, kind, tags))
        .await?;
    println!("{}", entry.id);
    Ok(())
}

pub async fn run_list(
    ctx: &Context,
    limit: usize,
    kind: Option<&str>,
    tag: Option<&str>,
) -> Result<(), CliError> {
    let kind = kind
        .map(str::parse::<EntryKind>)
        .transpose()
        .map_err(CliError::InvalidArgument)?;
    let tag = tag.and_then(|tag| normalize_tags([tag]).into_iter().next());

    let entries = ctx
        .store
        .list::<Entry>()
        .await?
        .into_iter()
        .filter(|entry| kind.is_none() || kind == Some(entry.data.kind))
        .filter(|entry| match &tag {
            Some(tag) => entry.data.tags.contains(tag),
            None => true,
        })
        .take(limit)
        .collect::<Vec<_>>();

    let now_ms = now_millis();
    if ctx.json {
        let items = entries
            .iter()
            .map(|entry| entry_to_list_item(entry, now_ms))
            .collect::<Vec<_>>();
        print_json(&items)
    } else {
        for line in format_entry_lines(&entries, now_ms) {
            println!("{line}");
        }
        Ok(())
    }
}

pub async fn run_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let entry = resolve_record::<Entry>(&ctx.store, id).await?;
    ctx.store.delete::<Entry>(&entry.id).await?;
    println!("{}", entry.id);
    Ok(())
}

//! Entry model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::{Collection, Record};

/// Kind of journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Note,
    Journal,
    Goal,
    Log,
    Credential,
}

impl EntryKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Journal => "journal",
            Self::Goal => "goal",
            Self::Log => "log",
            Self::Credential => "credential",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "note" => Ok(Self::Note),
            "journal" => Ok(Self::Journal),
            "goal" => Ok(Self::Goal),
            "log" => Ok(Self::Log),
            "credential" => Ok(Self::Credential),
            other => Err(format!("unknown entry type '{other}'")),
        }
    }
}

/// A titled piece of free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
}

impl Entry {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        kind: EntryKind,
        tags: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: normalize_tags(tags),
            kind,
        }
    }

    /// Get first line of the body, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

impl Record for Entry {
    const COLLECTION: Collection = Collection::Entries;
}

/// Normalize a tag list into a set.
///
/// Tags are trimmed, stripped of a leading `#`, lowercased and deduplicated;
/// empty tags are dropped.
pub fn normalize_tags(tags: impl IntoIterator<Item = impl AsRef<str>>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|tag| {
            tag.as_ref()
                .trim()
                .trim_start_matches('#')
                .to_lowercase()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags_lowercase_and_dedup() {
        let tags = normalize_tags(["#Rust", "rust", " Work ", "", "#"]);
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("rust"));
        assert!(tags.contains("work"));
    }

    #[test]
    fn test_entry_serializes_type_field() {
        let entry = Entry::new("Title", "Body", EntryKind::Journal, ["a"]);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "journal");
        assert_eq!(value["tags"], serde_json::json!(["a"]));
    }

    #[test]
    fn test_entry_kind_parse() {
        assert_eq!("Log".parse::<EntryKind>(), Ok(EntryKind::Log));
        assert!("recipe".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_preview() {
        let entry = Entry::new("t", "First line\nSecond line", EntryKind::Note, [""; 0]);
        assert_eq!(entry.preview(50), "First line");
        assert_eq!(entry.preview(5), "First");
    }
}

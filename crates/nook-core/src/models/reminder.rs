//! Reminder model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Collection, Record};
use crate::error::{Error, Result};

/// Date key format used for reminder due dates
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

/// A short text due on a calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub text: String,
    /// Calendar day key, `YYYY-MM-DD`
    pub due_date: String,
    /// Set by the external notification service once delivered
    #[serde(default)]
    pub notified: bool,
}

impl Reminder {
    pub fn new(text: impl Into<String>, due_date: &str) -> Result<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(Error::InvalidInput("reminder text cannot be empty".into()));
        }
        let due = NaiveDate::parse_from_str(due_date.trim(), DUE_DATE_FORMAT).map_err(|_| {
            Error::InvalidInput(format!("due date '{due_date}' must be YYYY-MM-DD"))
        })?;
        Ok(Self {
            text,
            due_date: due.format(DUE_DATE_FORMAT).to_string(),
            notified: false,
        })
    }
}

impl Record for Reminder {
    const COLLECTION: Collection = Collection::Reminders;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_validates_due_date() {
        let reminder = Reminder::new("call mum", "2026-03-09").unwrap();
        assert_eq!(reminder.due_date, "2026-03-09");
        assert!(!reminder.notified);

        assert!(Reminder::new("call mum", "09/03/2026").is_err());
        assert!(Reminder::new("  ", "2026-03-09").is_err());
    }
}

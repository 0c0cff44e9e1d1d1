//! Goal and task models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Collection, Record, RecordId};

/// Progress of a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl GoalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" | "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(format!("unknown goal status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: GoalStatus,
}

impl Goal {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: GoalStatus::Pending,
        }
    }
}

impl Record for Goal {
    const COLLECTION: Collection = Collection::Goals;
}

/// A checklist item belonging to a goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub goal_id: RecordId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    #[must_use]
    pub fn new(goal_id: RecordId, text: impl Into<String>) -> Self {
        Self {
            goal_id,
            text: text.into(),
            completed: false,
        }
    }
}

impl Record for Task {
    const COLLECTION: Collection = Collection::Tasks;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_status_wire_format() {
        let goal = Goal {
            status: GoalStatus::InProgress,
            ..Goal::new("Run", "")
        };
        let value = serde_json::to_value(&goal).unwrap();
        assert_eq!(value["status"], "in-progress");
        assert_eq!("done".parse::<GoalStatus>(), Ok(GoalStatus::Completed));
    }

    #[test]
    fn test_task_uses_camel_case_foreign_key() {
        let goal_id = RecordId::new();
        let value = serde_json::to_value(Task::new(goal_id, "stretch")).unwrap();
        assert_eq!(value["goalId"], goal_id.as_str());
        assert_eq!(value["completed"], false);
    }
}

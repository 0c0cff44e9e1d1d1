use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nook")]
#[command(about = "Local-first notes, reminders, goals and an encrypted vault")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Output lists as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Notes, journal entries and logs
    Entry {
        #[command(subcommand)]
        command: EntryCommands,
    },
    /// Dated reminders
    Reminder {
        #[command(subcommand)]
        command: ReminderCommands,
    },
    /// Goals and their progress
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Tasks under a goal
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Encrypted vault items
    Vault {
        /// PIN that unlocks the vault for this invocation
        #[arg(long, global = true, env = "NOOK_PIN", hide_env_values = true)]
        pin: Option<String>,
        #[command(subcommand)]
        command: VaultCommands,
    },
    /// App lock PIN
    Pin {
        #[command(subcommand)]
        command: PinCommands,
    },
    /// Synchronize with the configured remote store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum EntryCommands {
    /// Create an entry
    #[command(alias = "new")]
    Add {
        /// Entry title
        title: String,
        /// Entry body (read from stdin when omitted and piped)
        content: Vec<String>,
        /// note, journal, goal, log or credential
        #[arg(long, default_value = "note")]
        kind: String,
        /// Tag to attach (repeatable)
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// List entries, most recently updated first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only entries of this kind
        #[arg(long)]
        kind: Option<String>,
        /// Only entries carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Delete an entry
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ReminderCommands {
    /// Create a reminder
    Add {
        /// Reminder text
        text: Vec<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        due: String,
    },
    /// List reminders
    List {
        /// Only reminders due on this date (YYYY-MM-DD, or "today")
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
    },
    /// Delete a reminder
    Delete {
        /// Reminder ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Create a goal
    Add {
        /// Goal title
        title: String,
        /// Optional description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List goals
    List,
    /// Set the status of a goal
    Status {
        /// Goal ID or unique ID prefix
        id: String,
        /// pending, in-progress or completed
        status: String,
    },
    /// Delete a goal and its tasks
    Delete {
        /// Goal ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task to a goal
    Add {
        /// Goal ID or unique ID prefix
        goal: String,
        /// Task text
        text: Vec<String>,
    },
    /// List the tasks of a goal
    List {
        /// Goal ID or unique ID prefix
        goal: String,
    },
    /// Mark a task completed
    Done {
        /// Task ID or unique ID prefix
        id: String,
        /// Mark the task open again
        #[arg(long)]
        undo: bool,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum VaultCommands {
    /// Store a new vault item
    Add {
        /// Item title
        title: String,
        /// password, contact or note
        #[arg(long, default_value = "password")]
        kind: String,
        /// Field as key=value (repeatable)
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// List vault items
    List,
    /// Show a vault item with its decrypted fields
    Show {
        /// Item ID or unique ID prefix
        id: String,
    },
    /// Delete a vault item
    Delete {
        /// Item ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PinCommands {
    /// Configure the PIN (4 to 12 digits)
    Set {
        pin: String,
    },
    /// Replace the PIN
    Change {
        /// Current PIN
        current: String,
        /// New PIN
        new: String,
    },
    /// Remove the PIN
    Clear {
        /// Current PIN
        current: String,
    },
    /// Check a PIN without changing anything
    Check {
        pin: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Push pending changes, then pull the remote state once
    Run,
    /// Show pending local changes
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
}

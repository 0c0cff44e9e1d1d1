//! Nook CLI - notes, reminders, goals and an encrypted vault from the terminal
//!
//! Everything is written to the local database first; `nook sync run`
//! exchanges pending changes with the configured remote store.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    Cli, Commands, ConfigCommands, EntryCommands, GoalCommands, PinCommands, ReminderCommands,
    SyncCommands, TaskCommands, VaultCommands,
};
use crate::commands::common::open_context;
use crate::commands::{config, entry, goal, pin, reminder, sync, vault};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nook=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = open_context(cli.db_path, cli.json).await?;

    match cli.command {
        Commands::Entry { command } => match command {
            EntryCommands::Add {
                title,
                content,
                kind,
                tags,
            } => entry::run_add(&ctx, &title, &content, &kind, &tags).await?,
            EntryCommands::List { limit, kind, tag } => {
                entry::run_list(&ctx, limit, kind.as_deref(), tag.as_deref()).await?;
            }
            EntryCommands::Delete { id } => entry::run_delete(&ctx, &id).await?,
        },
        Commands::Reminder { command } => match command {
            ReminderCommands::Add { text, due } => reminder::run_add(&ctx, &text, &due).await?,
            ReminderCommands::List { due } => reminder::run_list(&ctx, due.as_deref()).await?,
            ReminderCommands::Delete { id } => reminder::run_delete(&ctx, &id).await?,
        },
        Commands::Goal { command } => match command {
            GoalCommands::Add { title, description } => {
                goal::run_goal_add(&ctx, &title, &description).await?;
            }
            GoalCommands::List => goal::run_goal_list(&ctx).await?,
            GoalCommands::Status { id, status } => {
                goal::run_goal_status(&ctx, &id, &status).await?;
            }
            GoalCommands::Delete { id } => goal::run_goal_delete(&ctx, &id).await?,
        },
        Commands::Task { command } => match command {
            TaskCommands::Add { goal: goal_id, text } => {
                goal::run_task_add(&ctx, &goal_id, &text).await?;
            }
            TaskCommands::List { goal: goal_id } => goal::run_task_list(&ctx, &goal_id).await?,
            TaskCommands::Done { id, undo } => goal::run_task_done(&ctx, &id, undo).await?,
            TaskCommands::Delete { id } => goal::run_task_delete(&ctx, &id).await?,
        },
        Commands::Vault { pin, command } => {
            let pin = pin.as_deref();
            match command {
                VaultCommands::Add {
                    title,
                    kind,
                    fields,
                } => vault::run_add(&ctx, pin, &title, &kind, &fields).await?,
                VaultCommands::List => vault::run_list(&ctx, pin).await?,
                VaultCommands::Show { id } => vault::run_show(&ctx, pin, &id).await?,
                VaultCommands::Delete { id } => vault::run_delete(&ctx, &id).await?,
            }
        }
        Commands::Pin { command } => match command {
            PinCommands::Set { pin: value } => pin::run_set(&ctx, &value)?,
            PinCommands::Change { current, new } => pin::run_change(&ctx, &current, &new).await?,
            PinCommands::Clear { current } => pin::run_clear(&ctx, &current).await?,
            PinCommands::Check { pin: value } => pin::run_check(&ctx, &value)?,
        },
        Commands::Sync { command } => match command {
            SyncCommands::Run => sync::run_sync(&ctx).await?,
            SyncCommands::Status => sync::run_status(&ctx).await?,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => config::run_show(&ctx)?,
        },
    }

    Ok(())
}

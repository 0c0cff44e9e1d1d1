use nook_core::models::Reminder;
use nook_core::Synced;
use serde::Serialize;

use crate::commands::common::{
    print_json, resolve_date_key, resolve_record, resolve_text, short_id, sync_marker, Context,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ReminderListItem {
    pub id: String,
    pub text: String,
    pub due_date: String,
    pub notified: bool,
    pub is_synced: bool,
}

impl From<&Synced<Reminder>> for ReminderListItem {
    fn from(reminder: &Synced<Reminder>) -> Self {
        Self {
            id: reminder.id.to_string(),
            text: reminder.data.text.clone(),
            due_date: reminder.data.due_date.clone(),
            notified: reminder.data.notified,
            is_synced: reminder.is_synced,
        }
    }
}

pub async fn run_add(ctx: &Context, text: &[String], due: &str) -> Result<(), CliError> {
    let text = resolve_text(text)?
        .ok_or_else(|| CliError::InvalidArgument("Reminder text cannot be empty".into()))?;
    let reminder = Reminder::new(text, &resolve_date_key(due))?;
    let created = ctx.store.create(reminder).await?;
    println!("{}", created.id);
    Ok(())
}

pub async fn run_list(ctx: &Context, due: Option<&str>) -> Result<(), CliError> {
    let mut reminders = match due {
        Some(due) => ctx.store.list_reminders_due(&resolve_date_key(due)).await?,
        None => ctx.store.list::<Reminder>().await?,
    };
    reminders.sort_by(|a, b| a.data.due_date.cmp(&b.data.due_date));

    if ctx.json {
        let items = reminders
            .iter()
            .map(ReminderListItem::from)
            .collect::<Vec<_>>();
        return print_json(&items);
    }

    if reminders.is_empty() {
        println!("No reminders.");
        return Ok(());
    }
    for reminder in &reminders {
        println!(
            "{}{:<13}  {}  {}",
            sync_marker(reminder.is_synced),
            short_id(&reminder.id),
            reminder.data.due_date,
            reminder.data.text
        );
    }
    Ok(())
}

pub async fn run_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let reminder = resolve_record::<Reminder>(&ctx.store, id).await?;
    ctx.store.delete::<Reminder>(&reminder.id).await?;
    println!("{}", reminder.id);
    Ok(())
}

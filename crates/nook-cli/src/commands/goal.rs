use nook_core::models::{Goal, GoalStatus, Task};
use nook_core::Synced;
use serde::Serialize;

use crate::commands::common::{
    print_json, resolve_record, resolve_text, short_id, sync_marker, Context,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct GoalListItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub tasks_done: usize,
    pub tasks_total: usize,
    pub is_synced: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub goal_id: String,
    pub text: String,
    pub completed: bool,
    pub is_synced: bool,
}

impl From<&Synced<Task>> for TaskListItem {
    fn from(task: &Synced<Task>) -> Self {
        Self {
            id: task.id.to_string(),
            goal_id: task.data.goal_id.to_string(),
            text: task.data.text.clone(),
            completed: task.data.completed,
            is_synced: task.is_synced,
        }
    }
}

pub async fn run_goal_add(ctx: &Context, title: &str, description: &str) -> Result<(), CliError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CliError::InvalidArgument("Goal title cannot be empty".into()));
    }
    let goal = ctx
        .store
        .create(Goal::new(title, description.trim()))
        .await?;
    println!("{}", goal.id);
    Ok(())
}

pub async fn run_goal_list(ctx: &Context) -> Result<(), CliError> {
    let goals = ctx.store.list::<Goal>().await?;
    let mut items = Vec::with_capacity(goals.len());
    for goal in &goals {
        let tasks = ctx.store.list_tasks_for_goal(&goal.id).await?;
        items.push(GoalListItem {
            id: goal.id.to_string(),
            title: goal.data.title.clone(),
            description: goal.data.description.clone(),
            status: goal.data.status.to_string(),
            tasks_done: tasks.iter().filter(|task| task.data.completed).count(),
            tasks_total: tasks.len(),
            is_synced: goal.is_synced,
        });
    }

    if ctx.json {
        return print_json(&items);
    }
    for (goal, item) in goals.iter().zip(&items) {
        println!(
            "{}{:<13}  {:<11}  {}/{}  {}",
            sync_marker(goal.is_synced),
            short_id(&goal.id),
            item.status,
            item.tasks_done,
            item.tasks_total,
            item.title
        );
    }
    Ok(())
}

pub async fn run_goal_status(ctx: &Context, id: &str, status: &str) -> Result<(), CliError> {
    let status = status
        .parse::<GoalStatus>()
        .map_err(CliError::InvalidArgument)?;
    let goal = resolve_record::<Goal>(&ctx.store, id).await?;
    let updated = ctx.store.set_goal_status(&goal.id, status).await?;
    println!("{}  {}", updated.id, updated.data.status);
    Ok(())
}

pub async fn run_goal_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let goal = resolve_record::<Goal>(&ctx.store, id).await?;
    ctx.store.delete::<Goal>(&goal.id).await?;
    println!("{}", goal.id);
    Ok(())
}

pub async fn run_task_add(ctx: &Context, goal: &str, text: &[String]) -> Result<(), CliError> {
    let goal = resolve_record::<Goal>(&ctx.store, goal).await?;
    let text = resolve_text(text)?
        .ok_or_else(|| CliError::InvalidArgument("Task text cannot be empty".into()))?;
    let task = ctx.store.add_task(&goal.id, &text).await?;
    println!("{}", task.id);
    Ok(())
}

pub async fn run_task_list(ctx: &Context, goal: &str) -> Result<(), CliError> {
    let goal = resolve_record::<Goal>(&ctx.store, goal).await?;
    let tasks = ctx.store.list_tasks_for_goal(&goal.id).await?;

    if ctx.json {
        let items = tasks.iter().map(TaskListItem::from).collect::<Vec<_>>();
        return print_json(&items);
    }

    println!("{} ({})", goal.data.title, goal.data.status);
    for task in &tasks {
        let check = if task.data.completed { "x" } else { " " };
        println!(
            "{}{:<13}  [{check}] {}",
            sync_marker(task.is_synced),
            short_id(&task.id),
            task.data.text
        );
    }
    Ok(())
}

pub async fn run_task_done(ctx: &Context, id: &str, undo: bool) -> Result<(), CliError> {
    let task = resolve_record::<Task>(&ctx.store, id).await?;
    ctx.store.set_task_completed(&task.id, !undo).await?;
    println!("{}", task.id);
    Ok(())
}

pub async fn run_task_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let task = resolve_record::<Task>(&ctx.store, id).await?;
    ctx.store.delete::<Task>(&task.id).await?;
    println!("{}", task.id);
    Ok(())
}

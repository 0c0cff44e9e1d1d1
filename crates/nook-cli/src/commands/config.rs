use nook_core::config::default_config_path;
use serde::Serialize;

use crate::commands::common::{print_json, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ConfigOutput {
    config_path: String,
    db_path: String,
    device_path: String,
    remote_url: Option<String>,
    user_id: Option<String>,
    auth_token: Option<&'static str>,
    push_interval_secs: u64,
}

pub fn run_show(ctx: &Context) -> Result<(), CliError> {
    let output = ConfigOutput {
        config_path: default_config_path()?.display().to_string(),
        db_path: ctx.config.resolved_db_path()?.display().to_string(),
        device_path: ctx.config.device_path()?.display().to_string(),
        remote_url: ctx.config.remote_url.clone(),
        user_id: ctx.config.user_id.clone(),
        auth_token: ctx.config.auth_token.as_ref().map(|_| "[REDACTED]"),
        push_interval_secs: ctx.config.sync_config().push_interval().as_secs(),
    };

    if ctx.json {
        return print_json(&output);
    }

    println!("config:        {}", output.config_path);
    println!("database:      {}", output.db_path);
    println!("device:        {}", output.device_path);
    println!(
        "remote_url:    {}",
        output.remote_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "user_id:       {}",
        output.user_id.as_deref().unwrap_or("(not set)")
    );
    println!(
        "auth_token:    {}",
        output.auth_token.unwrap_or("(not set)")
    );
    println!("push_interval: {}s", output.push_interval_secs);
    Ok(())
}

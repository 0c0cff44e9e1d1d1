use std::sync::Arc;

use nook_core::remote::HttpRemoteStore;
use nook_core::SyncEngine;
use serde::Serialize;

use crate::commands::common::{format_timestamp, print_json, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SyncRunOutput {
    settings_pushed: bool,
    upserted: usize,
    deleted: usize,
    failed: usize,
    pulled: usize,
}

#[derive(Debug, Serialize)]
struct SyncStatusOutput {
    configured: bool,
    pending: usize,
    settings_dirty: bool,
    settings_updated_at: i64,
}

pub async fn run_sync(ctx: &Context) -> Result<(), CliError> {
    let Some((remote_url, user_id)) = ctx.config.remote() else {
        return Err(CliError::SyncNotConfigured);
    };
    let sync_config = ctx.config.sync_config();
    let remote = HttpRemoteStore::new(
        remote_url,
        ctx.config.auth_token.clone(),
        sync_config.poll_interval(),
    )?;
    let engine = SyncEngine::new(ctx.store.clone(), Arc::new(remote), user_id, sync_config);

    let report = engine.push_once().await?;
    let pulled = engine.pull_once().await?;
    tracing::info!(
        "Sync finished: {} upserted, {} deleted, {} failed, {} pulled",
        report.upserted,
        report.deleted,
        report.failed,
        pulled
    );

    if ctx.json {
        return print_json(&SyncRunOutput {
            settings_pushed: report.settings_pushed,
            upserted: report.upserted,
            deleted: report.deleted,
            failed: report.failed,
            pulled,
        });
    }

    println!(
        "Pushed {} change(s), {} deletion(s); pulled {} change(s).",
        report.upserted, report.deleted, pulled
    );
    if report.failed > 0 {
        println!(
            "{} change(s) failed and will be retried on the next sync.",
            report.failed
        );
    }
    Ok(())
}

pub async fn run_status(ctx: &Context) -> Result<(), CliError> {
    let pending = ctx.store.pending_count().await?;
    let settings = ctx.store.settings_row().await?;
    let output = SyncStatusOutput {
        configured: ctx.config.remote().is_some(),
        pending,
        settings_dirty: !settings.is_synced,
        settings_updated_at: settings.updated_at,
    };

    if ctx.json {
        return print_json(&output);
    }

    if !output.configured {
        println!("Sync is not configured.");
    }
    println!("Pending changes: {}", output.pending);
    if output.settings_dirty {
        println!(
            "Settings changed locally at {}",
            format_timestamp(output.settings_updated_at)
        );
    }
    Ok(())
}

use std::sync::Arc;

use nook_core::auth::{FileDeviceStore, PinAuth, Session, UnlockOutcome};
use nook_core::crypto::VaultRecord;
use nook_core::models::{VaultItem, VaultItemKind};
use nook_core::vault::{VaultContents, VaultItemView, VaultService};
use serde::Serialize;

use crate::commands::common::{
    parse_field, print_json, resolve_record, short_id, sync_marker, Context,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct VaultItemOutput {
    pub id: String,
    pub title: String,
    pub kind: String,
    /// `None` when the item does not open with the current PIN
    pub fields: Option<VaultRecord>,
    pub is_synced: bool,
}

impl From<&VaultItemView> for VaultItemOutput {
    fn from(view: &VaultItemView) -> Self {
        Self {
            id: view.item.id.to_string(),
            title: view.item.data.title.clone(),
            kind: view.item.data.kind.to_string(),
            fields: match &view.contents {
                VaultContents::Decrypted(record) => Some(record.clone()),
                VaultContents::CannotDecrypt | VaultContents::Locked => None,
            },
            is_synced: view.item.is_synced,
        }
    }
}

pub fn pin_auth(ctx: &Context) -> PinAuth<FileDeviceStore> {
    PinAuth::new(ctx.device.clone(), ctx.store.clone(), ctx.crypto)
}

/// Begin a session and unlock it with the given PIN when one is configured
pub fn unlocked_session(ctx: &Context, pin: Option<&str>) -> Result<Arc<Session>, CliError> {
    let auth = pin_auth(ctx);
    let session = auth.begin_session(ctx.user_id())?;
    if session.is_unlocked() {
        return Ok(session);
    }

    let Some(pin) = pin else {
        return Err(CliError::PinRequired);
    };
    match auth.unlock(&session, pin)? {
        UnlockOutcome::Unlocked(_) => Ok(session),
        UnlockOutcome::Rejected => Err(CliError::IncorrectPin),
    }
}

fn service(ctx: &Context) -> VaultService {
    VaultService::new(ctx.store.clone(), ctx.crypto)
}

fn describe(contents: &VaultContents) -> &'static str {
    match contents {
        VaultContents::Decrypted(_) => "",
        VaultContents::CannotDecrypt => "  (cannot decrypt with current PIN)",
        VaultContents::Locked => "  (locked)",
    }
}

pub async fn run_add(
    ctx: &Context,
    pin: Option<&str>,
    title: &str,
    kind: &str,
    fields: &[String],
) -> Result<(), CliError> {
    let kind = kind
        .parse::<VaultItemKind>()
        .map_err(CliError::InvalidArgument)?;
    let record = fields
        .iter()
        .map(|raw| parse_field(raw))
        .collect::<Result<VaultRecord, _>>()?;

    let session = unlocked_session(ctx, pin)?;
    let item = service(ctx).create(&session, title, kind, &record).await?;
    println!("{}", item.id);
    Ok(())
}

pub async fn run_list(ctx: &Context, pin: Option<&str>) -> Result<(), CliError> {
    let session = unlocked_session(ctx, pin)?;
    let views = service(ctx).list(&session).await?;

    if ctx.json {
        let items = views.iter().map(VaultItemOutput::from).collect::<Vec<_>>();
        return print_json(&items);
    }

    if views.is_empty() {
        println!("Vault is empty.");
        return Ok(());
    }
    for view in &views {
        println!(
            "{}{:<13}  {:<8}  {}{}",
            sync_marker(view.item.is_synced),
            short_id(&view.item.id),
            view.item.data.kind,
            view.item.data.title,
            describe(&view.contents)
        );
    }
    Ok(())
}

pub async fn run_show(ctx: &Context, pin: Option<&str>, id: &str) -> Result<(), CliError> {
    let item = resolve_record::<VaultItem>(&ctx.store, id).await?;
    let session = unlocked_session(ctx, pin)?;
    let view = service(ctx)
        .open(&session, &item.id)
        .await?
        .ok_or_else(|| CliError::NotFound(id.to_string()))?;

    if ctx.json {
        return print_json(&VaultItemOutput::from(&view));
    }

    println!("{} ({})", view.item.data.title, view.item.data.kind);
    match &view.contents {
        VaultContents::Decrypted(record) => {
            for (key, value) in record {
                println!("  {key}: {value}");
            }
        }
        contents => println!("{}", describe(contents).trim()),
    }
    Ok(())
}

pub async fn run_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let item = resolve_record::<VaultItem>(&ctx.store, id).await?;
    service(ctx).delete(&item.id).await?;
    println!("{}", item.id);
    Ok(())
}

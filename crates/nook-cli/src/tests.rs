use clap::Parser;
use nook_core::auth::FileDeviceStore;
use nook_core::config::AppConfig;
use nook_core::crypto::{KdfParams, VaultCrypto};
use nook_core::models::{Entry, EntryKind, Goal, Task, VaultItem};
use nook_core::{LocalStore, Synced};
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

use crate::cli::{Cli, Commands, EntryCommands, PinCommands, VaultCommands};
use crate::commands::common::{
    format_relative_time, normalize_content, normalize_identifier, parse_field, preview,
    resolve_date_key, resolve_record, short_id, Context,
};
use crate::commands::entry::{entry_to_list_item, format_entry_lines};
use crate::commands::vault::unlocked_session;
use crate::commands::{goal, pin, sync, vault};
use crate::error::CliError;

async fn test_context(dir: &TempDir) -> Context {
    let db_path = dir.path().join("nook.db");
    let store = LocalStore::open(&db_path).await.unwrap();
    Context {
        config: AppConfig {
            db_path: Some(db_path),
            ..AppConfig::default()
        },
        store,
        device: FileDeviceStore::new(dir.path().join("device.json")),
        crypto: VaultCrypto::new(KdfParams::new(64, 1, 1)),
        json: false,
    }
}

async fn add_entry(store: &LocalStore, title: &str, tags: &[&str]) -> Synced<Entry> {
    store
        .create(Entry::new(title, "", EntryKind::Note, tags))
        .await
        .unwrap()
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn normalize_identifier_rejects_empty() {
    assert!(matches!(normalize_identifier("   "), Err(CliError::EmptyId)));
    assert_eq!(normalize_identifier(" abc ").unwrap(), "abc");
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
    assert_eq!(format_relative_time(now + 5_000, now), "just now");
}

#[test]
fn preview_truncates_with_ellipsis() {
    assert_eq!(preview("short", 10), "short");
    assert_eq!(preview("first   line\nsecond line", 80), "first line");
    assert_eq!(preview("abcdefghijkl", 8), "abcde...");
}

#[test]
fn parse_field_splits_on_first_equals() {
    assert_eq!(
        parse_field("password=a=b").unwrap(),
        ("password".to_string(), "a=b".to_string())
    );
    assert_eq!(
        parse_field(" user =alice").unwrap(),
        ("user".to_string(), "alice".to_string())
    );
    assert!(parse_field("no-separator").is_err());
    assert!(parse_field("=value").is_err());
}

#[test]
fn resolve_date_key_expands_today() {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    assert_eq!(resolve_date_key("today"), today);
    assert_eq!(resolve_date_key(" 2025-02-03 "), "2025-02-03");
}

#[test]
fn cli_parses_entry_add_with_tags() {
    let cli = Cli::try_parse_from([
        "nook", "entry", "add", "Groceries", "milk", "eggs", "--tag", "home", "-t", "shop",
        "--kind", "log",
    ])
    .unwrap();

    match cli.command {
        Commands::Entry {
            command:
                EntryCommands::Add {
                    title,
                    content,
                    kind,
                    tags,
                },
        } => {
            assert_eq!(title, "Groceries");
            assert_eq!(content, vec!["milk".to_string(), "eggs".to_string()]);
            assert_eq!(kind, "log");
            assert_eq!(tags, vec!["home".to_string(), "shop".to_string()]);
        }
        _ => panic!("expected entry add"),
    }
}

#[test]
fn cli_accepts_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["nook", "vault", "list", "--pin", "4821", "--json"]).unwrap();
    assert!(cli.json);
    match cli.command {
        Commands::Vault { pin, command } => {
            assert_eq!(pin.as_deref(), Some("4821"));
            assert!(matches!(command, VaultCommands::List));
        }
        _ => panic!("expected vault list"),
    }
}

#[test]
fn cli_parses_pin_change() {
    let cli = Cli::try_parse_from(["nook", "pin", "change", "1234", "5678"]).unwrap();
    match cli.command {
        Commands::Pin {
            command: PinCommands::Change { current, new },
        } => {
            assert_eq!(current, "1234");
            assert_eq!(new, "5678");
        }
        _ => panic!("expected pin change"),
    }
}

#[test]
fn cli_requires_due_date_for_reminders() {
    assert!(Cli::try_parse_from(["nook", "reminder", "add", "call mom"]).is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn entry_lines_show_kind_and_tags() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    let entry = add_entry(&ctx.store, "Weekly review", &["Work", "focus"]).await;

    let lines = format_entry_lines(std::slice::from_ref(&entry), entry.updated_at);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with('*'));
    assert!(lines[0].contains(&short_id(&entry.id)));
    assert!(lines[0].contains("note"));
    assert!(lines[0].ends_with("#focus #work"));

    let item = entry_to_list_item(&entry, entry.updated_at);
    assert_eq!(item.tags, vec!["focus".to_string(), "work".to_string()]);
    assert_eq!(item.relative_time, "just now");
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_record_supports_exact_and_prefix_id() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    let entry = add_entry(&ctx.store, "Find me", &[]).await;
    let full = entry.id.to_string();

    let exact = resolve_record::<Entry>(&ctx.store, &full).await.unwrap();
    assert_eq!(exact.id, entry.id);

    let by_prefix = resolve_record::<Entry>(&ctx.store, &full[..18]).await.unwrap();
    assert_eq!(by_prefix.id, entry.id);
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_record_rejects_ambiguous_prefix() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    let first = add_entry(&ctx.store, "one", &[]).await;
    add_entry(&ctx.store, "two", &[]).await;

    // v7 ids created moments apart share their leading timestamp digits
    let prefix = &first.id.to_string()[..4];
    let error = resolve_record::<Entry>(&ctx.store, prefix).await.unwrap_err();
    assert!(matches!(error, CliError::AmbiguousId(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_record_rejects_missing_and_deleted() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    let entry = add_entry(&ctx.store, "gone soon", &[]).await;
    ctx.store.delete::<Entry>(&entry.id).await.unwrap();

    let error = resolve_record::<Entry>(&ctx.store, &entry.id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::NotFound(_)));

    let error = resolve_record::<Entry>(&ctx.store, "zzzz").await.unwrap_err();
    assert!(matches!(error, CliError::NotFound(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn task_commands_track_completion() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    goal::run_goal_add(&ctx, "Run a marathon", "").await.unwrap();
    let goal_id = ctx.store.list::<Goal>().await.unwrap()[0].id.to_string();

    goal::run_task_add(&ctx, &goal_id, &["Buy shoes".to_string()])
        .await
        .unwrap();
    let task = ctx.store.list::<Task>().await.unwrap().remove(0);
    assert!(!task.data.completed);

    goal::run_task_done(&ctx, &task.id.to_string(), false)
        .await
        .unwrap();
    let done = ctx.store.get::<Task>(&task.id).await.unwrap().unwrap();
    assert!(done.data.completed);

    goal::run_task_done(&ctx, &task.id.to_string(), true)
        .await
        .unwrap();
    let reopened = ctx.store.get::<Task>(&task.id).await.unwrap().unwrap();
    assert!(!reopened.data.completed);
}

#[tokio::test(flavor = "current_thread")]
async fn goal_status_rejects_unknown_value() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    goal::run_goal_add(&ctx, "Learn Rust", "").await.unwrap();
    let goal_id = ctx.store.list::<Goal>().await.unwrap()[0].id.to_string();

    let error = goal::run_goal_status(&ctx, &goal_id, "abandoned")
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::InvalidArgument(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn vault_requires_pin_once_configured() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;

    // No PIN yet: the session starts unlocked
    assert!(unlocked_session(&ctx, None).unwrap().is_unlocked());

    pin::run_set(&ctx, "4821").unwrap();
    assert!(matches!(
        unlocked_session(&ctx, None),
        Err(CliError::PinRequired)
    ));
    assert!(matches!(
        unlocked_session(&ctx, Some("0000")),
        Err(CliError::IncorrectPin)
    ));
    assert!(unlocked_session(&ctx, Some("4821")).unwrap().is_unlocked());
}

#[tokio::test(flavor = "current_thread")]
async fn vault_add_stores_only_ciphertext() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    pin::run_set(&ctx, "4821").unwrap();

    vault::run_add(
        &ctx,
        Some("4821"),
        "Bank",
        "password",
        &["username=alice".to_string(), "password=hunter2".to_string()],
    )
    .await
    .unwrap();

    let item = ctx.store.list::<VaultItem>().await.unwrap().remove(0);
    assert_eq!(item.data.title, "Bank");
    assert!(!item.data.encrypted_data.contains("hunter2"));

    let session = unlocked_session(&ctx, Some("4821")).unwrap();
    let view = nook_core::vault::VaultService::new(ctx.store.clone(), ctx.crypto)
        .open(&session, &item.id)
        .await
        .unwrap()
        .unwrap();
    match view.contents {
        nook_core::vault::VaultContents::Decrypted(record) => {
            assert_eq!(record.get("password").map(String::as_str), Some("hunter2"));
        }
        other => panic!("expected decrypted contents, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn pin_change_rejects_wrong_current_pin() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    pin::run_set(&ctx, "4821").unwrap();

    let error = pin::run_change(&ctx, "1111", "5678").await.unwrap_err();
    assert!(matches!(error, CliError::IncorrectPin));

    pin::run_change(&ctx, "4821", "5678").await.unwrap();
    assert!(pin::run_check(&ctx, "5678").is_ok());
    assert!(matches!(
        pin::run_check(&ctx, "4821"),
        Err(CliError::IncorrectPin)
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn run_sync_requires_sync_configuration() {
    let dir = tempdir().unwrap();
    let ctx = test_context(&dir).await;
    let error = sync::run_sync(&ctx).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] nook_core::Error),
    #[error(transparent)]
    Auth(#[from] nook_core::auth::AuthError),
    #[error(transparent)]
    Remote(#[from] nook_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("No record found for id/prefix: {0}")]
    NotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Vault is locked. Pass --pin or set NOOK_PIN.")]
    PinRequired,
    #[error("Incorrect PIN")]
    IncorrectPin,
    #[error(
        "Sync is not configured. Set remote_url and user_id in config.json, or NOOK_REMOTE_URL and NOOK_USER_ID."
    )]
    SyncNotConfigured,
}

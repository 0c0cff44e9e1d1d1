//! Client configuration.
//!
//! Values come from `config.json` in the data directory and are then
//! overridden by `NOOK_*` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SyncConfig;
use crate::util::{is_http_url, normalize_text_option};

const APP_DIR_NAME: &str = "nook";
const CONFIG_FILE_NAME: &str = "config.json";
const DATABASE_FILE_NAME: &str = "nook.db";
const DEVICE_FILE_NAME: &str = "device.json";

pub const ENV_REMOTE_URL: &str = "NOOK_REMOTE_URL";
pub const ENV_USER_ID: &str = "NOOK_USER_ID";
pub const ENV_AUTH_TOKEN: &str = "NOOK_AUTH_TOKEN";
pub const ENV_PUSH_INTERVAL_SECS: &str = "NOOK_PUSH_INTERVAL_SECS";
pub const ENV_DB_PATH: &str = "NOOK_DB_PATH";

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the HTTP remote store
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub push_interval_secs: Option<u64>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("remote_url", &self.remote_url)
            .field("user_id", &self.user_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("push_interval_secs", &self.push_interval_secs)
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// `<data dir>/nook`
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| Error::Config("Failed to resolve data directory".to_string()))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// Load the default config file and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&default_config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Read a config file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| normalize_text_option(lookup(name));

        if let Some(url) = text(ENV_REMOTE_URL) {
            self.remote_url = Some(url);
        }
        if let Some(user_id) = text(ENV_USER_ID) {
            self.user_id = Some(user_id);
        }
        if let Some(token) = text(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(raw) = text(ENV_PUSH_INTERVAL_SECS) {
            let secs = raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("{ENV_PUSH_INTERVAL_SECS} must be a number of seconds"))
            })?;
            self.push_interval_secs = Some(secs);
        }
        if let Some(path) = text(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(path));
        }

        self.normalize();
        self.validate()
    }

    fn normalize(&mut self) {
        self.remote_url = normalize_text_option(self.remote_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.user_id = normalize_text_option(self.user_id.take());
        self.auth_token = normalize_text_option(self.auth_token.take());
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote_url {
            if !is_http_url(url) {
                return Err(Error::Config(
                    "remote_url must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Database path: explicit setting, else `<data dir>/nook/nook.db`
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(DATABASE_FILE_NAME)),
        }
    }

    /// Device secrets live next to the database
    pub fn device_path(&self) -> Result<PathBuf> {
        let db_path = self.resolved_db_path()?;
        Ok(db_path
            .parent()
            .map_or_else(|| PathBuf::from(DEVICE_FILE_NAME), |dir| dir.join(DEVICE_FILE_NAME)))
    }

    /// Remote URL and user id, when sync is configured
    pub fn remote(&self) -> Option<(&str, &str)> {
        Some((self.remote_url.as_deref()?, self.user_id.as_deref()?))
    }

    pub fn sync_config(&self) -> SyncConfig {
        let config = SyncConfig::default();
        match self.push_interval_secs {
            Some(secs) => config.with_push_interval(Duration::from_secs(secs)),
            None => config,
        }
    }
}

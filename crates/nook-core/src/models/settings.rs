//! Application settings model

use serde::{Deserialize, Serialize};

/// Theme mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light theme
    Light,
    /// Dark theme
    Dark,
    /// Follow system preference
    #[default]
    System,
}

/// Per-user settings, synced as a singleton document
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Display name
    pub username: Option<String>,
    /// Theme mode
    pub theme: ThemeMode,
    /// Font size in pixels
    pub font_size: u32,
    /// Whether reminders should produce notifications
    pub reminders_enabled: bool,
    /// PIN wrapped under the biometric credential, when registered
    pub wrapped_pin: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: None,
            theme: ThemeMode::System,
            font_size: 14,
            reminders_enabled: true,
            wrapped_pin: None,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("username", &self.username)
            .field("theme", &self.theme)
            .field("font_size", &self.font_size)
            .field("reminders_enabled", &self.reminders_enabled)
            .field(
                "wrapped_pin",
                &self.wrapped_pin.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Settings together with their sync metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsRow {
    pub settings: Settings,
    /// Last mutation timestamp (Unix ms); 0 when never saved
    pub updated_at: i64,
    pub is_synced: bool,
}

//! Settings service
//!
//! Manages application settings persistence using JSON file storage.

use crate::config::{
    DEFAULT_PAGE_SIZE, DEFAULT_REMINDER_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SERVER_URL, MAX_PAGE_SIZE, MAX_REMINDER_INTERVAL_SECS, MAX_REQUEST_TIMEOUT_SECS,
    MIN_PAGE_SIZE, MIN_REMINDER_INTERVAL_SECS, MIN_REQUEST_TIMEOUT_SECS, SETTINGS_FILE,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Remote store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for one remote call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Entities requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_base_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Reminder polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between reminder checks
    #[serde(default = "default_reminder_interval")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_reminder_interval() -> u64 {
    DEFAULT_REMINDER_INTERVAL_SECS
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reminder_interval(),
        }
    }
}

impl ReminderSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub reminders: ReminderSettings,
}

impl AppSettings {
    /// Pull out-of-range values back inside their bounds
    pub fn clamped(mut self) -> Self {
        self.server.page_size = self.server.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        self.server.request_timeout_secs = self
            .server
            .request_timeout_secs
            .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS);
        self.reminders.interval_secs = self
            .reminders
            .interval_secs
            .clamp(MIN_REMINDER_INTERVAL_SECS, MAX_REMINDER_INTERVAL_SECS);
        self
    }
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;

        Ok(settings.clamped())
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    /// Point the client at a different server
    pub async fn update_server(&self, server: ServerSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.server = server;
        self.save(&settings.clamped()).await
    }

    /// Update reminder settings
    pub async fn update_reminders(&self, reminders: ReminderSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.reminders = reminders;
        self.save(&settings.clamped()).await
    }
}

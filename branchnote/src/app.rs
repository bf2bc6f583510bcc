//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::DATABASE_FILE;
use crate::database::{create_pool, LocalCache, Repository};
use crate::error::Result;
use crate::remote::{HttpRemoteStore, RemoteStore};
use crate::services::{
    AppSettings, Credentials, LogNotifier, Navigator, NotesService, ReminderTask,
    RemindersService, SettingsService,
};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub settings: AppSettings,
    pub settings_service: SettingsService,
    pub notes_service: NotesService,
    pub reminders_service: RemindersService,
    pub navigator: Arc<Mutex<Navigator>>,
    reminder_task: Arc<Mutex<Option<ReminderTask>>>,
    pool: Option<SqlitePool>,
}

impl AppState {
    /// Open a session on `app_data_dir`: settings, on-disk cache and the
    /// HTTP remote store from the configured server.
    pub async fn open(
        app_data_dir: &Path,
        credentials: Arc<dyn Credentials>,
        online: bool,
    ) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("App data directory: {:?}", app_data_dir);

        std::fs::create_dir_all(app_data_dir)?;

        let settings_service = SettingsService::new(app_data_dir.to_path_buf());
        let settings = settings_service.load().await?;

        let pool = create_pool(&app_data_dir.join(DATABASE_FILE)).await?;
        let remote = HttpRemoteStore::new(
            &settings.server.base_url,
            settings.server.request_timeout(),
        )?;

        let mut state = Self::with_stores(
            app_data_dir.to_path_buf(),
            settings_service,
            settings,
            Arc::new(Repository::new(pool.clone())),
            Arc::new(remote),
            credentials,
            online,
        )
        .await?;
        state.pool = Some(pool);

        tracing::info!("Application initialized successfully");
        Ok(state)
    }

    /// Assemble a session over caller-supplied stores
    pub async fn with_stores(
        app_data_dir: PathBuf,
        settings_service: SettingsService,
        settings: AppSettings,
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        credentials: Arc<dyn Credentials>,
        online: bool,
    ) -> Result<Self> {
        let notes_service =
            NotesService::new(cache, remote, credentials, settings.server.clone().into());
        notes_service.set_online(online);
        notes_service.load().await?;

        let reminders_service = RemindersService::new(notes_service.clone(), Arc::new(LogNotifier));

        Ok(Self {
            app_data_dir,
            settings,
            settings_service,
            notes_service,
            reminders_service,
            navigator: Arc::new(Mutex::new(Navigator::new())),
            reminder_task: Arc::new(Mutex::new(None)),
            pool: None,
        })
    }

    /// Start the reminder poller unless reminders are disabled
    pub async fn start_reminders(&self) -> bool {
        if !self.settings.reminders.enabled {
            tracing::info!("Reminders disabled, poller not started");
            return false;
        }

        let mut task = self.reminder_task.lock().await;
        if task.is_none() {
            let interval = self.settings.reminders.interval();
            *task = Some(self.reminders_service.clone().start(interval));
        }
        true
    }

    pub async fn stop_reminders(&self) {
        if let Some(task) = self.reminder_task.lock().await.take() {
            task.stop().await;
        }
    }

    /// End the session: stop background work and close the cache
    pub async fn shutdown(self) {
        tracing::info!("Shutting down");
        self.stop_reminders().await;
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_memory_pool;
    use crate::remote::MemoryRemoteStore;
    use crate::services::{ReminderSettings, StaticCredentials};
    use tempfile::TempDir;

    async fn create_test_state(reminders: ReminderSettings) -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let settings = AppSettings {
            reminders,
            ..Default::default()
        };
        let state = AppState::with_stores(
            temp_dir.path().to_path_buf(),
            SettingsService::new(temp_dir.path().to_path_buf()),
            settings,
            Arc::new(Repository::new(create_memory_pool().await.unwrap())),
            Arc::new(MemoryRemoteStore::new("token")),
            Arc::new(StaticCredentials::new("token")),
            true,
        )
        .await
        .unwrap();
        (state, temp_dir)
    }

    #[tokio::test]
    async fn test_disabled_reminders_do_not_start() {
        let (state, _temp) = create_test_state(ReminderSettings {
            enabled: false,
            interval_secs: 60,
        })
        .await;

        assert!(!state.start_reminders().await);
        assert!(state.reminder_task.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_poller() {
        let (state, _temp) = create_test_state(ReminderSettings::default()).await;

        assert!(state.start_reminders().await);
        assert!(state.start_reminders().await);
        let task = state.reminder_task.clone();
        assert!(task.lock().await.as_ref().unwrap().is_running());

        state.shutdown().await;
        assert!(task.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_open_creates_data_dir_and_settings() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("nested");

        let state = AppState::open(&data_dir, Arc::new(StaticCredentials::none()), false)
            .await
            .unwrap();

        assert!(data_dir.join(DATABASE_FILE).exists());
        assert!(data_dir.join(crate::config::SETTINGS_FILE).exists());
        assert!(state.notes_service.entities().await.is_empty());
        state.shutdown().await;
    }
}

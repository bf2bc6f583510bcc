//! Connectivity commands
//!
//! Entry points for the connectivity-change signal.

use crate::app::AppState;
use crate::error::Result;
use crate::services::SyncReport;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    /// Entities with changes not yet pushed
    pub pending: usize,
}

/// Connectivity returned: go online, push pending changes and follow any
/// identity remaps in the navigation stack.
pub async fn on_reconnect(state: &AppState) -> Result<SyncReport> {
    let report = state.notes_service.on_reconnect().await?;

    let entities = state.notes_service.entities().await;
    let mut navigator = state.navigator.lock().await;
    navigator.remap(&report.remapped);
    navigator.retain_existing(&entities);

    Ok(report)
}

/// Connectivity lost
pub fn on_disconnect(state: &AppState) {
    state.notes_service.set_online(false);
}

pub async fn sync_status(state: &AppState) -> SyncStatus {
    let pending = state
        .notes_service
        .entities()
        .await
        .iter()
        .filter(|e| !e.synced)
        .count();

    SyncStatus {
        online: state.notes_service.is_online(),
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{create, navigate_open};
    use crate::database::{create_memory_pool, EntityType, Repository};
    use crate::remote::MemoryRemoteStore;
    use crate::services::{AppSettings, SettingsService, StaticCredentials};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reconnect_remaps_open_folder() {
        let temp_dir = TempDir::new().unwrap();
        let state = AppState::with_stores(
            temp_dir.path().to_path_buf(),
            SettingsService::new(temp_dir.path().to_path_buf()),
            AppSettings::default(),
            Arc::new(Repository::new(create_memory_pool().await.unwrap())),
            Arc::new(MemoryRemoteStore::new("token")),
            Arc::new(StaticCredentials::new("token")),
            false,
        )
        .await
        .unwrap();

        let folder = create(&state, EntityType::Folder, None, None).await.unwrap();
        navigate_open(&state, &folder.id).await.unwrap();
        assert_eq!(sync_status(&state).await.pending, 1);

        let report = on_reconnect(&state).await.unwrap();

        let new_id = report.remapped_id(&folder.id).unwrap();
        assert_eq!(
            state.navigator.lock().await.active_folder_id(),
            Some(new_id)
        );
        let status = sync_status(&state).await;
        assert!(status.online);
        assert_eq!(status.pending, 0);
    }
}

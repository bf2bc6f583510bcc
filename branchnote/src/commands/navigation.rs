//! Navigation commands
//!
//! Folder open/back over the session's navigation stack.

use crate::app::AppState;
use crate::database::Entity;
use crate::error::Result;
use crate::services::{visible_entities, SortOrder};

/// Open a folder; returns the new active folder id
pub async fn navigate_open(state: &AppState, folder_id: &str) -> Result<String> {
    let folder = state.notes_service.folder(folder_id).await?;

    state.navigator.lock().await.open(folder.id.clone());
    tracing::debug!("Opened folder {}", folder.id);
    Ok(folder.id)
}

/// Go back one folder; returns the new active folder id (`None` is root)
pub async fn navigate_back(state: &AppState) -> Option<String> {
    let mut navigator = state.navigator.lock().await;
    navigator.back();
    navigator.active_folder_id().map(str::to_string)
}

pub async fn active_folder(state: &AppState) -> Option<String> {
    state
        .navigator
        .lock()
        .await
        .active_folder_id()
        .map(str::to_string)
}

/// Entities shown in the active folder, from the in-memory collection
pub async fn current_view(state: &AppState, search: Option<&str>, sort: SortOrder) -> Vec<Entity> {
    let active = active_folder(state).await;
    let entities = state.notes_service.entities().await;

    visible_entities(&entities, active.as_deref(), search, sort)
        .into_iter()
        .cloned()
        .collect()
}

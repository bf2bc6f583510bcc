//! Note-related commands
//!
//! Listing and CRUD for notes and folders.

use crate::app::AppState;
use crate::database::{Entity, EntityChanges, EntityType, NewEntity, Page};
use crate::error::{AppError, Result};
use crate::services::{visible_entities, SortOrder};
use serde::Serialize;

/// One page of a folder, filtered and sorted for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    pub parent_id: Option<String>,
    pub items: Vec<Entity>,
    pub total_count: u64,
    pub page: u32,
    pub page_count: u32,
}

/// List one page of the children of `parent_id` (root when `None`)
pub async fn list(state: &AppState, parent_id: Option<&str>, page: u32) -> Result<Page> {
    state.notes_service.list_page(parent_id, page).await
}

/// List a page and apply search and sort to it
pub async fn list_view(
    state: &AppState,
    parent_id: Option<&str>,
    page: u32,
    search: Option<&str>,
    sort: SortOrder,
) -> Result<FolderView> {
    let listed = list(state, parent_id, page).await?;
    let page_count = listed.page_count(state.notes_service.page_size());

    let items = visible_entities(&listed.items, parent_id, search, sort)
        .into_iter()
        .cloned()
        .collect();

    Ok(FolderView {
        parent_id: parent_id.map(str::to_string),
        items,
        total_count: listed.total_count,
        page: listed.page,
        page_count,
    })
}

/// Get a note or folder by ID
pub async fn get(state: &AppState, id: &str) -> Result<Entity> {
    state.notes_service.get_entity(id).await
}

/// Create a new note or folder
pub async fn create(
    state: &AppState,
    entity_type: EntityType,
    parent_id: Option<String>,
    title: Option<String>,
) -> Result<Entity> {
    let mut new = NewEntity::new(entity_type, parent_id);
    new.title = title;
    state.notes_service.create_entity(new).await
}

/// Edit a note or folder
pub async fn edit(state: &AppState, id: &str, changes: EntityChanges) -> Result<Entity> {
    if changes.is_empty() {
        return Err(AppError::validation("Nothing to change"));
    }
    state.notes_service.save_entity(id, changes).await
}

/// Delete a note, or a folder with everything inside it
pub async fn remove(state: &AppState, id: &str) -> Result<()> {
    state.notes_service.delete_entity(id).await?;

    let entities = state.notes_service.entities().await;
    state.navigator.lock().await.retain_existing(&entities);
    Ok(())
}

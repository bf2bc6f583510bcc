//! Commands exposed to the presentation surface
//!
//! This module organizes commands into logical submodules:
//! - `notes`: listing and note/folder CRUD
//! - `navigation`: folder stack and the derived folder view
//! - `sync`: connectivity changes and the sync sweep

pub mod navigation;
pub mod notes;
pub mod sync;

use crate::app::AppState;
use serde::Serialize;

pub use navigation::*;
pub use notes::*;
pub use sync::*;

/// Get application information
pub async fn get_app_info(state: &AppState) -> AppInfo {
    AppInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        app_data_dir: state.app_data_dir.to_string_lossy().to_string(),
        server_url: state.settings.server.base_url.clone(),
        online: state.notes_service.is_online(),
    }
}

/// Application information structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub version: String,
    pub app_data_dir: String,
    pub server_url: String,
    pub online: bool,
}

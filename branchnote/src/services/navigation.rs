//! Folder navigation
//!
//! Derives the visible folder view from the engine's collection and keeps
//! the stack of opened folders. Nothing here mutates entities.

use crate::database::Entity;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Ordering applied within the folder group and the file group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// `updatedAt`, newest first
    #[default]
    Recent,
    /// Title, ascending, ignoring case
    Alphabetical,
    /// `createdAt`, oldest first
    Oldest,
}

impl SortOrder {
    fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        match self {
            SortOrder::Recent => b.updated_at.cmp(&a.updated_at),
            SortOrder::Alphabetical => a
                .title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.title.cmp(&b.title)),
            SortOrder::Oldest => a.created_at.cmp(&b.created_at),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Recent => "recent",
            SortOrder::Alphabetical => "alphabetical",
            SortOrder::Oldest => "oldest",
        })
    }
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recent" => Ok(SortOrder::Recent),
            "alphabetical" | "alpha" => Ok(SortOrder::Alphabetical),
            "oldest" => Ok(SortOrder::Oldest),
            other => Err(AppError::validation(format!(
                "Unknown sort order '{}'. Use recent, alphabetical or oldest",
                other
            ))),
        }
    }
}

/// Children of `active_folder_id` matching `search`, folders first.
///
/// The sort is stable, so entities that compare equal keep their
/// collection order.
pub fn visible_entities<'a>(
    entities: &'a [Entity],
    active_folder_id: Option<&str>,
    search: Option<&str>,
    sort: SortOrder,
) -> Vec<&'a Entity> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();

    let mut visible: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.parent_id.as_deref() == active_folder_id)
        .filter(|e| e.matches_search(&needle))
        .collect();

    visible.sort_by(|a, b| {
        b.is_folder()
            .cmp(&a.is_folder())
            .then_with(|| sort.compare(a, b))
    });

    visible
}

/// Stack of opened folder ids; the top is the active folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigator {
    stack: Vec<String>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a folder. Opening the folder already on top does nothing.
    pub fn open(&mut self, folder_id: impl Into<String>) {
        let folder_id = folder_id.into();
        if self.stack.last() != Some(&folder_id) {
            self.stack.push(folder_id);
        }
    }

    /// Leave the active folder. Returns the folder left, if any.
    pub fn back(&mut self) -> Option<String> {
        self.stack.pop()
    }

    /// `None` means root
    pub fn active_folder_id(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn path(&self) -> &[String] {
        &self.stack
    }

    pub fn is_at_root(&self) -> bool {
        self.stack.is_empty()
    }

    /// Follow identity remaps made by a sync sweep
    pub fn remap(&mut self, remapped: &[(String, String)]) {
        for id in self.stack.iter_mut() {
            if let Some((_, new_id)) = remapped.iter().find(|(old, _)| old == id) {
                *id = new_id.clone();
            }
        }
    }

    /// Drop folders that no longer exist, along with everything opened
    /// inside them.
    pub fn retain_existing(&mut self, entities: &[Entity]) {
        if let Some(missing) = self
            .stack
            .iter()
            .position(|id| !entities.iter().any(|e| &e.id == id && e.is_folder()))
        {
            self.stack.truncate(missing);
        }
    }
}

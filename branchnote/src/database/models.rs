//! Entity models
//!
//! Notes and folders share one tagged `Entity` type, discriminated by
//! `EntityType`. All models use serde so they can cross the presentation
//! boundary as JSON.

use crate::config::{
    CLIENT_ID_PREFIX, DEFAULT_FILE_TITLE, DEFAULT_FOLDER_TITLE, MAX_TITLE_LENGTH,
};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Discriminator for the two kinds of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    File,
    Folder,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::Folder => "folder",
        }
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            EntityType::File => DEFAULT_FILE_TITLE,
            EntityType::Folder => DEFAULT_FOLDER_TITLE,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "note" => Ok(EntityType::File),
            "folder" => Ok(EntityType::Folder),
            other => Err(AppError::validation(format!(
                "Unknown entity type '{}'. Use 'file' or 'folder'",
                other
            ))),
        }
    }
}

fn default_synced() -> bool {
    true
}

/// A note (`File`) or a folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub title: String,
    /// Rich-text markup; always empty for folders
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub reminder_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notification_sent: bool,
    /// `false` while local changes are waiting to be pushed
    #[serde(default = "default_synced")]
    pub synced: bool,
}

impl Entity {
    /// Build a local-only entity under a fresh client-generated id.
    pub fn draft(new: NewEntity, now: DateTime<Utc>) -> Self {
        let mut entity = Self {
            id: new_client_id(),
            title: normalize_title(new.title.as_deref().unwrap_or(""), new.entity_type),
            content: new.content,
            tags: new.tags,
            entity_type: new.entity_type,
            parent_id: new.parent_id,
            created_at: now,
            updated_at: now,
            reminder_date: new.reminder_date,
            notification_sent: false,
            synced: false,
        };
        entity.normalize();
        entity
    }

    pub fn is_folder(&self) -> bool {
        self.entity_type == EntityType::Folder
    }

    pub fn is_file(&self) -> bool {
        self.entity_type == EntityType::File
    }

    /// True when the id was generated on this device and never pushed
    pub fn has_client_id(&self) -> bool {
        is_client_id(&self.id)
    }

    /// Apply an edit in place, refreshing `updated_at`.
    ///
    /// Changing the reminder clears `notification_sent`; resending the
    /// same reminder does not.
    pub fn apply_changes(&mut self, changes: &EntityChanges, now: DateTime<Utc>) {
        if let Some(title) = &changes.title {
            self.title = normalize_title(title, self.entity_type);
        }
        if let Some(content) = &changes.content {
            self.content = content.clone();
        }
        if let Some(tags) = &changes.tags {
            self.tags = parse_tags(tags);
        }
        if let Some(parent_id) = &changes.parent_id {
            self.parent_id = parent_id.clone();
        }
        if let Some(reminder_date) = changes.reminder_date {
            if self.reminder_date != reminder_date {
                self.reminder_date = reminder_date;
                self.notification_sent = false;
            }
        }
        self.updated_at = now;
        self.normalize();
    }

    /// Folders carry no content, tags, or reminder.
    pub fn normalize(&mut self) {
        if self.is_folder() {
            self.content.clear();
            self.tags.clear();
            self.reminder_date = None;
            self.notification_sent = false;
        }
    }

    /// Case-insensitive match against title, file content, and tags.
    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle)
            || (self.is_file() && self.content.to_lowercase().contains(needle))
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

/// Fields for a new note or folder
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reminder_date: Option<DateTime<Utc>>,
}

impl NewEntity {
    pub fn file(parent_id: Option<String>) -> Self {
        Self::new(EntityType::File, parent_id)
    }

    pub fn folder(parent_id: Option<String>) -> Self {
        Self::new(EntityType::Folder, parent_id)
    }

    pub fn new(entity_type: EntityType, parent_id: Option<String>) -> Self {
        Self {
            entity_type,
            parent_id,
            title: None,
            content: String::new(),
            tags: Vec::new(),
            reminder_date: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Edit request from the editing boundary.
///
/// `None` leaves a field untouched. `parent_id` and `reminder_date` use a
/// nested option so callers can explicitly clear them.
#[derive(Debug, Clone, Default)]
pub struct EntityChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Comma-delimited tag input
    pub tags: Option<String>,
    pub parent_id: Option<Option<String>>,
    pub reminder_date: Option<Option<DateTime<Utc>>>,
}

impl EntityChanges {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.parent_id.is_none()
            && self.reminder_date.is_none()
    }
}

/// Server-origin entity deleted while offline, waiting to be replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub id: String,
    pub entity_type: EntityType,
}

/// One page of a folder listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Entity>,
    pub total_count: u64,
    pub page: u32,
    /// Served from the local cache: every cached child in a single page
    pub from_cache: bool,
}

impl Page {
    pub fn page_count(&self, page_size: u32) -> u32 {
        if self.from_cache || page_size == 0 {
            return 1;
        }
        let pages = self.total_count.div_ceil(page_size as u64) as u32;
        pages.max(1)
    }
}

pub fn new_client_id() -> String {
    format!("{}{}", CLIENT_ID_PREFIX, Uuid::new_v4())
}

pub fn is_client_id(id: &str) -> bool {
    id.starts_with(CLIENT_ID_PREFIX)
}

/// Split comma-delimited tag input, trimming and dropping empty entries.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trim and bound a title, substituting the type's default when empty.
pub fn normalize_title(title: &str, entity_type: EntityType) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return entity_type.default_title().to_string();
    }
    trimmed.chars().take(MAX_TITLE_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            parse_tags(" work, ,urgent ,,  home"),
            vec!["work", "urgent", "home"]
        );
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , , ").is_empty());
    }

    #[test]
    fn test_draft_gets_client_id_and_defaults() {
        let entity = Entity::draft(NewEntity::file(None), Utc::now());
        assert!(entity.has_client_id());
        assert!(!entity.synced);
        assert_eq!(entity.title, DEFAULT_FILE_TITLE);

        let folder = Entity::draft(NewEntity::folder(None).with_title("   "), Utc::now());
        assert_eq!(folder.title, DEFAULT_FOLDER_TITLE);
    }

    #[test]
    fn test_folder_draft_drops_file_fields() {
        let mut new = NewEntity::folder(None).with_title("Recipes");
        new.content = "<p>ignored</p>".to_string();
        new.tags = vec!["x".to_string()];
        new.reminder_date = Some(Utc::now());

        let folder = Entity::draft(new, Utc::now());
        assert_eq!(folder.content, "");
        assert!(folder.tags.is_empty());
        assert!(folder.reminder_date.is_none());
    }

    #[test]
    fn test_reminder_change_clears_notification_sent() {
        let now = Utc::now();
        let mut entity = Entity::draft(NewEntity::file(None), now);
        entity.reminder_date = Some(now);
        entity.notification_sent = true;

        let changes = EntityChanges {
            reminder_date: Some(Some(now + Duration::hours(2))),
            ..Default::default()
        };
        entity.apply_changes(&changes, now + Duration::seconds(1));

        assert!(!entity.notification_sent);
        assert_eq!(entity.reminder_date, Some(now + Duration::hours(2)));
        assert_eq!(entity.updated_at, now + Duration::seconds(1));
    }

    #[test]
    fn test_untouched_reminder_keeps_notification_sent() {
        let now = Utc::now();
        let mut entity = Entity::draft(NewEntity::file(None), now);
        entity.notification_sent = true;

        entity.apply_changes(&EntityChanges::title("Renamed"), now);

        assert!(entity.notification_sent);
        assert_eq!(entity.title, "Renamed");
    }

    #[test]
    fn test_search_matches_title_content_and_tags() {
        let mut entity = Entity::draft(NewEntity::file(None).with_title("Pasta"), Utc::now());
        entity.content = "<p>Boil WATER</p>".to_string();
        entity.tags = vec!["Dinner".to_string()];

        assert!(entity.matches_search("past"));
        assert!(entity.matches_search("water"));
        assert!(entity.matches_search("dinn"));
        assert!(!entity.matches_search("salad"));
    }

    #[test]
    fn test_page_count() {
        let page = Page {
            items: Vec::new(),
            total_count: 25,
            page: 2,
            from_cache: false,
        };
        assert_eq!(page.page_count(20), 2);

        let empty = Page {
            items: Vec::new(),
            total_count: 0,
            page: 1,
            from_cache: false,
        };
        assert_eq!(empty.page_count(20), 1);

        let cached = Page {
            items: Vec::new(),
            total_count: 25,
            page: 1,
            from_cache: true,
        };
        assert_eq!(cached.page_count(20), 1);
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("Folder".parse::<EntityType>().unwrap(), EntityType::Folder);
        assert_eq!("note".parse::<EntityType>().unwrap(), EntityType::File);
        assert!("image".parse::<EntityType>().is_err());
    }
}

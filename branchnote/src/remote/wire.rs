//! Wire representation of entities
//!
//! Pure mapping between the server's JSON shape and `Entity`. Timestamps
//! travel as RFC 3339 strings; any optional field may be missing.

use crate::database::{Entity, EntityType};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Entity as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntity {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "type", default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub reminder_date: Option<String>,
    #[serde(default)]
    pub notification_sent: Option<bool>,
}

/// Mutable fields sent on create and on full-replace update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFields {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub parent_id: Option<String>,
    pub reminder_date: Option<String>,
    pub notification_sent: bool,
}

/// One page of a scoped listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePage {
    #[serde(alias = "notes", alias = "entities")]
    pub items: Vec<RemoteEntity>,
    pub total_count: u64,
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize a server entity. Anything coming from the server is synced.
///
/// Titles are taken as sent; only a blank one falls back to the default.
pub fn from_remote(wire: RemoteEntity) -> Entity {
    let now = Utc::now();
    let entity_type = wire.entity_type.unwrap_or(EntityType::File);
    let created_at = parse_timestamp(wire.created_at.as_deref()).unwrap_or(now);
    let updated_at = parse_timestamp(wire.updated_at.as_deref()).unwrap_or(created_at);

    let mut entity = Entity {
        id: wire.id,
        title: wire
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| entity_type.default_title().to_string()),
        content: wire.content.unwrap_or_default(),
        tags: wire.tags.unwrap_or_default(),
        entity_type,
        parent_id: wire.parent_id,
        created_at,
        updated_at,
        reminder_date: parse_timestamp(wire.reminder_date.as_deref()),
        notification_sent: wire.notification_sent.unwrap_or(false),
        synced: true,
    };
    entity.normalize();
    entity
}

/// Fields the server accepts back for `entity`
pub fn to_remote(entity: &Entity) -> RemoteFields {
    RemoteFields {
        title: entity.title.clone(),
        content: entity.content.clone(),
        tags: entity.tags.clone(),
        entity_type: entity.entity_type,
        parent_id: entity.parent_id.clone(),
        reminder_date: entity.reminder_date.as_ref().map(format_timestamp),
        notification_sent: entity.notification_sent,
    }
}

/// Full server-side representation of `entity`
pub fn to_wire(entity: &Entity) -> RemoteEntity {
    RemoteEntity {
        id: entity.id.clone(),
        title: Some(entity.title.clone()),
        content: Some(entity.content.clone()),
        tags: Some(entity.tags.clone()),
        entity_type: Some(entity.entity_type),
        parent_id: entity.parent_id.clone(),
        created_at: Some(format_timestamp(&entity.created_at)),
        updated_at: Some(format_timestamp(&entity.updated_at)),
        reminder_date: entity.reminder_date.as_ref().map(format_timestamp),
        notification_sent: Some(entity.notification_sent),
    }
}

//! In-process remote store
//!
//! Holds the authoritative copy in memory and honors the same contract as
//! the HTTP server: bearer check, one-level folder cascade, scoped listing
//! sorted by `updatedAt` descending. Connectivity and latency can be
//! switched at runtime, and every call is recorded, which makes it the
//! stand-in server for tests and local demos.

use super::wire::{to_wire, RemoteEntity, RemoteFields, RemotePage};
use super::RemoteStore;
use crate::database::Entity;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// One attempted call, recorded whether or not it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub target: Option<String>,
}

struct ServerState {
    entities: HashMap<String, Entity>,
    tokens: HashSet<String>,
    online: bool,
    latency: Option<Duration>,
    calls: Vec<RemoteCall>,
    next_id: u64,
    last_stamp: DateTime<Utc>,
}

impl ServerState {
    /// Millisecond timestamps that strictly increase per mutation
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let stamp = if now <= self.last_stamp {
            self.last_stamp + ChronoDuration::milliseconds(1)
        } else {
            now
        };
        self.last_stamp = stamp;
        stamp
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:024x}", self.next_id)
    }

    fn check_parent(&self, parent_id: Option<&str>) -> Result<()> {
        match parent_id {
            None => Ok(()),
            Some(id) => match self.entities.get(id) {
                Some(parent) if parent.is_folder() => Ok(()),
                _ => Err(AppError::Validation(format!(
                    "Parent {} is not an existing folder",
                    id
                ))),
            },
        }
    }
}

fn apply_fields(entity: &mut Entity, fields: &RemoteFields) {
    entity.title = fields.title.clone();
    entity.content = fields.content.clone();
    entity.tags = fields.tags.clone();
    entity.entity_type = fields.entity_type;
    entity.parent_id = fields.parent_id.clone();
    entity.reminder_date = fields
        .reminder_date
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    entity.notification_sent = fields.notification_sent;
    entity.normalize();
}

/// Remote store kept in process memory
#[derive(Clone)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryRemoteStore {
    /// Online server accepting `token`
    pub fn new(token: &str) -> Self {
        let mut tokens = HashSet::new();
        tokens.insert(token.to_string());

        Self {
            state: Arc::new(Mutex::new(ServerState {
                entities: HashMap::new(),
                tokens,
                online: true,
                latency: None,
                calls: Vec::new(),
                next_id: 0x66a1_0000,
                last_stamp: DateTime::<Utc>::MIN_UTC,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    pub fn accept_token(&self, token: &str) {
        self.lock().tokens.insert(token.to_string());
    }

    pub fn revoke_token(&self, token: &str) {
        self.lock().tokens.remove(token);
    }

    /// Delay applied before every call is answered
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Server-side copy of one entity
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.lock().entities.get(id).cloned()
    }

    /// Every entity the server holds
    pub fn entities(&self) -> Vec<Entity> {
        self.lock().entities.values().cloned().collect()
    }

    async fn enter(&self, op: RemoteOp, target: Option<&str>, token: &str) -> Result<()> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(RemoteCall {
                op,
                target: target.map(str::to_string),
            });
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if !state.online {
            return Err(AppError::NetworkUnavailable("connection refused".to_string()));
        }
        if !state.tokens.contains(token) {
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(
        &self,
        token: &str,
        parent_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<RemotePage> {
        self.enter(RemoteOp::List, parent_id, token).await?;

        let state = self.lock();
        let mut children: Vec<&Entity> = state
            .entities
            .values()
            .filter(|e| e.parent_id.as_deref() == parent_id)
            .collect();
        children.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total_count = children.len() as u64;
        let items = children
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(to_wire)
            .collect();

        Ok(RemotePage { items, total_count })
    }

    async fn get(&self, token: &str, id: &str) -> Result<RemoteEntity> {
        self.enter(RemoteOp::Get, Some(id), token).await?;

        self.lock()
            .entities
            .get(id)
            .map(to_wire)
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    async fn create(&self, token: &str, fields: &RemoteFields) -> Result<RemoteEntity> {
        self.enter(RemoteOp::Create, None, token).await?;

        let mut state = self.lock();
        state.check_parent(fields.parent_id.as_deref())?;

        let now = state.stamp();
        let mut entity = Entity {
            id: state.allocate_id(),
            title: String::new(),
            content: String::new(),
            tags: Vec::new(),
            entity_type: fields.entity_type,
            parent_id: None,
            created_at: now,
            updated_at: now,
            reminder_date: None,
            notification_sent: false,
            synced: true,
        };
        apply_fields(&mut entity, fields);

        let wire = to_wire(&entity);
        state.entities.insert(entity.id.clone(), entity);
        Ok(wire)
    }

    async fn update(&self, token: &str, id: &str, fields: &RemoteFields) -> Result<RemoteEntity> {
        self.enter(RemoteOp::Update, Some(id), token).await?;

        let mut state = self.lock();
        if !state.entities.contains_key(id) {
            return Err(AppError::NotFound(id.to_string()));
        }
        state.check_parent(fields.parent_id.as_deref())?;

        let now = state.stamp();
        let entity = state
            .entities
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        apply_fields(entity, fields);
        entity.updated_at = now;

        Ok(to_wire(entity))
    }

    async fn delete(&self, token: &str, id: &str) -> Result<()> {
        self.enter(RemoteOp::Delete, Some(id), token).await?;

        let mut state = self.lock();
        let removed = state
            .entities
            .remove(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if removed.is_folder() {
            state
                .entities
                .retain(|_, e| e.parent_id.as_deref() != Some(id));
        }
        Ok(())
    }
}

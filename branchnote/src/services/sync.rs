//! Sync sweep
//!
//! Pushes everything changed while offline once connectivity returns:
//! queued deletes are replayed first, then pending entities are created or
//! updated parents-before-children. Per-entity failures are reported and
//! left pending for the next sweep.

use super::notes::NotesService;
use crate::database::{is_client_id, Entity};
use crate::error::{AppError, Result};
use crate::remote::{from_remote, to_remote};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Outcome of one sync sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Entities created on the server
    pub created: usize,
    pub updated: usize,
    /// Queued deletes replayed on the server
    pub deleted: usize,
    /// Client id to server id, for every entity created
    pub remapped: Vec<(String, String)>,
    /// Entities left pending, with the reason
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created == 0
            && self.updated == 0
            && self.deleted == 0
            && self.failed.is_empty()
    }

    /// Server id assigned to `client_id` during this sweep
    pub fn remapped_id(&self, client_id: &str) -> Option<&str> {
        self.remapped
            .iter()
            .find(|(old, _)| old == client_id)
            .map(|(_, new)| new.as_str())
    }
}

/// Whether the sweep can go on after a failed push
fn should_abort(err: &AppError) -> bool {
    err.is_network() || matches!(err, AppError::Unauthorized | AppError::Storage(_))
}

/// Distance from the root through cached parents
fn depth(entity: &Entity, by_id: &HashMap<&str, &Entity>) -> usize {
    let mut depth = 0;
    let mut cursor = entity.parent_id.as_deref();
    while let Some(parent_id) = cursor {
        depth += 1;
        if depth > by_id.len() {
            break;
        }
        cursor = by_id.get(parent_id).and_then(|p| p.parent_id.as_deref());
    }
    depth
}

impl NotesService {
    /// Mark the engine online and push pending changes
    pub async fn on_reconnect(&self) -> Result<SyncReport> {
        self.set_online(true);
        self.sync_offline_notes().await
    }

    /// Push every pending change to the server.
    ///
    /// Running it again with nothing pending is a no-op.
    pub async fn sync_offline_notes(&self) -> Result<SyncReport> {
        if !self.is_online() {
            return Err(AppError::NetworkUnavailable(
                "cannot sync while offline".to_string(),
            ));
        }
        if self.credentials.token().await.is_none() {
            return Err(AppError::Unauthorized);
        }

        tracing::info!("Starting sync sweep");
        let mut report = SyncReport::default();

        if self.replay_deletes(&mut report).await {
            self.push_pending(&mut report).await;
        }

        if report.failed.is_empty() {
            tracing::info!(
                "Sync sweep complete: {} created, {} updated, {} deleted",
                report.created,
                report.updated,
                report.deleted
            );
        } else {
            tracing::warn!(
                "Sync sweep left {} entities pending: {:?}",
                report.failed.len(),
                report.failed
            );
        }

        Ok(report)
    }

    /// Returns false when the sweep should stop here
    async fn replay_deletes(&self, report: &mut SyncReport) -> bool {
        let pending = match self.cache.pending_deletes().await {
            Ok(pending) => pending,
            Err(e) => {
                report.failed.push(("pending deletes".to_string(), e.to_string()));
                return false;
            }
        };

        for tombstone in pending {
            let outcome = match self
                .delete_remote_tree(&tombstone.id, tombstone.entity_type)
                .await
            {
                Ok(()) | Err(AppError::NotFound(_)) => {
                    self.cache.clear_pending_delete(&tombstone.id).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!("Replayed delete of {}", tombstone.id);
                    report.deleted += 1;
                }
                Err(e) => {
                    let abort = should_abort(&e);
                    report.failed.push((tombstone.id, e.to_string()));
                    if abort {
                        return false;
                    }
                }
            }
        }

        true
    }

    async fn push_pending(&self, report: &mut SyncReport) {
        let cached = match self.cache.get_all().await {
            Ok(cached) => cached,
            Err(e) => {
                report.failed.push(("local cache".to_string(), e.to_string()));
                return;
            }
        };

        let mut pending: Vec<(usize, Entity)> = {
            let by_id: HashMap<&str, &Entity> = cached.iter().map(|e| (e.id.as_str(), e)).collect();
            cached
                .iter()
                .filter(|e| !e.synced)
                .map(|e| (depth(e, &by_id), e.clone()))
                .collect()
        };
        pending.sort_by_key(|(depth, e)| (*depth, !e.is_folder()));

        let cached_ids: HashSet<String> = cached.iter().map(|e| e.id.clone()).collect();
        let mut remaps: HashMap<String, String> = HashMap::new();

        for (_, mut entity) in pending {
            if let Some(new_parent) = entity
                .parent_id
                .as_ref()
                .and_then(|parent_id| remaps.get(parent_id))
            {
                entity.parent_id = Some(new_parent.clone());
            }

            if let Some(parent_id) = entity.parent_id.clone().filter(|p| is_client_id(p)) {
                if cached_ids.contains(&parent_id) {
                    tracing::debug!("Skipping {}: parent {} not pushed yet", entity.id, parent_id);
                    report
                        .failed
                        .push((entity.id, format!("parent {} not synced yet", parent_id)));
                    continue;
                }

                // The parent is gone for good; keep the entity at the root
                tracing::warn!(
                    "Parent {} of {} no longer exists, moving it to the root",
                    parent_id,
                    entity.id
                );
                entity.parent_id = None;
                if let Err(e) = self.store(entity.clone()).await {
                    let abort = should_abort(&e);
                    report.failed.push((entity.id, e.to_string()));
                    if abort {
                        return;
                    }
                    continue;
                }
            }

            let id = entity.id.clone();
            let result = if entity.has_client_id() {
                self.push_created(entity).await.map(|new_id| {
                    report.created += 1;
                    report.remapped.push((id.clone(), new_id.clone()));
                    remaps.insert(id.clone(), new_id);
                })
            } else {
                self.push_updated(entity).await.map(|()| {
                    report.updated += 1;
                })
            };

            if let Err(e) = result {
                tracing::warn!("Failed to sync {}: {}", id, e);
                let abort = should_abort(&e);
                report.failed.push((id, e.to_string()));
                if abort {
                    return;
                }
            }
        }
    }

    /// Create an offline entity on the server and move it to its new id
    async fn push_created(&self, entity: Entity) -> Result<String> {
        let fields = to_remote(&entity);
        let remote = &self.remote;
        let fields = &fields;
        let wire = self
            .call_remote(|token| async move { remote.create(&token, fields).await })
            .await?;

        let pushed = from_remote(wire);
        let old_id = entity.id;
        let new_id = pushed.id.clone();

        // Children are repointed in the same cache write
        self.cache.replace(&old_id, &pushed).await?;
        {
            let mut entities = self.entities.write().await;
            entities.retain(|e| e.id != new_id);
            match entities.iter_mut().find(|e| e.id == old_id) {
                Some(slot) => *slot = pushed,
                None => entities.push(pushed),
            }
            for child in entities
                .iter_mut()
                .filter(|e| e.parent_id.as_deref() == Some(old_id.as_str()))
            {
                child.parent_id = Some(new_id.clone());
            }
        }
        if self.selected_id().await.as_deref() == Some(old_id.as_str()) {
            self.select(Some(new_id.clone())).await;
        }

        tracing::info!("Pushed {} as {}", old_id, new_id);
        Ok(new_id)
    }

    async fn push_updated(&self, entity: Entity) -> Result<()> {
        let fields = to_remote(&entity);
        let remote = &self.remote;
        let id = entity.id.as_str();
        let fields = &fields;

        match self
            .call_remote(|token| async move { remote.update(&token, id, fields).await })
            .await
        {
            Ok(wire) => {
                self.store(from_remote(wire)).await?;
                tracing::debug!("Pushed edit of {}", id);
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                self.drop_stale(id).await;
                Err(AppError::NotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

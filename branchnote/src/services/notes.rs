//! Notes service
//!
//! The reconciliation engine. Owns the in-memory entity collection shown
//! to the navigation layer and mediates every mutation across the remote
//! store and the local cache.
//!
//! Each operation picks the online or offline path once, at call time:
//! - online (connected and signed in, entity already synced): the remote
//!   store is written first and the local cache mirrors the result
//! - offline, or the remote call fails on network grounds: the change is
//!   applied to the local cache only and marked `synced = false` until the
//!   next sync sweep (see `services::sync`)

use crate::database::{
    is_client_id, Entity, EntityChanges, EntityType, LocalCache, NewEntity, Page, PendingDelete,
};
use crate::error::{AppError, Result};
use crate::remote::{from_remote, to_remote, RemoteEntity, RemoteStore};
use crate::services::credentials::Credentials;
use crate::services::settings::ServerSettings;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Tunables for the engine
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub page_size: u32,
    /// Bound applied to every remote call; elapsing counts as a network failure
    pub request_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        ServerSettings::default().into()
    }
}

impl From<ServerSettings> for EngineOptions {
    fn from(server: ServerSettings) -> Self {
        Self {
            page_size: server.page_size,
            request_timeout: server.request_timeout(),
        }
    }
}

/// Service for managing notes and folders
#[derive(Clone)]
pub struct NotesService {
    pub(super) cache: Arc<dyn LocalCache>,
    pub(super) remote: Arc<dyn RemoteStore>,
    pub(super) credentials: Arc<dyn Credentials>,
    pub(super) entities: Arc<RwLock<Vec<Entity>>>,
    selected: Arc<RwLock<Option<String>>>,
    online: Arc<AtomicBool>,
    options: EngineOptions,
}

impl NotesService {
    pub fn new(
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        credentials: Arc<dyn Credentials>,
        options: EngineOptions,
    ) -> Self {
        Self {
            cache,
            remote,
            credentials,
            entities: Arc::new(RwLock::new(Vec::new())),
            selected: Arc::new(RwLock::new(None)),
            online: Arc::new(AtomicBool::new(true)),
            options,
        }
    }

    /// Fill the in-memory collection from the local cache
    pub async fn load(&self) -> Result<usize> {
        let cached = self.cache.get_all().await?;
        let count = cached.len();
        *self.entities.write().await = cached;

        tracing::info!("Loaded {} cached entities", count);
        Ok(count)
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn page_size(&self) -> u32 {
        self.options.page_size
    }

    /// Snapshot of the in-memory collection
    pub async fn entities(&self) -> Vec<Entity> {
        self.entities.read().await.clone()
    }

    pub async fn find(&self, id: &str) -> Option<Entity> {
        self.entities
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Entity currently open for editing
    pub async fn selected_id(&self) -> Option<String> {
        self.selected.read().await.clone()
    }

    pub async fn select(&self, id: Option<String>) {
        *self.selected.write().await = id;
    }

    // ===== User intents =====

    /// Create a note or folder and select it for editing
    pub async fn create_entity(&self, new: NewEntity) -> Result<Entity> {
        tracing::info!("Creating {} under {:?}", new.entity_type, new.parent_id);

        self.validate_parent(new.parent_id.as_deref(), None).await?;

        let draft = Entity::draft(new, Utc::now());
        let parent_pending = draft.parent_id.as_deref().is_some_and(is_client_id);

        let entity = if !parent_pending && self.remote_ready().await {
            let fields = to_remote(&draft);
            let remote = &self.remote;
            let fields = &fields;
            match self
                .call_remote(|token| async move { remote.create(&token, fields).await })
                .await
            {
                Ok(wire) => from_remote(wire),
                Err(e) if e.is_network() => {
                    tracing::warn!("Create fell back to offline: {}", e);
                    draft
                }
                Err(e) => return Err(e),
            }
        } else {
            draft
        };

        self.store(entity.clone()).await?;
        self.select(Some(entity.id.clone())).await;

        tracing::info!("Created {} {} (synced: {})", entity.entity_type, entity.id, entity.synced);
        Ok(entity)
    }

    /// Apply an edit, pushing it when the entity is synced and we are online
    pub async fn save_entity(&self, id: &str, changes: EntityChanges) -> Result<Entity> {
        tracing::debug!("Saving entity: {}", id);

        let current = self
            .find(id)
            .await
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if let Some(parent_id) = &changes.parent_id {
            self.validate_parent(parent_id.as_deref(), Some(&current))
                .await?;
        }

        let mut updated = current.clone();
        updated.apply_changes(&changes, Utc::now());

        self.commit(&current, updated).await
    }

    /// Delete an entity; folders take their whole subtree with them
    pub async fn delete_entity(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting entity: {}", id);

        let entity = self
            .find(id)
            .await
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let known = self.known_entities().await?;
        let subtree = collect_subtree(&known, id);

        let mut deleted_remotely = false;
        if entity.synced && !entity.has_client_id() && self.remote_ready().await {
            match self.delete_remote_tree(&entity.id, entity.entity_type).await {
                Ok(()) => deleted_remotely = true,
                Err(AppError::NotFound(_)) => {
                    self.drop_local(&subtree).await?;
                    return Err(AppError::NotFound(id.to_string()));
                }
                Err(e) if e.is_network() => {
                    tracing::warn!("Delete fell back to offline: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if !deleted_remotely {
            for doomed in subtree.iter().filter(|e| !e.has_client_id()) {
                self.cache
                    .add_pending_delete(&PendingDelete {
                        id: doomed.id.clone(),
                        entity_type: doomed.entity_type,
                    })
                    .await?;
            }
        }

        self.drop_local(&subtree).await?;

        tracing::info!("Deleted {} entities rooted at {}", subtree.len(), id);
        Ok(())
    }

    /// One page of the children of `parent_id` (root when `None`).
    ///
    /// Online, the page is fetched and merged into the collection. Offline,
    /// every cached child is returned as a single page.
    pub async fn list_page(&self, parent_id: Option<&str>, page: u32) -> Result<Page> {
        let page = page.max(1);

        if self.is_online() {
            let limit = self.options.page_size;
            let offset = (page - 1).saturating_mul(limit);
            let remote = &self.remote;
            match self
                .call_remote(|token| async move {
                    remote.list(&token, parent_id, limit, offset).await
                })
                .await
            {
                Ok(remote_page) => {
                    let fetched = remote_page.items.len() as u64;
                    let complete = offset == 0 && fetched >= remote_page.total_count;
                    let items = self.merge_remote(remote_page.items).await?;
                    if complete {
                        self.prune_missing_children(parent_id, &items).await?;
                    }
                    return Ok(Page {
                        items,
                        total_count: remote_page.total_count,
                        page,
                        from_cache: false,
                    });
                }
                Err(e) if e.is_network() => {
                    tracing::warn!("Listing fell back to local cache: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        self.list_cached(parent_id).await
    }

    /// Fetch one entity, refreshing the cached copy when online
    pub async fn get_entity(&self, id: &str) -> Result<Entity> {
        if !is_client_id(id) && self.remote_ready().await {
            let remote = &self.remote;
            match self
                .call_remote(|token| async move { remote.get(&token, id).await })
                .await
            {
                Ok(wire) => {
                    let mut merged = self.merge_remote(vec![wire]).await?;
                    if let Some(entity) = merged.pop() {
                        return Ok(entity);
                    }
                    return Err(AppError::NotFound(id.to_string()));
                }
                Err(AppError::NotFound(_)) => {
                    self.drop_stale(id).await;
                    return Err(AppError::NotFound(id.to_string()));
                }
                Err(e) if e.is_network() => {
                    tracing::debug!("Serving {} from memory: {}", id, e);
                }
                Err(e) => return Err(e),
            }
        }

        self.find(id)
            .await
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// Record that the reminder for `id` has fired
    pub async fn mark_notification_sent(&self, id: &str) -> Result<Entity> {
        let current = self
            .find(id)
            .await
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if current.notification_sent {
            return Ok(current);
        }

        let mut updated = current.clone();
        updated.notification_sent = true;
        updated.updated_at = Utc::now();

        self.commit(&current, updated).await
    }

    /// Look up a folder by id, rejecting notes
    pub async fn folder(&self, id: &str) -> Result<Entity> {
        let entity = self
            .find(id)
            .await
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if !entity.is_folder() {
            return Err(AppError::validation(format!("'{}' is not a folder", entity.title)));
        }
        Ok(entity)
    }

    // ===== Remote plumbing =====

    /// Online and holding a credential
    pub(super) async fn remote_ready(&self) -> bool {
        self.is_online() && self.credentials.token().await.is_some()
    }

    /// Run a remote call under the timeout, refreshing the credential and
    /// retrying once when the server rejects it.
    pub(super) async fn call_remote<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self
            .credentials
            .token()
            .await
            .ok_or(AppError::Unauthorized)?;

        match self.with_timeout(op(token)).await {
            Err(AppError::Unauthorized) => {
                tracing::info!("Server rejected credential, refreshing");
                self.credentials
                    .refresh()
                    .await
                    .map_err(|_| AppError::Unauthorized)?;
                let token = self
                    .credentials
                    .token()
                    .await
                    .ok_or(AppError::Unauthorized)?;
                self.with_timeout(op(token)).await
            }
            other => other,
        }
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.options.request_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(AppError::NetworkUnavailable(format!(
                    "no response within {}s",
                    self.options.request_timeout.as_secs_f32()
                )))
            })
    }

    /// Every child of `parent_id` on the server, across all pages
    async fn list_all_remote_children(&self, parent_id: &str) -> Result<Vec<RemoteEntity>> {
        let limit = self.options.page_size.max(1);
        let remote = &self.remote;
        let mut children = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self
                .call_remote(|token| async move {
                    remote.list(&token, Some(parent_id), limit, offset).await
                })
                .await?;

            let fetched = page.items.len() as u32;
            children.extend(page.items);
            offset += fetched;

            if fetched == 0 || offset as u64 >= page.total_count {
                return Ok(children);
            }
        }
    }

    /// Delete `id` on the server without leaving orphans.
    ///
    /// The server only cascades one level, so nested folders are deleted
    /// deepest first before the entity itself.
    pub(super) async fn delete_remote_tree(&self, id: &str, entity_type: EntityType) -> Result<()> {
        let mut nested_folders = Vec::new();

        if entity_type == EntityType::Folder {
            let mut queue = VecDeque::from([id.to_string()]);
            while let Some(folder_id) = queue.pop_front() {
                for child in self.list_all_remote_children(&folder_id).await? {
                    if child.entity_type == Some(EntityType::Folder) {
                        nested_folders.push(child.id.clone());
                        queue.push_back(child.id);
                    }
                }
            }
        }

        let remote = &self.remote;
        for folder_id in nested_folders.iter().rev() {
            let folder_id = folder_id.as_str();
            match self
                .call_remote(|token| async move { remote.delete(&token, folder_id).await })
                .await
            {
                Ok(()) | Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.call_remote(|token| async move { remote.delete(&token, id).await })
            .await
    }

    // ===== Local plumbing =====

    /// Persist an edit on the online path when possible, otherwise locally
    /// as pending.
    async fn commit(&self, current: &Entity, mut updated: Entity) -> Result<Entity> {
        let parent_pending = updated.parent_id.as_deref().is_some_and(is_client_id);

        if current.synced && !current.has_client_id() && !parent_pending && self.remote_ready().await
        {
            let fields = to_remote(&updated);
            let remote = &self.remote;
            let id = current.id.as_str();
            let fields = &fields;
            match self
                .call_remote(|token| async move { remote.update(&token, id, fields).await })
                .await
            {
                Ok(wire) => {
                    let saved = from_remote(wire);
                    self.store(saved.clone()).await?;
                    return Ok(saved);
                }
                Err(AppError::NotFound(_)) => {
                    self.drop_stale(id).await;
                    return Err(AppError::NotFound(id.to_string()));
                }
                Err(e) if e.is_network() => {
                    tracing::warn!("Saved {} offline: {}", id, e);
                }
                Err(e) => return Err(e),
            }
        }

        updated.synced = false;
        self.store(updated.clone()).await?;
        Ok(updated)
    }

    /// Write to the cache, then to memory. A cache failure leaves memory
    /// untouched.
    pub(super) async fn store(&self, entity: Entity) -> Result<()> {
        self.cache.put(&entity).await?;
        upsert(&mut *self.entities.write().await, entity);
        Ok(())
    }

    /// Cache contents plus anything only held in memory
    async fn known_entities(&self) -> Result<Vec<Entity>> {
        let mut known = self.cache.get_all().await?;
        let cached: HashSet<String> = known.iter().map(|e| e.id.clone()).collect();
        known.extend(
            self.entities
                .read()
                .await
                .iter()
                .filter(|e| !cached.contains(&e.id))
                .cloned(),
        );
        Ok(known)
    }

    pub(super) async fn drop_local(&self, doomed: &[Entity]) -> Result<()> {
        for entity in doomed {
            self.cache.delete(&entity.id).await?;
        }

        let ids: HashSet<&str> = doomed.iter().map(|e| e.id.as_str()).collect();
        self.entities
            .write()
            .await
            .retain(|e| !ids.contains(e.id.as_str()));

        let mut selected = self.selected.write().await;
        if selected.as_deref().is_some_and(|s| ids.contains(s)) {
            *selected = None;
        }
        Ok(())
    }

    /// Forget an entity the server no longer has, along with everything
    /// filed under it
    pub(super) async fn drop_stale(&self, id: &str) {
        let result = match self.known_entities().await {
            Ok(known) => {
                let stale = collect_subtree(&known, id);
                tracing::info!("Dropping stale entity {} ({} records)", id, stale.len());
                self.drop_local(&stale).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to drop stale entity {}: {}", id, e);
        }
    }

    /// Fold fetched entities into cache and memory. Local copies with
    /// unpushed edits win, and entities queued for deletion stay gone.
    async fn merge_remote(&self, fetched: Vec<RemoteEntity>) -> Result<Vec<Entity>> {
        let tombstoned: HashSet<String> = self
            .cache
            .pending_deletes()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut merged = Vec::with_capacity(fetched.len());
        for wire in fetched {
            let entity = from_remote(wire);
            if tombstoned.contains(&entity.id) {
                continue;
            }
            match self.find(&entity.id).await {
                Some(local) if !local.synced => merged.push(local),
                _ => {
                    self.store(entity.clone()).await?;
                    merged.push(entity);
                }
            }
        }
        Ok(merged)
    }

    /// After a complete listing of `parent_id`, synced local children the
    /// server did not return were deleted elsewhere.
    async fn prune_missing_children(&self, parent_id: Option<&str>, listed: &[Entity]) -> Result<()> {
        let listed: HashSet<&str> = listed.iter().map(|e| e.id.as_str()).collect();
        let known = self.known_entities().await?;

        let mut doomed = Vec::new();
        for missing in known.iter().filter(|e| {
            e.parent_id.as_deref() == parent_id
                && e.synced
                && !e.has_client_id()
                && !listed.contains(e.id.as_str())
        }) {
            doomed.extend(collect_subtree(&known, &missing.id));
        }

        if !doomed.is_empty() {
            tracing::info!("Removing {} entities deleted on the server", doomed.len());
            self.drop_local(&doomed).await?;
        }
        Ok(())
    }

    async fn list_cached(&self, parent_id: Option<&str>) -> Result<Page> {
        let cached = self.cache.get_all().await?;
        if cached.is_empty() {
            return Err(AppError::NetworkUnavailable(
                "cannot load notes while offline: nothing has been cached yet".to_string(),
            ));
        }

        *self.entities.write().await = cached.clone();

        let items: Vec<Entity> = cached
            .into_iter()
            .filter(|e| e.parent_id.as_deref() == parent_id)
            .collect();

        Ok(Page {
            total_count: items.len() as u64,
            items,
            page: 1,
            from_cache: true,
        })
    }

    /// Parent must be an existing folder, and a folder may not move into
    /// itself or its own subtree.
    async fn validate_parent(&self, parent_id: Option<&str>, moving: Option<&Entity>) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };

        let entities = self.entities.read().await;
        let by_id: HashMap<&str, &Entity> = entities.iter().map(|e| (e.id.as_str(), e)).collect();

        let parent = by_id.get(parent_id).ok_or_else(|| {
            AppError::validation(format!("Parent folder {} does not exist", parent_id))
        })?;
        if !parent.is_folder() {
            return Err(AppError::validation(format!(
                "'{}' is a note, not a folder",
                parent.title
            )));
        }

        if let Some(moving) = moving {
            let mut cursor = Some(parent_id);
            let mut seen = HashSet::new();
            while let Some(id) = cursor {
                if id == moving.id {
                    return Err(AppError::validation(format!(
                        "Cannot move '{}' into itself or one of its subfolders",
                        moving.title
                    )));
                }
                if !seen.insert(id) {
                    break;
                }
                cursor = by_id.get(id).and_then(|e| e.parent_id.as_deref());
            }
        }

        Ok(())
    }
}

/// Replace the entry with the same id in place, or append
fn upsert(entities: &mut Vec<Entity>, entity: Entity) {
    match entities.iter_mut().find(|e| e.id == entity.id) {
        Some(slot) => *slot = entity,
        None => entities.push(entity),
    }
}

/// `root_id` and every entity below it, at any depth
pub(crate) fn collect_subtree(entities: &[Entity], root_id: &str) -> Vec<Entity> {
    let mut children: HashMap<&str, Vec<&Entity>> = HashMap::new();
    for entity in entities {
        if let Some(parent_id) = entity.parent_id.as_deref() {
            children.entry(parent_id).or_default().push(entity);
        }
    }

    let mut subtree = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    if let Some(root) = entities.iter().find(|e| e.id == root_id) {
        queue.push_back(root);
    }

    while let Some(entity) = queue.pop_front() {
        if !seen.insert(entity.id.as_str()) {
            continue;
        }
        subtree.push(entity.clone());
        if let Some(kids) = children.get(entity.id.as_str()) {
            queue.extend(kids.iter().copied());
        }
    }

    subtree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, Repository};
    use crate::remote::memory::RemoteOp;
    use crate::remote::MemoryRemoteStore;
    use crate::services::credentials::StaticCredentials;
    use chrono::Duration as ChronoDuration;

    const TOKEN: &str = "token-1";

    struct Harness {
        service: NotesService,
        repo: Repository,
        server: MemoryRemoteStore,
    }

    async fn harness_with(credentials: StaticCredentials, options: EngineOptions) -> Harness {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let server = MemoryRemoteStore::new(TOKEN);
        let service = NotesService::new(
            Arc::new(repo.clone()),
            Arc::new(server.clone()),
            Arc::new(credentials),
            options,
        );
        Harness {
            service,
            repo,
            server,
        }
    }

    async fn harness() -> Harness {
        harness_with(StaticCredentials::new(TOKEN), EngineOptions::default()).await
    }

    fn go_offline(h: &Harness) {
        h.server.set_online(false);
        h.service.set_online(false);
    }

    #[tokio::test]
    async fn test_create_online_is_synced_and_selected() {
        let h = harness().await;

        let folder = h
            .service
            .create_entity(NewEntity::folder(None).with_title("Recipes"))
            .await
            .unwrap();

        assert!(folder.synced);
        assert!(!folder.has_client_id());
        assert!(h.server.entity(&folder.id).is_some());
        assert_eq!(h.repo.get(&folder.id).await.unwrap().unwrap(), folder);
        assert_eq!(h.service.selected_id().await, Some(folder.id));
    }

    #[tokio::test]
    async fn test_create_offline_uses_client_id() {
        let h = harness().await;
        go_offline(&h);

        let note = h
            .service
            .create_entity(NewEntity::file(None).with_title("Draft"))
            .await
            .unwrap();

        assert!(note.has_client_id());
        assert!(!note.synced);
        assert!(h.server.calls().is_empty());
        assert_eq!(h.repo.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_degrades_when_server_unreachable() {
        let h = harness().await;
        h.server.set_online(false);

        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();

        assert!(!note.synced);
        assert_eq!(h.server.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_create_degrades_on_timeout() {
        let options = EngineOptions {
            page_size: 20,
            request_timeout: Duration::from_millis(50),
        };
        let h = harness_with(StaticCredentials::new(TOKEN), options).await;
        h.server.set_latency(Some(Duration::from_millis(500)));

        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();

        assert!(note.has_client_id());
        assert!(!note.synced);
    }

    #[tokio::test]
    async fn test_rejected_credential_is_refreshed_once() {
        let credentials = StaticCredentials::new("expired").with_refresh(TOKEN);
        let h = harness_with(credentials, EngineOptions::default()).await;

        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();

        assert!(note.synced);
        assert_eq!(h.server.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_unauthorized() {
        let h = harness_with(StaticCredentials::new("expired"), EngineOptions::default()).await;

        let result = h.service.create_entity(NewEntity::file(None)).await;

        assert!(matches!(result, Err(AppError::Unauthorized)));
        assert!(h.service.entities().await.is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_creates_locally() {
        let h = harness_with(StaticCredentials::none(), EngineOptions::default()).await;

        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();

        assert!(!note.synced);
        assert!(h.server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_file_as_parent() {
        let h = harness().await;
        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();

        let result = h.service.create_entity(NewEntity::file(Some(note.id))).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_save_online_sends_full_field_set() {
        let h = harness().await;
        let mut new = NewEntity::file(None).with_title("Groceries");
        new.content = "<p>milk</p>".to_string();
        new.tags = vec!["home".to_string()];
        let note = h.service.create_entity(new).await.unwrap();

        let saved = h
            .service
            .save_entity(&note.id, EntityChanges::title("Groceries v2"))
            .await
            .unwrap();

        assert!(saved.synced);
        let server_copy = h.server.entity(&note.id).unwrap();
        assert_eq!(server_copy.title, "Groceries v2");
        assert_eq!(server_copy.content, "<p>milk</p>");
        assert_eq!(server_copy.tags, vec!["home"]);
    }

    #[tokio::test]
    async fn test_save_offline_marks_pending_and_parses_tags() {
        let h = harness().await;
        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        go_offline(&h);

        let changes = EntityChanges {
            tags: Some(" a, ,b ,".to_string()),
            ..Default::default()
        };
        let saved = h.service.save_entity(&note.id, changes).await.unwrap();

        assert!(!saved.synced);
        assert_eq!(saved.tags, vec!["a", "b"]);
        assert!(saved.updated_at >= note.updated_at);
        assert!(!h.repo.get(&note.id).await.unwrap().unwrap().synced);
    }

    #[tokio::test]
    async fn test_save_unsynced_entity_stays_local_even_online() {
        let h = harness().await;
        go_offline(&h);
        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        h.server.set_online(true);
        h.service.set_online(true);

        let saved = h
            .service
            .save_entity(&note.id, EntityChanges::title("Still local"))
            .await
            .unwrap();

        assert!(!saved.synced);
        assert!(h.server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_stale_entity_is_dropped() {
        let h = harness().await;
        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        h.server.delete(TOKEN, &note.id).await.unwrap();

        let result = h
            .service
            .save_entity(&note.id, EntityChanges::title("Gone"))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(h.service.find(&note.id).await.is_none());
        assert!(h.repo.get(&note.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_folder_drops_its_subtree() {
        let h = harness().await;
        let folder = h.service.create_entity(NewEntity::folder(None)).await.unwrap();
        let inner = h
            .service
            .create_entity(NewEntity::folder(Some(folder.id.clone())))
            .await
            .unwrap();
        let note = h
            .service
            .create_entity(NewEntity::file(Some(inner.id.clone())))
            .await
            .unwrap();
        let other = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        h.server.delete(TOKEN, &folder.id).await.unwrap();

        let result = h.service.get_entity(&folder.id).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        for id in [&folder.id, &inner.id, &note.id] {
            assert!(h.repo.get(id).await.unwrap().is_none());
            assert!(h.service.find(id).await.is_none());
        }
        assert!(h.repo.get(&other.id).await.unwrap().is_some());
        assert_eq!(h.service.selected_id().await.as_deref(), Some(other.id.as_str()));
    }

    #[tokio::test]
    async fn test_move_folder_into_own_subtree_is_rejected() {
        let h = harness().await;
        let top = h.service.create_entity(NewEntity::folder(None)).await.unwrap();
        let child = h
            .service
            .create_entity(NewEntity::folder(Some(top.id.clone())))
            .await
            .unwrap();

        let changes = EntityChanges {
            parent_id: Some(Some(child.id.clone())),
            ..Default::default()
        };
        let result = h.service.save_entity(&top.id, changes).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let to_self = EntityChanges {
            parent_id: Some(Some(top.id.clone())),
            ..Default::default()
        };
        let result = h.service.save_entity(&top.id, to_self).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_entity_unchanged() {
        let h = harness().await;
        go_offline(&h);
        let note = h
            .service
            .create_entity(NewEntity::file(None).with_title("Keep"))
            .await
            .unwrap();
        h.repo.close().await;

        let result = h
            .service
            .save_entity(&note.id, EntityChanges::title("Lost"))
            .await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert_eq!(h.service.find(&note.id).await.unwrap().title, "Keep");
    }

    #[tokio::test]
    async fn test_delete_online_removes_deep_subtree_everywhere() {
        let h = harness().await;
        let top = h.service.create_entity(NewEntity::folder(None)).await.unwrap();
        let mid = h
            .service
            .create_entity(NewEntity::folder(Some(top.id.clone())))
            .await
            .unwrap();
        let deep = h
            .service
            .create_entity(NewEntity::file(Some(mid.id.clone())))
            .await
            .unwrap();

        h.service.delete_entity(&top.id).await.unwrap();

        assert!(h.server.entities().is_empty());
        assert!(h.repo.get_all().await.unwrap().is_empty());
        assert!(h.service.find(&deep.id).await.is_none());
        assert!(h.repo.pending_deletes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_offline_queues_server_ids_only() {
        let h = harness().await;
        let folder = h.service.create_entity(NewEntity::folder(None)).await.unwrap();
        go_offline(&h);
        let draft = h
            .service
            .create_entity(NewEntity::file(Some(folder.id.clone())))
            .await
            .unwrap();

        h.service.delete_entity(&folder.id).await.unwrap();

        let pending = h.repo.pending_deletes().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, folder.id);
        assert!(h.repo.get(&draft.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_online_merges_without_duplicates() {
        let h = harness().await;
        for i in 0..3 {
            h.service
                .create_entity(NewEntity::file(None).with_title(format!("Note {}", i)))
                .await
                .unwrap();
        }

        let first = h.service.list_page(None, 1).await.unwrap();
        let again = h.service.list_page(None, 1).await.unwrap();

        assert_eq!(first.total_count, 3);
        assert_eq!(again.items.len(), 3);
        assert_eq!(h.service.entities().await.len(), 3);
    }

    #[tokio::test]
    async fn test_list_keeps_unpushed_local_edits() {
        let h = harness().await;
        let note = h
            .service
            .create_entity(NewEntity::file(None).with_title("Server title"))
            .await
            .unwrap();
        go_offline(&h);
        h.service
            .save_entity(&note.id, EntityChanges::title("Local title"))
            .await
            .unwrap();
        h.server.set_online(true);
        h.service.set_online(true);

        let page = h.service.list_page(None, 1).await.unwrap();

        assert_eq!(page.items[0].title, "Local title");
        assert!(!page.items[0].synced);
    }

    #[tokio::test]
    async fn test_list_prunes_entities_deleted_elsewhere() {
        let h = harness().await;
        let keep = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        let gone = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        h.server.delete(TOKEN, &gone.id).await.unwrap();

        let page = h.service.list_page(None, 1).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert!(h.service.find(&keep.id).await.is_some());
        assert!(h.service.find(&gone.id).await.is_none());
    }

    #[tokio::test]
    async fn test_list_offline_serves_whole_cache_unpaginated() {
        let options = EngineOptions {
            page_size: 2,
            request_timeout: Duration::from_secs(5),
        };
        let h = harness_with(StaticCredentials::new(TOKEN), options).await;
        for _ in 0..5 {
            h.service.create_entity(NewEntity::file(None)).await.unwrap();
        }
        go_offline(&h);
        h.server.clear_calls();

        let page = h.service.list_page(None, 3).await.unwrap();

        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total_count, 5);
        assert!(h.server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_offline_with_empty_cache_cannot_load() {
        let h = harness().await;
        go_offline(&h);

        let result = h.service.list_page(None, 1).await;

        assert!(matches!(result, Err(AppError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_list_unreachable_server_falls_back_to_cache() {
        let h = harness().await;
        h.service.create_entity(NewEntity::file(None)).await.unwrap();
        h.server.set_online(false);

        let page = h.service.list_page(None, 1).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(
            h.server.calls().last().map(|c| c.op),
            Some(RemoteOp::List)
        );
    }

    #[tokio::test]
    async fn test_get_entity_not_found_drops_it() {
        let h = harness().await;
        let note = h.service.create_entity(NewEntity::file(None)).await.unwrap();
        h.server.delete(TOKEN, &note.id).await.unwrap();

        let result = h.service.get_entity(&note.id).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(h.service.find(&note.id).await.is_none());
    }

    #[tokio::test]
    async fn test_mark_notification_sent_pushes_when_synced() {
        let h = harness().await;
        let mut new = NewEntity::file(None);
        new.reminder_date = Some(Utc::now() - ChronoDuration::minutes(1));
        let note = h.service.create_entity(new).await.unwrap();

        let marked = h.service.mark_notification_sent(&note.id).await.unwrap();

        assert!(marked.notification_sent);
        assert!(marked.synced);
        assert!(h.server.entity(&note.id).unwrap().notification_sent);
    }

    #[test]
    fn test_collect_subtree_walks_every_depth() {
        let now = Utc::now();
        let mut top = Entity::draft(NewEntity::folder(None), now);
        top.id = "top".to_string();
        let mut mid = Entity::draft(NewEntity::folder(Some("top".to_string())), now);
        mid.id = "mid".to_string();
        let mut deep = Entity::draft(NewEntity::file(Some("mid".to_string())), now);
        deep.id = "deep".to_string();
        let mut other = Entity::draft(NewEntity::file(None), now);
        other.id = "other".to_string();

        let subtree = collect_subtree(&[deep, other, mid, top], "top");
        let mut ids: Vec<&str> = subtree.iter().map(|e| e.id.as_str()).collect();
        ids.sort();

        assert_eq!(ids, vec!["deep", "mid", "top"]);
    }
}

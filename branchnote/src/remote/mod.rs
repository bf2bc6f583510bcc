//! Remote store adapter
//!
//! Contract to the authoritative server. Every call takes the bearer
//! credential; a missing or rejected credential yields `Unauthorized`.
//! Callers update their own caches with the returned values.

pub mod http;
pub mod memory;
pub mod wire;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use wire::{from_remote, to_remote, RemoteEntity, RemoteFields, RemotePage};

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Direct children of `parent_id` (root when `None`), newest
    /// `updatedAt` first. `total_count` counts the scoped set.
    async fn list(
        &self,
        token: &str,
        parent_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<RemotePage>;

    async fn get(&self, token: &str, id: &str) -> Result<RemoteEntity>;

    /// The server assigns `id`, `createdAt` and `updatedAt`.
    async fn create(&self, token: &str, fields: &RemoteFields) -> Result<RemoteEntity>;

    /// Full replacement of the mutable fields.
    async fn update(&self, token: &str, id: &str, fields: &RemoteFields) -> Result<RemoteEntity>;

    /// Deleting a folder also deletes its direct children, atomically.
    async fn delete(&self, token: &str, id: &str) -> Result<()>;
}

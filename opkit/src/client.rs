//! Resource client used by operations to read and write resource state.
//!
//! The engine never calls the client itself. Operations hold a client, call
//! it, and map the outcome onto an [`OperationResult`](crate::OperationResult):
//! `NotFound` usually becomes `stop_processing()`, `Conflict` becomes
//! `requeue()` so the next pass re-reads fresh state.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use crate::error::ClientError;
use crate::event::WatchEvent;
use crate::resource::{ObjectKey, Resource};

/// Result type for client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Access to the persisted state of resources of type `R`.
#[async_trait]
pub trait ResourceClient<R: Resource>: Send + Sync {
    /// Fetch the current version of a resource.
    async fn get(&self, key: &ObjectKey) -> ClientResult<R>;

    /// Write a resource's desired state. Fails with `Conflict` if `resource`
    /// was read at an older version than the stored one.
    async fn update(&self, resource: &R) -> ClientResult<R>;

    /// Write a resource's observed state. Same concurrency rules as `update`,
    /// but does not bump the generation.
    async fn update_status(&self, resource: &R) -> ClientResult<R>;
}

/// In-process resource store with optimistic concurrency.
///
/// Every successful write bumps `resource_version`; spec writes also bump
/// `generation`. Subscribers receive a [`WatchEvent`] per write.
pub struct InMemoryClient<R: Resource> {
    objects: RwLock<HashMap<ObjectKey, R>>,
    events: broadcast::Sender<WatchEvent<R>>,
}

impl<R: Resource> InMemoryClient<R> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent<R>> {
        self.events.subscribe()
    }

    /// Store a new resource. Assigns uid, generation 1 and version 1.
    pub async fn create(&self, mut resource: R) -> ClientResult<R> {
        let key = resource.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(key));
        }

        let meta = resource.meta_mut();
        meta.uid = Some(Uuid::new_v4());
        meta.generation = 1;
        meta.resource_version = 1;
        meta.deletion_requested = false;

        objects.insert(key.clone(), resource.clone());
        debug!("Created {}", key);
        let _ = self.events.send(WatchEvent::Created(resource.clone()));
        Ok(resource)
    }

    /// Mark a resource for deletion. It stays in the store until
    /// [`InMemoryClient::delete`] is called, so a controller can finalize it.
    /// Bumps the generation so generation-filtered watches see the request.
    pub async fn request_deletion(&self, key: &ObjectKey) -> ClientResult<R> {
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(key)
            .ok_or_else(|| ClientError::NotFound(key.clone()))?;
        if stored.meta().deletion_requested {
            return Ok(stored.clone());
        }

        let old = stored.clone();
        let meta = stored.meta_mut();
        meta.deletion_requested = true;
        meta.generation += 1;
        meta.resource_version += 1;
        let new = stored.clone();
        debug!("Deletion requested for {}", key);
        let _ = self.events.send(WatchEvent::Updated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    /// Remove a resource from the store.
    pub async fn delete(&self, key: &ObjectKey) -> ClientResult<()> {
        let removed = self
            .objects
            .write()
            .await
            .remove(key)
            .ok_or_else(|| ClientError::NotFound(key.clone()))?;
        debug!("Deleted {}", key);
        let _ = self.events.send(WatchEvent::Deleted(removed));
        Ok(())
    }

    /// All stored resources, ordered by key.
    pub async fn list(&self) -> Vec<R> {
        let objects = self.objects.read().await;
        let mut items: Vec<R> = objects.values().cloned().collect();
        items.sort_by_key(|r| r.key());
        items
    }

    async fn write(&self, resource: &R, bump_generation: bool) -> ClientResult<R> {
        let key = resource.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| ClientError::NotFound(key.clone()))?;

        let expected = resource.meta().resource_version;
        let actual = stored.meta().resource_version;
        if expected != actual {
            return Err(ClientError::Conflict {
                key,
                expected,
                actual,
            });
        }

        let old = stored.clone();
        let mut new = resource.clone();
        {
            let meta = new.meta_mut();
            let stored_meta = old.meta();
            meta.uid = stored_meta.uid;
            meta.deletion_requested = stored_meta.deletion_requested;
            meta.resource_version = actual + 1;
            meta.generation = if bump_generation {
                stored_meta.generation + 1
            } else {
                stored_meta.generation
            };
        }
        *stored = new.clone();

        debug!(
            "Updated {} (version {}, generation {})",
            key,
            new.meta().resource_version,
            new.meta().generation
        );
        let _ = self.events.send(WatchEvent::Updated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }
}

impl<R: Resource> Default for InMemoryClient<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> ResourceClient<R> for InMemoryClient<R> {
    async fn get(&self, key: &ObjectKey) -> ClientResult<R> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(key.clone()))
    }

    async fn update(&self, resource: &R) -> ClientResult<R> {
        self.write(resource, true).await
    }

    async fn update_status(&self, resource: &R) -> ClientResult<R> {
        self.write(resource, false).await
    }
}

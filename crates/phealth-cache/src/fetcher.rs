//! The collaborator-supplied query function.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use phealth_error::{HealthError, Result};
use phealth_types::{EntityKey, PartitionHealthPayload};

/// Fetches the full partition health payload for one entity.
///
/// Implementations own transport and authentication. Failures should be
/// reported as [`HealthError::FetchFailure`]; the cache never retries on its
/// own.
#[async_trait]
pub trait PartitionHealthFetcher: Send + Sync {
    async fn fetch(&self, entity_key: &EntityKey) -> Result<PartitionHealthPayload>;
}

#[async_trait]
impl<T: PartitionHealthFetcher + ?Sized> PartitionHealthFetcher for Arc<T> {
    async fn fetch(&self, entity_key: &EntityKey) -> Result<PartitionHealthPayload> {
        (**self).fetch(entity_key).await
    }
}

/// Fetcher serving payloads from memory.
///
/// Unknown entities fail with [`HealthError::FetchFailure`].
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    payloads: Mutex<HashMap<EntityKey, PartitionHealthPayload>>,
    calls: AtomicU64,
}

impl InMemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the payload served for `entity_key`.
    pub fn set(&self, entity_key: EntityKey, payload: PartitionHealthPayload) {
        self.payloads.lock().insert(entity_key, payload);
    }

    pub fn remove(&self, entity_key: &EntityKey) -> Option<PartitionHealthPayload> {
        self.payloads.lock().remove(entity_key)
    }

    /// Number of fetches served or rejected so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PartitionHealthFetcher for InMemoryFetcher {
    async fn fetch(&self, entity_key: &EntityKey) -> Result<PartitionHealthPayload> {
        let _ = self.calls.fetch_add(1, Ordering::Relaxed);
        self.payloads
            .lock()
            .get(entity_key)
            .cloned()
            .ok_or_else(|| HealthError::fetch_failure(entity_key.to_string(), "no such entity"))
    }
}

//! In-memory Metadata Store
//!
//! Process-local [`MetadataStore`] seeded from configuration. Descriptors are
//! kept in a `BTreeMap` so listings come back in a stable order.

use crate::domain::ports::MetadataStore;
use crate::domain::storage::StorageSystemDescriptor;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    storages: RwLock<BTreeMap<String, StorageSystemDescriptor>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `storages`; later entries win on id clashes
    pub fn with_storages(storages: impl IntoIterator<Item = StorageSystemDescriptor>) -> Self {
        let storages = storages
            .into_iter()
            .map(|s| (s.storage_id.clone(), s))
            .collect();
        Self {
            storages: RwLock::new(storages),
        }
    }

    pub fn len(&self) -> usize {
        self.storages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.read().is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn lookup_storage_system(&self, storage_id: &str) -> Result<Option<StorageSystemDescriptor>> {
        Ok(self.storages.read().get(storage_id).cloned())
    }

    async fn save_storage_system(&self, descriptor: StorageSystemDescriptor) -> Result<()> {
        debug!("Saving storage system {}", descriptor.storage_id);
        self.storages
            .write()
            .insert(descriptor.storage_id.clone(), descriptor);
        Ok(())
    }

    async fn remove_storage_system(&self, storage_id: &str) -> Result<Option<StorageSystemDescriptor>> {
        Ok(self.storages.write().remove(storage_id))
    }

    async fn list_storage_systems(&self) -> Result<Vec<StorageSystemDescriptor>> {
        Ok(self.storages.read().values().cloned().collect())
    }
}

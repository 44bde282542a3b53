//! Storage Manager
//!
//! Coordinates storage system lifecycle operations on top of the driver
//! registry:
//! - Registration through a provisional vendor session
//! - Credential rotation with replace-whole-record semantics
//! - Removal
//! - All-or-nothing inventory collection

use crate::domain::context::RequestContext;
use crate::domain::ports::MetadataStoreRef;
use crate::domain::storage::{
    AccessInfo, InventorySnapshot, PoolSnapshot, RegisterInfo, StorageSystemDescriptor,
    StorageSystemSnapshot, VolumeSnapshot,
};
use crate::error::{Error, Result};
use crate::registry::DriverRegistry;
use chrono::Utc;
use tracing::{info, warn};

pub struct StorageManager {
    registry: DriverRegistry,
}

impl StorageManager {
    pub fn new(registry: DriverRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    fn metadata(&self) -> &MetadataStoreRef {
        self.registry.metadata()
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    pub async fn list_storages(&self) -> Result<Vec<StorageSystemDescriptor>> {
        self.metadata().list_storage_systems().await
    }

    /// Stored descriptor for `storage_id`
    pub async fn describe_storage(&self, storage_id: &str) -> Result<StorageSystemDescriptor> {
        self.metadata()
            .lookup_storage_system(storage_id)
            .await?
            .ok_or_else(|| Error::UnknownStorageSystem {
                storage_id: storage_id.to_string(),
            })
    }

    /// Register a new storage system
    ///
    /// A provisional session, keyed by a freshly generated id, verifies the
    /// system is reachable and reports its identity. The session is closed
    /// before the descriptor is persisted.
    pub async fn register_storage(
        &self,
        ctx: &RequestContext,
        info: RegisterInfo,
    ) -> Result<StorageSystemDescriptor> {
        if info.vendor.trim().is_empty() || info.model.trim().is_empty() {
            return Err(Error::ApiValidation("vendor and model are required".into()));
        }
        if info.access_info.host.trim().is_empty() {
            return Err(Error::ApiValidation("host is required".into()));
        }

        let storage_id = uuid::Uuid::new_v4().to_string();
        let provisional = StorageSystemDescriptor {
            storage_id: storage_id.clone(),
            name: info.name.clone().unwrap_or_default(),
            vendor: info.vendor.clone(),
            model: info.model.clone(),
            serial_number: String::new(),
            description: info.description.clone().unwrap_or_default(),
            location: String::new(),
            access_info: info.access_info.clone(),
        };

        let instance = self.registry.open_session(provisional).await?;
        let reported = instance.register_storage(ctx, &info).await;
        instance.close().await;

        let descriptor = StorageSystemDescriptor {
            storage_id,
            access_info: info.access_info,
            ..reported?
        };

        if !descriptor.serial_number.is_empty() {
            let existing = self.metadata().list_storage_systems().await?;
            if existing
                .iter()
                .any(|s| s.serial_number == descriptor.serial_number)
            {
                return Err(Error::StorageAlreadyRegistered {
                    serial_number: descriptor.serial_number,
                });
            }
        }

        self.metadata().save_storage_system(descriptor.clone()).await?;
        info!(
            "Registered storage system {} ({} {}, serial {})",
            descriptor.storage_id, descriptor.vendor, descriptor.model, descriptor.serial_number
        );
        Ok(descriptor)
    }

    /// Replace the connection parameters of a registered system
    ///
    /// The new parameters must reach the same physical system: when both
    /// serial numbers are known they have to match.
    pub async fn update_access_info(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
        access_info: AccessInfo,
    ) -> Result<StorageSystemDescriptor> {
        let existing = self.describe_storage(storage_id).await?;
        let candidate = existing.with_access_info(access_info);

        let instance = self.registry.open_session(candidate.clone()).await?;
        let snapshot = instance.get_storage(ctx).await;
        instance.close().await;
        let snapshot = snapshot?;

        if !existing.serial_number.is_empty()
            && !snapshot.serial_number.is_empty()
            && existing.serial_number != snapshot.serial_number
        {
            warn!(
                "Access info for {} reaches serial {}, expected {}",
                storage_id, snapshot.serial_number, existing.serial_number
            );
            return Err(Error::InvalidCredentials {
                storage: storage_id.to_string(),
                reason: format!(
                    "access info reaches a different storage system (serial {})",
                    snapshot.serial_number
                ),
            });
        }

        self.metadata().save_storage_system(candidate.clone()).await?;
        self.registry.invalidate(storage_id).await;
        info!("Updated access info for storage system {}", storage_id);
        Ok(candidate)
    }

    /// Forget a storage system and drop its session
    pub async fn remove_storage(&self, storage_id: &str) -> Result<StorageSystemDescriptor> {
        let removed = self
            .metadata()
            .remove_storage_system(storage_id)
            .await?
            .ok_or_else(|| Error::UnknownStorageSystem {
                storage_id: storage_id.to_string(),
            })?;
        self.registry.invalidate(storage_id).await;

        info!("Removed storage system {}", storage_id);
        Ok(removed)
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    pub async fn get_storage(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
    ) -> Result<StorageSystemSnapshot> {
        self.registry.get_storage(ctx, storage_id).await
    }

    pub async fn list_pools(&self, ctx: &RequestContext, storage_id: &str) -> Result<Vec<PoolSnapshot>> {
        self.registry.list_pools(ctx, storage_id).await
    }

    pub async fn list_volumes(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
    ) -> Result<Vec<VolumeSnapshot>> {
        self.registry.list_volumes(ctx, storage_id).await
    }

    /// Collect storage, pools and volumes; any failure fails the whole sync
    pub async fn sync_storage(&self, ctx: &RequestContext, storage_id: &str) -> Result<InventorySnapshot> {
        let storage = self.registry.get_storage(ctx, storage_id).await?;
        let pools = self.registry.list_pools(ctx, storage_id).await?;
        let volumes = self.registry.list_volumes(ctx, storage_id).await?;

        info!(
            "Synced storage system {}: {} pool(s), {} volume(s)",
            storage_id,
            pools.len(),
            volumes.len()
        );
        Ok(InventorySnapshot {
            storage_id: storage_id.to_string(),
            storage,
            pools,
            volumes,
            collected_at: Utc::now(),
        })
    }

    /// Clear an alert on the vendor side
    pub async fn clear_alert(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
        sequence_number: &str,
    ) -> Result<()> {
        self.registry
            .clear_alert(ctx, storage_id, sequence_number)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::drivers::{
        DriverCatalog, FakeDriverFactory, FakeSessionCounters, FAKE_MODEL, FAKE_VENDOR,
    };
    use crate::metadata::InMemoryMetadataStore;
    use crate::metrics::HubMetrics;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn manager() -> (StorageManager, Arc<FakeSessionCounters>) {
        let factory = Arc::new(FakeDriverFactory::new());
        let counters = factory.counters();
        let mut catalog = DriverCatalog::new();
        catalog.register(FAKE_VENDOR, FAKE_MODEL, factory).unwrap();

        let registry = DriverRegistry::new(
            RegistryConfig::default(),
            catalog,
            Arc::new(InMemoryMetadataStore::new()),
            HubMetrics::new(),
        );
        (StorageManager::new(registry), counters)
    }

    fn register_info(array_id: &str) -> RegisterInfo {
        RegisterInfo {
            vendor: FAKE_VENDOR.into(),
            model: FAKE_MODEL.into(),
            name: Some("array1".into()),
            description: None,
            access_info: AccessInfo::new("10.0.0.1", "user", "pass").with_extra("array_id", array_id),
        }
    }

    #[tokio::test]
    async fn test_register_storage() {
        let (manager, counters) = manager();
        let ctx = RequestContext::new();

        let descriptor = manager.register_storage(&ctx, register_info("00112233")).await.unwrap();
        assert_eq!(descriptor.serial_number, "00112233");
        assert_eq!(descriptor.name, "array1");
        assert_eq!(descriptor.access_info.password, "pass");
        assert!(uuid::Uuid::parse_str(&descriptor.storage_id).is_ok());

        // Provisional session is not kept around
        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.closed(), 1);
        assert_eq!(manager.registry().live_sessions(), 0);

        let stored = manager.describe_storage(&descriptor.storage_id).await.unwrap();
        assert_eq!(stored, descriptor);
    }

    #[tokio::test]
    async fn test_register_duplicate_serial() {
        let (manager, _) = manager();
        let ctx = RequestContext::new();

        manager.register_storage(&ctx, register_info("00112233")).await.unwrap();
        let result = manager.register_storage(&ctx, register_info("00112233")).await;
        assert_matches!(result, Err(Error::StorageAlreadyRegistered { ref serial_number }) if serial_number == "00112233");
        assert_eq!(manager.list_storages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_failures_persist_nothing() {
        let (manager, _) = manager();
        let ctx = RequestContext::new();

        let mut unsupported = register_info("1");
        unsupported.vendor = "acme".into();
        assert_matches!(
            manager.register_storage(&ctx, unsupported).await,
            Err(Error::UnsupportedVendor { .. })
        );

        let mut bad_login = register_info("2");
        bad_login.access_info.password.clear();
        assert_matches!(
            manager.register_storage(&ctx, bad_login).await,
            Err(Error::InvalidCredentials { .. })
        );

        let mut no_model = register_info("3");
        no_model.model = " ".into();
        assert_matches!(
            manager.register_storage(&ctx, no_model).await,
            Err(Error::ApiValidation(_))
        );

        assert!(manager.list_storages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_access_info_rebuilds_session() {
        let (manager, counters) = manager();
        let ctx = RequestContext::new();
        let descriptor = manager.register_storage(&ctx, register_info("00112233")).await.unwrap();
        let id = descriptor.storage_id.clone();

        let before = manager.registry().get(&id).await.unwrap();
        let rotated = AccessInfo::new("10.0.0.2", "user", "rotated").with_extra("array_id", "00112233");
        let updated = manager.update_access_info(&ctx, &id, rotated).await.unwrap();
        assert_eq!(updated.access_info.host, "10.0.0.2");
        assert!(!before.is_open());

        let after = manager.registry().get(&id).await.unwrap();
        assert_eq!(after.descriptor().access_info.password, "rotated");
        // register + cached + verification + rebuilt
        assert_eq!(counters.opened(), 4);
    }

    #[tokio::test]
    async fn test_update_access_info_rejects_other_system() {
        let (manager, _) = manager();
        let ctx = RequestContext::new();
        let descriptor = manager.register_storage(&ctx, register_info("00112233")).await.unwrap();

        let elsewhere = AccessInfo::new("10.0.0.3", "user", "pass").with_extra("array_id", "99999999");
        let result = manager
            .update_access_info(&ctx, &descriptor.storage_id, elsewhere)
            .await;
        assert_matches!(result, Err(Error::InvalidCredentials { .. }));

        let stored = manager.describe_storage(&descriptor.storage_id).await.unwrap();
        assert_eq!(stored.access_info.host, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_remove_storage() {
        let (manager, counters) = manager();
        let ctx = RequestContext::new();
        let descriptor = manager.register_storage(&ctx, register_info("00112233")).await.unwrap();
        let id = descriptor.storage_id;

        manager.get_storage(&ctx, &id).await.unwrap();
        manager.remove_storage(&id).await.unwrap();

        assert_eq!(counters.opened(), counters.closed());
        assert_matches!(
            manager.get_storage(&ctx, &id).await,
            Err(Error::UnknownStorageSystem { .. })
        );
        assert_matches!(
            manager.remove_storage(&id).await,
            Err(Error::UnknownStorageSystem { .. })
        );
    }

    #[tokio::test]
    async fn test_sync_storage() {
        let (manager, _) = manager();
        let ctx = RequestContext::new();
        let descriptor = manager.register_storage(&ctx, register_info("00112233")).await.unwrap();

        let inventory = manager.sync_storage(&ctx, &descriptor.storage_id).await.unwrap();
        assert_eq!(inventory.storage.serial_number, "00112233");
        assert_eq!(inventory.pools.len(), 3);
        assert_eq!(inventory.volumes.len(), 5);
        assert!(inventory
            .volumes
            .iter()
            .all(|v| v.storage_id == descriptor.storage_id));
    }

    #[tokio::test]
    async fn test_sync_storage_is_all_or_nothing() {
        let (manager, _) = manager();
        let ctx = RequestContext::new();
        let mut info = register_info("00112233");
        info.access_info = info.access_info.with_extra("fail_pool_at", "1");
        let descriptor = manager.register_storage(&ctx, info).await.unwrap();

        assert_matches!(
            manager.sync_storage(&ctx, &descriptor.storage_id).await,
            Err(Error::PartialCollectionFailure { collected: 1, .. })
        );
    }

    #[tokio::test]
    async fn test_clear_alert() {
        let (manager, _) = manager();
        let ctx = RequestContext::new();
        let descriptor = manager.register_storage(&ctx, register_info("00112233")).await.unwrap();

        manager
            .clear_alert(&ctx, &descriptor.storage_id, "42")
            .await
            .unwrap();
        assert_matches!(
            manager.clear_alert(&ctx, "missing", "42").await,
            Err(Error::UnknownStorageSystem { .. })
        );
    }
}

//! Domain Ports - Core trait definitions for the array manager
//!
//! These traits define the boundaries between the core and everything it does
//! not own: vendor integrations, the metadata store and alert consumers.
//! Adapters implement these traits to provide concrete functionality.

use crate::domain::alert::{CanonicalAlertModel, ParsedAlert, RawAlert};
use crate::domain::context::RequestContext;
use crate::domain::storage::{
    PoolSnapshot, RegisterInfo, StorageSystemDescriptor, StorageSystemSnapshot, VolumeSnapshot,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// Driver Contract
// =============================================================================

/// Contract every vendor integration implements
///
/// Implementations must translate their native failures into
/// [`crate::Error`] before returning, and must tolerate concurrent calls on a
/// single instance.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Verify the system is reachable and report its identifying attributes
    ///
    /// Fails with `BackendUnreachable` or `InvalidCredentials`.
    async fn register_storage(
        &self,
        ctx: &RequestContext,
        info: &RegisterInfo,
    ) -> Result<StorageSystemDescriptor>;

    /// Capacity, model and status of the system
    async fn get_storage(&self, ctx: &RequestContext) -> Result<StorageSystemSnapshot>;

    /// Every pool on the system; any single failure aborts the whole listing
    async fn list_pools(&self, ctx: &RequestContext) -> Result<Vec<PoolSnapshot>>;

    /// Every volume on the system; any single failure aborts the whole listing
    async fn list_volumes(&self, ctx: &RequestContext) -> Result<Vec<VolumeSnapshot>>;

    /// Map an enriched raw alert onto canonical fields
    async fn parse_alert(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
        alert: &RawAlert,
    ) -> Result<ParsedAlert>;

    /// Acknowledge / clear an alert on the vendor side
    async fn clear_alert(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
        sequence_number: &str,
    ) -> Result<()>;

    /// Release the vendor session. Called exactly once when the owning
    /// instance is disposed.
    async fn close(&self) {}
}

/// Opens vendor sessions for one `(vendor, model)` family
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Human readable driver name, used in logs
    fn driver_name(&self) -> &str;

    /// Open a session to the system described by `descriptor`
    async fn connect(&self, descriptor: &StorageSystemDescriptor) -> Result<StorageDriverRef>;
}

// =============================================================================
// Metadata Collaborator
// =============================================================================

/// Where storage system descriptors live
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up one descriptor; `Ok(None)` when it does not exist
    async fn lookup_storage_system(&self, storage_id: &str) -> Result<Option<StorageSystemDescriptor>>;

    /// Insert or replace a descriptor (whole-record semantics)
    async fn save_storage_system(&self, descriptor: StorageSystemDescriptor) -> Result<()>;

    /// Delete a descriptor, returning it if it existed
    async fn remove_storage_system(&self, storage_id: &str) -> Result<Option<StorageSystemDescriptor>>;

    /// All known descriptors
    async fn list_storage_systems(&self) -> Result<Vec<StorageSystemDescriptor>>;
}

// =============================================================================
// Alert Exporter Port
// =============================================================================

/// Downstream consumer of finished alerts
#[async_trait]
pub trait AlertExporter: Send + Sync {
    /// Exporter name, used in logs and errors
    fn name(&self) -> &str;

    /// Deliver one alert
    async fn export(&self, alert: &CanonicalAlertModel) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type StorageDriverRef = Arc<dyn StorageDriver>;
pub type DriverFactoryRef = Arc<dyn DriverFactory>;
pub type MetadataStoreRef = Arc<dyn MetadataStore>;
pub type AlertExporterRef = Arc<dyn AlertExporter>;

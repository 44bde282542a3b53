//! Storage System Types
//!
//! Descriptors identify a managed array and carry the connection parameters a
//! driver needs; snapshots are what drivers report back about it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Connection Parameters
// =============================================================================

/// Connection parameters for one storage system
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    /// Management host (name or IP address)
    pub host: String,
    /// Management port
    #[serde(default)]
    pub port: Option<u16>,
    /// Login user
    pub username: String,
    /// Login password
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Protocol-specific extras (e.g. `array_id`)
    #[serde(default)]
    pub extra_attributes: BTreeMap<String, String>,
}

impl AccessInfo {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            extra_attributes: BTreeMap::new(),
        }
    }

    /// Add a protocol-specific attribute
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a protocol-specific attribute
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra_attributes.get(key).map(String::as_str)
    }

    /// `host:port`, or just the host when no port is set
    pub fn endpoint(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Debug for AccessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("extra_attributes", &self.extra_attributes)
            .finish()
    }
}

// =============================================================================
// Storage System Descriptor
// =============================================================================

/// Identifies one managed storage system
///
/// Immutable once created; credential rotation replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSystemDescriptor {
    /// Unique, immutable identifier
    pub storage_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Vendor, as known to the driver catalog
    pub vendor: String,
    /// Model, as known to the driver catalog
    pub model: String,
    /// Vendor serial number
    #[serde(default)]
    pub serial_number: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Physical location
    #[serde(default)]
    pub location: String,
    /// How to reach the system
    pub access_info: AccessInfo,
}

impl StorageSystemDescriptor {
    /// Copy of this descriptor with different connection parameters
    pub fn with_access_info(&self, access_info: AccessInfo) -> Self {
        Self {
            access_info,
            ..self.clone()
        }
    }
}

/// Parameters supplied when a new storage system is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInfo {
    pub vendor: String,
    pub model: String,
    /// Optional display name; drivers fall back to a vendor-reported name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub access_info: AccessInfo,
}

// =============================================================================
// Status Types
// =============================================================================

/// Overall storage system health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStatus {
    Normal,
    Abnormal,
    Offline,
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageStatus::Normal => write!(f, "normal"),
            StorageStatus::Abnormal => write!(f, "abnormal"),
            StorageStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Pool health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Normal,
    Abnormal,
    Offline,
}

/// Kind of storage a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Block,
    File,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Block => write!(f, "block"),
            StorageType::File => write!(f, "file"),
        }
    }
}

/// Volume health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Available,
    Error,
}

/// Volume provisioning type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Thin,
    Thick,
}

// =============================================================================
// Snapshots
// =============================================================================

/// Point-in-time view of a storage system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSystemSnapshot {
    pub name: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub description: String,
    pub location: String,
    pub status: StorageStatus,
    /// Total capacity in bytes
    pub total_capacity: u64,
    /// Used capacity in bytes
    pub used_capacity: u64,
    /// Free capacity in bytes
    pub free_capacity: u64,
}

/// Point-in-time view of a storage pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub name: String,
    pub storage_id: String,
    pub native_storage_pool_id: String,
    pub description: String,
    pub status: PoolStatus,
    pub storage_type: StorageType,
    pub total_capacity: u64,
    pub used_capacity: u64,
    pub free_capacity: u64,
}

/// Point-in-time view of a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub name: String,
    pub storage_id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    pub status: VolumeStatus,
    pub native_volume_id: String,
    pub native_storage_pool_id: String,
    pub wwn: String,
    pub total_capacity: u64,
    pub used_capacity: u64,
    pub free_capacity: u64,
    pub compressed: bool,
    pub deduplicated: bool,
}

/// Complete inventory of one storage system, collected all-or-nothing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub storage_id: String,
    pub storage: StorageSystemSnapshot,
    pub pools: Vec<PoolSnapshot>,
    pub volumes: Vec<VolumeSnapshot>,
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

//! Unified Array Manager - Multi-Vendor Storage Driver Hub
//!
//! Manages heterogeneous storage arrays through one driver contract, keeps a
//! single live vendor session per registered array, and normalizes vendor
//! alerts into one canonical alert model.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              REST API (axum)                                 │
//! │   /v1/alerts                          /v1/storages/...                       │
//! ├───────────────┬─────────────────────────────────┬───────────────────────────┤
//! │               │                                 │                           │
//! │  ┌────────────┴────────┐            ┌───────────┴─────────────┐             │
//! │  │  Alert Normalizer   │            │    Storage Manager      │             │
//! │  │  (validate, enrich) │            │  (register, rotate,     │             │
//! │  └──────┬───────┬──────┘            │   remove, sync)         │             │
//! │         │       │                   └───────────┬─────────────┘             │
//! │         │  ┌────┴─────────┐                     │                           │
//! │         │  │  Exporters   │                     │                           │
//! │         │  └──────────────┘                     │                           │
//! │         │                                       │                           │
//! │  ┌──────┴───────────────────────────────────────┴─────────────┐             │
//! │  │                     Driver Registry                        │             │
//! │  │    (one cached session per storage, single-flight build)   │             │
//! │  └──────┬──────────────────────────────────────┬──────────────┘             │
//! │         │                                      │                           │
//! │  ┌──────┴──────────┐                 ┌─────────┴──────────┐                │
//! │  │ Driver Catalog  │                 │  Metadata Store    │                │
//! │  │ (vendor,model)  │                 │  (descriptors)     │                │
//! │  └──────┬──────────┘                 └────────────────────┘                │
//! ├─────────┴───────────────────────────────────────────────────────────────────┤
//! │                     Vendor Drivers (StorageDriver)                           │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`alert`]: Alert normalization and exporters
//! - [`config`]: File configuration
//! - [`controlplane`]: Storage manager and REST API
//! - [`domain`]: Core domain types and traits
//! - [`drivers`]: Driver catalog, driver instances and built-in drivers
//! - [`error`]: Error types and handling
//! - [`metadata`]: Descriptor storage
//! - [`metrics`]: Prometheus metrics
//! - [`registry`]: Driver registry and lifecycle events

pub mod alert;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod registry;

// Re-export commonly used types
pub use alert::{AlertNormalizer, ChannelExporter, ExporterFanout, LoggingExporter};

pub use config::{HubConfig, RegistryConfig};

pub use controlplane::{ApiServer, ApiServerConfig, RestRouter, StorageManager};

pub use domain::{
    AccessInfo, AlertSeverity, CanonicalAlertModel, InventorySnapshot, ParsedAlert,
    PoolSnapshot, RawAlert, RegisterInfo, RequestContext, StorageSystemDescriptor,
    StorageSystemSnapshot, VolumeSnapshot,
    AlertExporter, AlertExporterRef, DriverFactory, DriverFactoryRef, MetadataStore,
    MetadataStoreRef, StorageDriver, StorageDriverRef,
};

pub use drivers::{DriverCatalog, DriverInstance, DriverKey};

pub use error::{Error, ErrorAction, ErrorKind, Result};

pub use metadata::InMemoryMetadataStore;

pub use metrics::HubMetrics;

pub use registry::{DriverRegistry, RegistryEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

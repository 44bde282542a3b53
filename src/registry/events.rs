//! Registry Events
//!
//! Events emitted by the driver registry so observers can follow the
//! lifecycle of vendor sessions.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Events emitted by the driver registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A vendor session was opened and cached
    DriverConnected {
        storage_id: String,
        driver: String,
        generation: u64,
    },

    /// Opening a vendor session failed
    DriverConnectFailed {
        storage_id: String,
        kind: String,
        reason: String,
    },

    /// A cached session was disposed
    DriverInvalidated { storage_id: String },
}

impl RegistryEvent {
    pub(crate) fn connect_failed(storage_id: &str, kind: ErrorKind, reason: String) -> Self {
        RegistryEvent::DriverConnectFailed {
            storage_id: storage_id.to_string(),
            kind: kind.as_str().to_string(),
            reason,
        }
    }

    /// Get the storage system this event concerns
    pub fn storage_id(&self) -> &str {
        match self {
            RegistryEvent::DriverConnected { storage_id, .. } => storage_id,
            RegistryEvent::DriverConnectFailed { storage_id, .. } => storage_id,
            RegistryEvent::DriverInvalidated { storage_id } => storage_id,
        }
    }

    /// Check if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, RegistryEvent::DriverConnectFailed { .. })
    }
}

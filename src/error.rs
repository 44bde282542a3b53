//! Error types for the Unified Array Manager
//!
//! Every driver, registry and normalizer failure is expressed through this one
//! taxonomy. Vendor-specific failures are translated by the drivers before they
//! cross the driver contract, so callers only ever match on [`Error`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the array manager
///
/// `Clone` so that one failed session build can be handed to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // =========================================================================
    // Storage System Resolution Errors
    // =========================================================================
    #[error("Unknown storage system: {storage_id}")]
    UnknownStorageSystem { storage_id: String },

    #[error("No driver registered for vendor '{vendor}' model '{model}'")]
    UnsupportedVendor { vendor: String, model: String },

    #[error("Storage system already registered with serial number {serial_number}")]
    StorageAlreadyRegistered { serial_number: String },

    // =========================================================================
    // Vendor Backend Errors
    // =========================================================================
    #[error("Storage backend {storage} unreachable: {reason}")]
    BackendUnreachable { storage: String, reason: String },

    #[error("Invalid credentials for storage backend {storage}: {reason}")]
    InvalidCredentials { storage: String, reason: String },

    #[error("Incomplete data from storage backend {storage}: {reason}")]
    IncompleteVendorData { storage: String, reason: String },

    #[error("Failed to collect {resource} from {storage} after {collected} item(s): {reason}")]
    PartialCollectionFailure {
        storage: String,
        resource: String,
        collected: usize,
        reason: String,
    },

    // =========================================================================
    // Alert Errors
    // =========================================================================
    #[error("Alert does not reference a storage system (missing 'storage_id')")]
    MissingStorageReference,

    #[error("Invalid results: {0}")]
    InvalidResults(String),

    #[error("Alert export failed via {exporter}: {reason}")]
    ExportFailed { exporter: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API request validation failed: {0}")]
    ApiValidation(String),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(Arc<serde_json::Error>),

    #[error("YAML parse error: {0}")]
    YamlParse(Arc<serde_yaml::Error>),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParse(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

/// Stable classification of an [`Error`], used for metrics labels and API
/// error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownStorageSystem,
    UnsupportedVendor,
    StorageAlreadyRegistered,
    BackendUnreachable,
    InvalidCredentials,
    IncompleteVendorData,
    PartialCollectionFailure,
    MissingStorageReference,
    InvalidResults,
    ExportFailed,
    Internal,
    Configuration,
    ApiValidation,
    Parse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownStorageSystem => "unknown_storage_system",
            ErrorKind::UnsupportedVendor => "unsupported_vendor",
            ErrorKind::StorageAlreadyRegistered => "storage_already_registered",
            ErrorKind::BackendUnreachable => "backend_unreachable",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::IncompleteVendorData => "incomplete_vendor_data",
            ErrorKind::PartialCollectionFailure => "partial_collection_failure",
            ErrorKind::MissingStorageReference => "missing_storage_reference",
            ErrorKind::InvalidResults => "invalid_results",
            ErrorKind::ExportFailed => "export_failed",
            ErrorKind::Internal => "internal",
            ErrorKind::Configuration => "configuration",
            ErrorKind::ApiValidation => "api_validation",
            ErrorKind::Parse => "parse",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an external scheduler should do with a failed operation.
///
/// The core never retries on its own; this is advice for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Don't retry, the input or the setup has to change first
    NoRetry,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownStorageSystem { .. } => ErrorKind::UnknownStorageSystem,
            Error::UnsupportedVendor { .. } => ErrorKind::UnsupportedVendor,
            Error::StorageAlreadyRegistered { .. } => ErrorKind::StorageAlreadyRegistered,
            Error::BackendUnreachable { .. } => ErrorKind::BackendUnreachable,
            Error::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Error::IncompleteVendorData { .. } => ErrorKind::IncompleteVendorData,
            Error::PartialCollectionFailure { .. } => ErrorKind::PartialCollectionFailure,
            Error::MissingStorageReference => ErrorKind::MissingStorageReference,
            Error::InvalidResults(_) => ErrorKind::InvalidResults,
            Error::ExportFailed { .. } => ErrorKind::ExportFailed,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::ApiValidation(_) => ErrorKind::ApiValidation,
            Error::JsonParse(_) | Error::YamlParse(_) | Error::Io(_) => ErrorKind::Parse,
        }
    }

    /// Determine what a caller should do about this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient vendor-side trouble
            Error::BackendUnreachable { .. }
            | Error::ExportFailed { .. }
            | Error::Internal(_) => ErrorAction::RetryWithBackoff,

            // A listing died halfway, give the array some room
            Error::PartialCollectionFailure { .. } | Error::IncompleteVendorData { .. } => {
                ErrorAction::RetryAfter(Duration::from_secs(60))
            }

            // Credentials may be rotated out-of-band
            Error::InvalidCredentials { .. } => {
                ErrorAction::RetryAfter(Duration::from_secs(300))
            }

            Error::UnknownStorageSystem { .. }
            | Error::UnsupportedVendor { .. }
            | Error::StorageAlreadyRegistered { .. }
            | Error::MissingStorageReference
            | Error::InvalidResults(_)
            | Error::Configuration(_)
            | Error::ApiValidation(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::Io(_) => ErrorAction::NoRetry,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRetry)
    }

    /// Whether the driver session that produced this error should be torn down
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            Error::BackendUnreachable { .. } | Error::InvalidCredentials { .. }
        )
    }

    pub(crate) fn unreachable(storage: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::BackendUnreachable {
            storage: storage.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the array manager
pub type Result<T> = std::result::Result<T, Error>;

//! Storage Drivers
//!
//! Provides the driver catalog that maps `(vendor, model)` to a factory, the
//! [`DriverInstance`] wrapper around one live vendor session, and the
//! built-in drivers:
//! - Fake: deterministic reference driver

pub mod fake;
pub mod instance;

pub use fake::*;
pub use instance::*;

use crate::domain::ports::DriverFactoryRef;
use crate::domain::storage::StorageSystemDescriptor;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Model wildcard: serves every model of a vendor
pub const ANY_MODEL: &str = "*";

// =============================================================================
// Driver Key
// =============================================================================

/// Case-insensitive `(vendor, model)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverKey {
    vendor: String,
    model: String,
}

impl DriverKey {
    pub fn new(vendor: &str, model: &str) -> Self {
        Self {
            vendor: vendor.trim().to_lowercase(),
            model: model.trim().to_lowercase(),
        }
    }

    pub fn for_descriptor(descriptor: &StorageSystemDescriptor) -> Self {
        Self::new(&descriptor.vendor, &descriptor.model)
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn vendor_wildcard(&self) -> Self {
        Self {
            vendor: self.vendor.clone(),
            model: ANY_MODEL.to_string(),
        }
    }
}

impl fmt::Display for DriverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor, self.model)
    }
}

// =============================================================================
// Driver Catalog
// =============================================================================

/// Startup-time registration table of driver factories
#[derive(Clone, Default)]
pub struct DriverCatalog {
    factories: HashMap<DriverKey, DriverFactoryRef>,
}

impl DriverCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every driver shipped in this crate
    pub fn with_builtin_drivers() -> Result<Self> {
        let mut catalog = Self::new();
        catalog.register(FAKE_VENDOR, FAKE_MODEL, Arc::new(FakeDriverFactory::new()))?;
        Ok(catalog)
    }

    /// Register a factory for `(vendor, model)`; `model` may be [`ANY_MODEL`]
    pub fn register(&mut self, vendor: &str, model: &str, factory: DriverFactoryRef) -> Result<()> {
        let key = DriverKey::new(vendor, model);
        if key.vendor.is_empty() || key.model.is_empty() {
            return Err(Error::Configuration(format!(
                "Driver key must name a vendor and a model, got '{}'",
                key
            )));
        }
        if self.factories.contains_key(&key) {
            return Err(Error::Configuration(format!(
                "Driver already registered for {}",
                key
            )));
        }

        info!("Registering driver {} for {}", factory.driver_name(), key);
        self.factories.insert(key, factory);
        Ok(())
    }

    /// Find the factory for `key`, falling back to the vendor wildcard
    pub fn resolve(&self, key: &DriverKey) -> Result<DriverFactoryRef> {
        if let Some(factory) = self.factories.get(key) {
            return Ok(factory.clone());
        }
        if let Some(factory) = self.factories.get(&key.vendor_wildcard()) {
            debug!("Using vendor-wide driver for {}", key);
            return Ok(factory.clone());
        }
        Err(Error::UnsupportedVendor {
            vendor: key.vendor.clone(),
            model: key.model.clone(),
        })
    }

    /// Every registered key, sorted
    pub fn supported(&self) -> Vec<DriverKey> {
        let mut keys: Vec<DriverKey> = self.factories.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.vendor, &a.model).cmp(&(&b.vendor, &b.model)));
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

// =============================================================================
// All-or-nothing Collection
// =============================================================================

/// Fetch every item in order, failing the whole collection on the first error
///
/// Any error from `fetch` is reported as `PartialCollectionFailure`, carrying
/// how many items had been collected; a truncated list is never returned.
pub async fn collect_all<I, T, F, Fut>(
    storage: &str,
    resource: &str,
    items: I,
    mut fetch: F,
) -> Result<Vec<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let items = items.into_iter();
    let mut collected = Vec::with_capacity(items.size_hint().0);

    for item in items {
        match fetch(item).await {
            Ok(value) => collected.push(value),
            Err(e) => {
                return Err(Error::PartialCollectionFailure {
                    storage: storage.to_string(),
                    resource: resource.to_string(),
                    collected: collected.len(),
                    reason: e.to_string(),
                })
            }
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_driver_key_is_case_insensitive() {
        assert_eq!(DriverKey::new("Dell_EMC ", "VMAX"), DriverKey::new("dell_emc", "vmax"));
        assert_eq!(DriverKey::new("Dell_EMC", "VMAX").to_string(), "dell_emc/vmax");
    }

    #[test]
    fn test_resolve_builtin() {
        let catalog = DriverCatalog::with_builtin_drivers().unwrap();
        assert!(catalog.resolve(&DriverKey::new("FakeVendor", "FakeModel")).is_ok());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_vendor() {
        let catalog = DriverCatalog::with_builtin_drivers().unwrap();
        let err = catalog.resolve(&DriverKey::new("acme", "x9000")).err().unwrap();
        assert_matches!(err, Error::UnsupportedVendor { ref vendor, ref model } if vendor == "acme" && model == "x9000");
    }

    #[test]
    fn test_vendor_wildcard_fallback() {
        let mut catalog = DriverCatalog::new();
        catalog
            .register("fakevendor", ANY_MODEL, Arc::new(FakeDriverFactory::new()))
            .unwrap();

        assert!(catalog.resolve(&DriverKey::new("fakevendor", "anything")).is_ok());
        assert!(catalog.resolve(&DriverKey::new("othervendor", "anything")).is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut catalog = DriverCatalog::with_builtin_drivers().unwrap();
        let result = catalog.register(FAKE_VENDOR, FAKE_MODEL, Arc::new(FakeDriverFactory::new()));
        assert_matches!(result, Err(Error::Configuration(_)));

        let result = catalog.register("", "model", Arc::new(FakeDriverFactory::new()));
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_collect_all_success() {
        let items = collect_all("array1", "pools", 0..4, |i| async move { Ok(i * 10) })
            .await
            .unwrap();
        assert_eq!(items, vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn test_collect_all_never_truncates() {
        let result = collect_all("array1", "pools", 0..5, |i| async move {
            if i == 3 {
                Err(Error::unreachable("array1", "pool 3 timed out"))
            } else {
                Ok(i)
            }
        })
        .await;

        assert_matches!(
            result,
            Err(Error::PartialCollectionFailure { collected: 3, ref resource, .. }) if resource == "pools"
        );
    }
}

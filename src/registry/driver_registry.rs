//! Driver Registry
//!
//! Resolves a storage system id to its live [`DriverInstance`], opening the
//! vendor session on first use and reusing it afterwards.
//!
//! At most one session per storage system is ever live. The first `get` for
//! an id claims the slot and spawns the build; every concurrent caller awaits
//! the same shared build and observes the same success or failure. A build
//! that was invalidated while in flight is discarded instead of installed.

use crate::config::RegistryConfig;
use crate::domain::alert::{ParsedAlert, RawAlert};
use crate::domain::context::RequestContext;
use crate::domain::ports::MetadataStoreRef;
use crate::domain::storage::{
    PoolSnapshot, StorageSystemDescriptor, StorageSystemSnapshot, VolumeSnapshot,
};
use crate::drivers::{DriverCatalog, DriverInstance, DriverKey};
use crate::error::{Error, Result};
use crate::metrics::HubMetrics;
use crate::registry::RegistryEvent;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

type BuildOutcome = std::result::Result<Arc<DriverInstance>, Error>;
type PendingBuild = Shared<BoxFuture<'static, BuildOutcome>>;

// =============================================================================
// Slots
// =============================================================================

enum Slot {
    /// A build is in flight; `generation` identifies it
    Connecting {
        generation: u64,
        pending: PendingBuild,
    },
    /// A live session
    Ready(Arc<DriverInstance>),
}

impl Slot {
    fn generation(&self) -> Option<u64> {
        match self {
            Slot::Connecting { generation, .. } => Some(*generation),
            Slot::Ready(_) => None,
        }
    }
}

// =============================================================================
// Driver Registry
// =============================================================================

struct RegistryInner {
    config: RegistryConfig,
    catalog: DriverCatalog,
    metadata: MetadataStoreRef,
    slots: DashMap<String, Slot>,
    generation: AtomicU64,
    event_sender: broadcast::Sender<RegistryEvent>,
    metrics: HubMetrics,
}

/// Owner of every live vendor session. Cheap to clone.
#[derive(Clone)]
pub struct DriverRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("slots", &self.inner.slots.len())
            .field("drivers", &self.inner.catalog.len())
            .finish()
    }
}

impl DriverRegistry {
    pub fn new(
        config: RegistryConfig,
        catalog: DriverCatalog,
        metadata: MetadataStoreRef,
        metrics: HubMetrics,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                config,
                catalog,
                metadata,
                slots: DashMap::new(),
                generation: AtomicU64::new(0),
                event_sender,
                metrics,
            }),
        }
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.event_sender.subscribe()
    }

    pub fn catalog(&self) -> &DriverCatalog {
        &self.inner.catalog
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn metadata(&self) -> &MetadataStoreRef {
        &self.inner.metadata
    }

    /// Number of cached, open sessions
    pub fn live_sessions(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Ready(_)))
            .count()
    }

    /// Resolve `storage_id` to its live instance, opening a session if needed
    ///
    /// Fails with `UnknownStorageSystem`, `UnsupportedVendor` or
    /// `BackendUnreachable`. A failed build is not retried here; the next
    /// call starts a fresh one.
    pub async fn get(&self, storage_id: &str) -> Result<Arc<DriverInstance>> {
        let pending = match self.inner.slots.entry(storage_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Slot::Ready(instance) = entry.get() {
                    if instance.is_open() {
                        return Ok(instance.clone());
                    }
                    // Closed behind our back, replace it
                    self.inner.metrics.sessions_live.dec();
                }
                match entry.get() {
                    Slot::Connecting { pending, .. } => pending.clone(),
                    Slot::Ready(_) => {
                        let (slot, pending) = self.begin_build(storage_id);
                        entry.insert(slot);
                        pending
                    }
                }
            }
            Entry::Vacant(entry) => {
                let (slot, pending) = self.begin_build(storage_id);
                entry.insert(slot);
                pending
            }
        };

        pending.await
    }

    /// Claim a build generation and spawn the build
    fn begin_build(&self, storage_id: &str) -> (Slot, PendingBuild) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Opening driver session for {} (generation {})", storage_id, generation);

        let registry = self.clone();
        let id = storage_id.to_string();
        // Spawned so the build completes even if every waiter is cancelled
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(registry.build(id.clone(), generation))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(registry.abandon_build(
                    &id,
                    generation,
                    Error::unreachable(&id, "driver panicked while opening the session"),
                )),
            }
        });

        let registry = self.clone();
        let id = storage_id.to_string();
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(registry.abandon_build(
                    &id,
                    generation,
                    Error::Internal(format!("Driver session build task failed: {}", e)),
                )),
            }
        }
        .boxed()
        .shared();

        (
            Slot::Connecting {
                generation,
                pending: pending.clone(),
            },
            pending,
        )
    }

    async fn build(&self, storage_id: String, generation: u64) -> BuildOutcome {
        let result = match self.inner.metadata.lookup_storage_system(&storage_id).await {
            Ok(Some(descriptor)) => self.open_session(descriptor).await,
            Ok(None) => Err(Error::UnknownStorageSystem {
                storage_id: storage_id.clone(),
            }),
            Err(e) => Err(e),
        };

        let instance = match result {
            Ok(instance) => Arc::new(instance),
            Err(e) => return Err(self.abandon_build(&storage_id, generation, e)),
        };

        let installed = match self.inner.slots.get_mut(&storage_id) {
            Some(mut slot) if slot.generation() == Some(generation) => {
                *slot = Slot::Ready(instance.clone());
                true
            }
            _ => false,
        };

        if !installed {
            instance.close().await;
            warn!(
                "Discarded driver session for {}: invalidated while connecting",
                storage_id
            );
            return Err(Error::unreachable(
                &storage_id,
                "session discarded, storage system was invalidated while connecting",
            ));
        }

        self.inner.metrics.sessions_live.inc();
        info!(
            "Driver session for {} ready ({})",
            storage_id,
            instance.key()
        );
        let _ = self.inner.event_sender.send(RegistryEvent::DriverConnected {
            storage_id,
            driver: instance.key().to_string(),
            generation,
        });
        Ok(instance)
    }

    /// Release the slot of a failed build so the next `get` starts over
    fn abandon_build(&self, storage_id: &str, generation: u64, err: Error) -> Error {
        self.inner
            .slots
            .remove_if(storage_id, |_, slot| slot.generation() == Some(generation));
        warn!("Failed to open driver session for {}: {}", storage_id, err);
        let _ = self.inner.event_sender.send(RegistryEvent::connect_failed(
            storage_id,
            err.kind(),
            err.to_string(),
        ));
        err
    }

    /// Open a session that is not cached; the caller owns it and must close it
    pub async fn open_session(&self, descriptor: StorageSystemDescriptor) -> Result<DriverInstance> {
        let key = DriverKey::for_descriptor(&descriptor);
        let factory = self.inner.catalog.resolve(&key)?;
        let timeout = self.inner.config.connect_timeout();

        let driver = match tokio::time::timeout(timeout, factory.connect(&descriptor)).await {
            Ok(driver) => driver?,
            Err(_) => {
                return Err(Error::unreachable(
                    &descriptor.storage_id,
                    format!("session establishment timed out after {:?}", timeout),
                ))
            }
        };

        self.inner.metrics.sessions_opened.inc();
        info!(
            "Opened {} session for storage {}",
            factory.driver_name(),
            descriptor.storage_id
        );
        Ok(DriverInstance::new(
            descriptor,
            driver,
            self.inner.config.call_timeout(),
            self.inner.metrics.clone(),
        ))
    }

    /// Dispose of the cached instance for `storage_id`
    ///
    /// An in-flight build is discarded: its session is closed on arrival and
    /// its waiters receive `BackendUnreachable`. Returns whether anything was
    /// removed.
    pub async fn invalidate(&self, storage_id: &str) -> bool {
        let removed = match self.inner.slots.remove(storage_id) {
            Some((_, slot)) => slot,
            None => return false,
        };

        match removed {
            Slot::Ready(instance) => {
                self.inner.metrics.sessions_live.dec();
                instance.close().await;
            }
            Slot::Connecting { generation, .. } => {
                debug!(
                    "Discarding in-flight session build {} for {}",
                    generation, storage_id
                );
            }
        }

        info!("Invalidated driver session for {}", storage_id);
        let _ = self.inner.event_sender.send(RegistryEvent::DriverInvalidated {
            storage_id: storage_id.to_string(),
        });
        true
    }

    /// Invalidate only if `instance` is still the cached one
    pub(crate) async fn invalidate_if_current(&self, storage_id: &str, instance: &Arc<DriverInstance>) {
        let removed = self.inner.slots.remove_if(storage_id, |_, slot| {
            matches!(slot, Slot::Ready(current) if Arc::ptr_eq(current, instance))
        });
        if removed.is_none() {
            return;
        }

        self.inner.metrics.sessions_live.dec();
        instance.close().await;
        info!("Invalidated broken driver session for {}", storage_id);
        let _ = self.inner.event_sender.send(RegistryEvent::DriverInvalidated {
            storage_id: storage_id.to_string(),
        });
    }

    /// Dispose of every cached session
    pub async fn close_all(&self) {
        let ids: Vec<String> = self
            .inner
            .slots
            .iter()
            .map(|slot| slot.key().clone())
            .collect();
        let count = ids.len();
        for id in ids {
            self.invalidate(&id).await;
        }
        info!("Closed {} driver session(s)", count);
    }

    // =========================================================================
    // Convenience Operations
    // =========================================================================

    /// Run `op` on the instance for `storage_id`, dropping the session if the
    /// call shows it to be broken
    async fn with_instance<T, F, Fut>(&self, storage_id: &str, op: F) -> Result<T>
    where
        F: FnOnce(Arc<DriverInstance>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let instance = self.get(storage_id).await?;
        let result = op(instance.clone()).await;

        if let Err(e) = &result {
            if e.breaks_session() {
                warn!("Driver session for {} is broken: {}", storage_id, e);
                self.invalidate_if_current(storage_id, &instance).await;
            }
        }
        result
    }

    pub async fn get_storage(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
    ) -> Result<StorageSystemSnapshot> {
        self.with_instance(storage_id, |instance| async move {
            instance.get_storage(ctx).await
        })
        .await
    }

    pub async fn list_pools(&self, ctx: &RequestContext, storage_id: &str) -> Result<Vec<PoolSnapshot>> {
        self.with_instance(storage_id, |instance| async move {
            instance.list_pools(ctx).await
        })
        .await
    }

    pub async fn list_volumes(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
    ) -> Result<Vec<VolumeSnapshot>> {
        self.with_instance(storage_id, |instance| async move {
            instance.list_volumes(ctx).await
        })
        .await
    }

    pub async fn parse_alert(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
        alert: &RawAlert,
    ) -> Result<ParsedAlert> {
        self.with_instance(storage_id, |instance| async move {
            instance.parse_alert(ctx, alert).await
        })
        .await
    }

    pub async fn clear_alert(
        &self,
        ctx: &RequestContext,
        storage_id: &str,
        sequence_number: &str,
    ) -> Result<()> {
        self.with_instance(storage_id, |instance| async move {
            instance.clear_alert(ctx, sequence_number).await
        })
        .await
    }
}

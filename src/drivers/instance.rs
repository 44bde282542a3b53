//! Driver Instance
//!
//! One live vendor session bound to one storage system. Every vendor call is
//! bounded by the call timeout, and a closed instance refuses further calls.

use crate::domain::alert::{ParsedAlert, RawAlert};
use crate::domain::context::RequestContext;
use crate::domain::ports::StorageDriverRef;
use crate::domain::storage::{
    PoolSnapshot, RegisterInfo, StorageSystemDescriptor, StorageSystemSnapshot, VolumeSnapshot,
};
use crate::drivers::DriverKey;
use crate::error::{Error, Result};
use crate::metrics::HubMetrics;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A live, timeout-guarded vendor session
pub struct DriverInstance {
    descriptor: StorageSystemDescriptor,
    key: DriverKey,
    driver: StorageDriverRef,
    call_timeout: Duration,
    metrics: HubMetrics,
    closed: AtomicBool,
    opened_at: DateTime<Utc>,
}

impl std::fmt::Debug for DriverInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverInstance")
            .field("storage_id", &self.descriptor.storage_id)
            .field("key", &self.key)
            .field("open", &self.is_open())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

impl DriverInstance {
    /// Wrap a freshly opened driver session
    pub fn new(
        descriptor: StorageSystemDescriptor,
        driver: StorageDriverRef,
        call_timeout: Duration,
        metrics: HubMetrics,
    ) -> Self {
        let key = DriverKey::for_descriptor(&descriptor);
        Self {
            descriptor,
            key,
            driver,
            call_timeout,
            metrics,
            closed: AtomicBool::new(false),
            opened_at: Utc::now(),
        }
    }

    pub fn storage_id(&self) -> &str {
        &self.descriptor.storage_id
    }

    /// The descriptor the session was opened from
    pub fn descriptor(&self) -> &StorageSystemDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> &DriverKey {
        &self.key
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Dispose of the session. Irreversible; repeated calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let started = Instant::now();
        let result = tokio::time::timeout(self.call_timeout, self.driver.close()).await;
        self.metrics.observe_call("close", started.elapsed());

        match result {
            Ok(()) => info!("Closed driver session for storage {}", self.storage_id()),
            Err(_) => warn!(
                "Logout from storage {} timed out after {:?}, session abandoned",
                self.storage_id(),
                self.call_timeout
            ),
        }
    }

    /// Run one vendor call under the call timeout
    async fn call<T, Fut>(&self, operation: &'static str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_open() {
            return Err(Error::unreachable(self.storage_id(), "driver session closed"));
        }

        let started = Instant::now();
        let result = tokio::time::timeout(self.call_timeout, fut).await;
        self.metrics.observe_call(operation, started.elapsed());

        match result {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!("{} on storage {} failed: {}", operation, self.storage_id(), e);
                }
                result
            }
            Err(_) => {
                warn!(
                    "{} on storage {} timed out after {:?}",
                    operation,
                    self.storage_id(),
                    self.call_timeout
                );
                Err(Error::unreachable(
                    self.storage_id(),
                    format!("{} timed out after {:?}", operation, self.call_timeout),
                ))
            }
        }
    }

    pub async fn register_storage(
        &self,
        ctx: &RequestContext,
        info: &RegisterInfo,
    ) -> Result<StorageSystemDescriptor> {
        self.call("register_storage", self.driver.register_storage(ctx, info))
            .await
    }

    pub async fn get_storage(&self, ctx: &RequestContext) -> Result<StorageSystemSnapshot> {
        let snapshot = self.call("get_storage", self.driver.get_storage(ctx)).await?;

        if snapshot.model.trim().is_empty() {
            return Err(Error::IncompleteVendorData {
                storage: self.storage_id().to_string(),
                reason: "model not reported".into(),
            });
        }
        if snapshot.used_capacity > snapshot.total_capacity {
            return Err(Error::IncompleteVendorData {
                storage: self.storage_id().to_string(),
                reason: format!(
                    "used capacity {} exceeds total capacity {}",
                    snapshot.used_capacity, snapshot.total_capacity
                ),
            });
        }
        Ok(snapshot)
    }

    pub async fn list_pools(&self, ctx: &RequestContext) -> Result<Vec<PoolSnapshot>> {
        self.call("list_pools", self.driver.list_pools(ctx)).await
    }

    pub async fn list_volumes(&self, ctx: &RequestContext) -> Result<Vec<VolumeSnapshot>> {
        self.call("list_volumes", self.driver.list_volumes(ctx)).await
    }

    pub async fn parse_alert(&self, ctx: &RequestContext, alert: &RawAlert) -> Result<ParsedAlert> {
        let storage_id = self.storage_id();
        self.call("parse_alert", self.driver.parse_alert(ctx, storage_id, alert))
            .await
    }

    pub async fn clear_alert(&self, ctx: &RequestContext, sequence_number: &str) -> Result<()> {
        let storage_id = self.storage_id();
        self.call(
            "clear_alert",
            self.driver.clear_alert(ctx, storage_id, sequence_number),
        )
        .await
    }
}

//! Fake Storage Driver
//!
//! Deterministic reference driver. It never talks to real hardware; its
//! inventory and failure behaviour are driven by the descriptor's
//! `extra_attributes`, which makes it the driver of choice for demos and tests.

use crate::domain::alert::{
    AlertSeverity, ParsedAlert, RawAlert, STORAGE_ID_KEY, STORAGE_NAME_KEY, VENDOR_KEY,
};
use crate::domain::context::RequestContext;
use crate::domain::ports::{DriverFactory, StorageDriver, StorageDriverRef};
use crate::domain::storage::{
    AccessInfo, PoolSnapshot, PoolStatus, RegisterInfo, StorageStatus, StorageSystemDescriptor,
    StorageSystemSnapshot, StorageType, VolumeSnapshot, VolumeStatus, VolumeType,
};
use crate::drivers::collect_all;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Vendor name served by the fake driver
pub const FAKE_VENDOR: &str = "fakevendor";
/// Model name served by the fake driver
pub const FAKE_MODEL: &str = "fakemodel";

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// FC-MGMT-MIB `connUnitEventType` values
const KNOWN_EVENT_TYPES: [&str; 5] = ["unknown", "other", "status", "configuration", "topology"];

// =============================================================================
// Behaviour
// =============================================================================

/// Upper bound for `pool_count` and `volume_count`
pub const MAX_FAKE_ITEMS: usize = 10_000;

/// Knobs read from `extra_attributes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBehavior {
    /// Number of pools reported
    pub pool_count: usize,
    /// Number of volumes reported
    pub volume_count: usize,
    /// Pool index whose query fails
    pub fail_pool_at: Option<usize>,
    /// Volume index whose query fails
    pub fail_volume_at: Option<usize>,
    /// Refuse every connection attempt
    pub unreachable: bool,
    /// Delay before a session is established
    pub connect_delay: Duration,
    /// Delay before every vendor call
    pub call_delay: Duration,
    /// Vendor-side array identifier
    pub array_id: Option<String>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            pool_count: 3,
            volume_count: 5,
            fail_pool_at: None,
            fail_volume_at: None,
            unreachable: false,
            connect_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
            array_id: None,
        }
    }
}

impl FakeBehavior {
    /// Read behaviour from connection parameters
    pub fn from_access_info(access: &AccessInfo) -> Result<Self> {
        let defaults = Self::default();
        let behavior = Self {
            pool_count: parse_attr(access, "pool_count")?.unwrap_or(defaults.pool_count),
            volume_count: parse_attr(access, "volume_count")?.unwrap_or(defaults.volume_count),
            fail_pool_at: parse_attr(access, "fail_pool_at")?,
            fail_volume_at: parse_attr(access, "fail_volume_at")?,
            unreachable: parse_attr(access, "unreachable")?.unwrap_or(false),
            connect_delay: parse_attr(access, "connect_delay_ms")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_delay),
            call_delay: parse_attr(access, "call_delay_ms")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_delay),
            array_id: access.extra("array_id").map(str::to_string),
        };

        for (key, count) in [
            ("pool_count", behavior.pool_count),
            ("volume_count", behavior.volume_count),
        ] {
            if count > MAX_FAKE_ITEMS {
                return Err(Error::Configuration(format!(
                    "Attribute {} must not exceed {}, got {}",
                    key, MAX_FAKE_ITEMS, count
                )));
            }
        }
        Ok(behavior)
    }
}

fn parse_attr<T: FromStr>(access: &AccessInfo, key: &str) -> Result<Option<T>> {
    match access.extra(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::Configuration(format!("Invalid value '{}' for attribute {}", raw, key))
        }),
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Session counters shared by a factory and the sessions it opened
#[derive(Debug, Default)]
pub struct FakeSessionCounters {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl FakeSessionCounters {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Opens [`FakeStorageDriver`] sessions
#[derive(Debug, Default)]
pub struct FakeDriverFactory {
    counters: Arc<FakeSessionCounters>,
}

impl FakeDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters covering every session this factory opened
    pub fn counters(&self) -> Arc<FakeSessionCounters> {
        self.counters.clone()
    }
}

#[async_trait]
impl DriverFactory for FakeDriverFactory {
    fn driver_name(&self) -> &str {
        "fake"
    }

    async fn connect(&self, descriptor: &StorageSystemDescriptor) -> Result<StorageDriverRef> {
        let behavior = FakeBehavior::from_access_info(&descriptor.access_info)?;
        if !behavior.connect_delay.is_zero() {
            tokio::time::sleep(behavior.connect_delay).await;
        }

        let access = &descriptor.access_info;
        if behavior.unreachable {
            return Err(Error::unreachable(
                &descriptor.storage_id,
                format!("connection to {} refused", access.endpoint()),
            ));
        }
        if access.username.is_empty() || access.password.is_empty() {
            return Err(Error::InvalidCredentials {
                storage: descriptor.storage_id.clone(),
                reason: "username and password are required".into(),
            });
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        info!(
            "Opened fake session to {} for storage {}",
            access.endpoint(),
            descriptor.storage_id
        );
        Ok(Arc::new(FakeStorageDriver::new(
            descriptor,
            behavior,
            self.counters.clone(),
        )))
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Deterministic in-process storage system
pub struct FakeStorageDriver {
    storage_id: String,
    vendor: String,
    model: String,
    array_id: String,
    behavior: FakeBehavior,
    counters: Arc<FakeSessionCounters>,
    cleared_alerts: Mutex<Vec<String>>,
}

impl FakeStorageDriver {
    fn new(
        descriptor: &StorageSystemDescriptor,
        behavior: FakeBehavior,
        counters: Arc<FakeSessionCounters>,
    ) -> Self {
        let array_id = behavior
            .array_id
            .clone()
            .unwrap_or_else(|| format!("FAKE-{}", descriptor.access_info.host));
        Self {
            storage_id: descriptor.storage_id.clone(),
            vendor: descriptor.vendor.clone(),
            model: descriptor.model.clone(),
            array_id,
            behavior,
            counters,
            cleared_alerts: Mutex::new(Vec::new()),
        }
    }

    /// Sequence numbers cleared so far
    pub fn cleared_alerts(&self) -> Vec<String> {
        self.cleared_alerts.lock().clone()
    }

    async fn vendor_round_trip(&self) {
        if !self.behavior.call_delay.is_zero() {
            tokio::time::sleep(self.behavior.call_delay).await;
        }
    }

    fn pool(&self, index: usize) -> PoolSnapshot {
        let total = (100 * GIB).saturating_mul(index as u64 + 1);
        let used = total / 4 * 3;
        PoolSnapshot {
            name: format!("pool_{}", index),
            storage_id: self.storage_id.clone(),
            native_storage_pool_id: format!("{}-SRP-{}", self.array_id, index),
            description: "Fake storage pool".into(),
            status: PoolStatus::Normal,
            storage_type: StorageType::Block,
            total_capacity: total,
            used_capacity: used,
            free_capacity: total - used,
        }
    }

    async fn fetch_pool(&self, index: usize) -> Result<PoolSnapshot> {
        if self.behavior.fail_pool_at == Some(index) {
            return Err(Error::unreachable(
                &self.storage_id,
                format!("vendor rejected query for pool {}", index),
            ));
        }
        Ok(self.pool(index))
    }

    async fn fetch_volume(&self, index: usize) -> Result<VolumeSnapshot> {
        if self.behavior.fail_volume_at == Some(index) {
            return Err(Error::unreachable(
                &self.storage_id,
                format!("vendor rejected query for volume {}", index),
            ));
        }

        let total = 100 * MIB * (index as u64 + 1);
        let used = total / 10;
        let pool_id = match self.behavior.pool_count {
            0 => String::new(),
            count => self.pool(index % count).native_storage_pool_id,
        };
        Ok(VolumeSnapshot {
            name: format!("volume_{}", index),
            storage_id: self.storage_id.clone(),
            description: "Fake thin volume".into(),
            volume_type: VolumeType::Thin,
            status: VolumeStatus::Available,
            native_volume_id: format!("{:05}", index + 1),
            native_storage_pool_id: pool_id,
            wwn: format!("{}{:04}", self.array_id, index),
            total_capacity: total,
            used_capacity: used,
            free_capacity: total - used,
            compressed: index % 2 == 0,
            deduplicated: false,
        })
    }
}

#[async_trait]
impl StorageDriver for FakeStorageDriver {
    async fn register_storage(
        &self,
        _ctx: &RequestContext,
        info: &RegisterInfo,
    ) -> Result<StorageSystemDescriptor> {
        self.vendor_round_trip().await;
        Ok(StorageSystemDescriptor {
            storage_id: self.storage_id.clone(),
            name: info
                .name
                .clone()
                .unwrap_or_else(|| format!("fake_storage_{}", self.array_id)),
            vendor: info.vendor.clone(),
            model: info.model.clone(),
            serial_number: self.array_id.clone(),
            description: info
                .description
                .clone()
                .unwrap_or_else(|| "Fake storage system".into()),
            location: "lab".into(),
            access_info: info.access_info.clone(),
        })
    }

    async fn get_storage(&self, _ctx: &RequestContext) -> Result<StorageSystemSnapshot> {
        self.vendor_round_trip().await;
        let (total, used) = (0..self.behavior.pool_count)
            .map(|i| self.pool(i))
            .fold((0u64, 0u64), |(t, u), p| {
                (t.saturating_add(p.total_capacity), u.saturating_add(p.used_capacity))
            });

        Ok(StorageSystemSnapshot {
            name: format!("fake_storage_{}", self.array_id),
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            serial_number: self.array_id.clone(),
            firmware_version: "1.0.0".into(),
            description: "Fake storage system".into(),
            location: "lab".into(),
            status: StorageStatus::Normal,
            total_capacity: total,
            used_capacity: used,
            free_capacity: total - used,
        })
    }

    async fn list_pools(&self, _ctx: &RequestContext) -> Result<Vec<PoolSnapshot>> {
        self.vendor_round_trip().await;
        collect_all(&self.storage_id, "pools", 0..self.behavior.pool_count, |i| {
            self.fetch_pool(i)
        })
        .await
    }

    async fn list_volumes(&self, _ctx: &RequestContext) -> Result<Vec<VolumeSnapshot>> {
        self.vendor_round_trip().await;
        collect_all(&self.storage_id, "volumes", 0..self.behavior.volume_count, |i| {
            self.fetch_volume(i)
        })
        .await
    }

    async fn parse_alert(
        &self,
        _ctx: &RequestContext,
        storage_id: &str,
        alert: &RawAlert,
    ) -> Result<ParsedAlert> {
        self.vendor_round_trip().await;

        let event_type = alert
            .text("connUnitEventType")
            .map(|t| {
                let normalized = t.trim().to_lowercase();
                if KNOWN_EVENT_TYPES.contains(&normalized.as_str()) {
                    Ok(normalized)
                } else {
                    Err(Error::InvalidResults(format!("Unknown event type: {}", t)))
                }
            })
            .transpose()?;

        let severity = alert
            .text("connUnitEventSeverity")
            .map(|s| map_severity(&s))
            .transpose()?;

        let location = match (
            alert.text("asyncEventComponentType"),
            alert.text("asyncEventComponentName"),
        ) {
            (Some(kind), Some(name)) => {
                Some(format!("Component type: {} Group,Component name: {}", kind, name))
            }
            _ => alert
                .text(STORAGE_NAME_KEY)
                .map(|name| format!("Storage: {}", name)),
        };

        let alarm_id = alert.text("asyncEventCode");
        let alarm_name = alarm_id.as_deref().map(alarm_name_for_code);

        let occur_time = match alert.text("occurTime") {
            Some(raw) => parse_occur_time(&raw)?,
            None => Utc::now(),
        };

        debug!("Parsed fake alert {:?} for storage {}", alarm_id, storage_id);

        Ok(ParsedAlert {
            me_dn: alert.storage_id().or_else(|| Some(storage_id.to_string())),
            me_name: alert.text(STORAGE_NAME_KEY),
            manufacturer: alert.text(VENDOR_KEY),
            location,
            event_type,
            severity,
            probable_cause: alert.text("connUnitEventDescr"),
            me_category: alert
                .text("connUnitType")
                .or_else(|| Some("storage-subsystem".to_string())),
            native_me_dn: alert.text("connUnitName"),
            alarm_id,
            alarm_name,
            occur_time: Some(occur_time),
        })
    }

    async fn clear_alert(
        &self,
        _ctx: &RequestContext,
        storage_id: &str,
        sequence_number: &str,
    ) -> Result<()> {
        self.vendor_round_trip().await;
        if sequence_number.trim().is_empty() {
            return Err(Error::InvalidResults(
                "Alert sequence number is required".into(),
            ));
        }
        info!("Cleared alert {} on storage {}", sequence_number, storage_id);
        self.cleared_alerts.lock().push(sequence_number.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Alert Mapping
// =============================================================================

/// FC-MGMT-MIB `connUnitEventSeverity` onto the canonical set
fn map_severity(raw: &str) -> Result<AlertSeverity> {
    match raw.trim().to_lowercase().as_str() {
        "emergency" | "alert" | "critical" => Ok(AlertSeverity::Critical),
        "error" => Ok(AlertSeverity::Major),
        "warning" => Ok(AlertSeverity::Warning),
        "notify" => Ok(AlertSeverity::Minor),
        "info" | "debug" | "mark" => Ok(AlertSeverity::Informational),
        other => Err(Error::InvalidResults(format!("Unknown severity: {}", other))),
    }
}

fn alarm_name_for_code(code: &str) -> String {
    match code {
        "1050" => "DIAGNOSTIC_EVENT_TRACE".to_string(),
        "1051" => "COMPONENT_FAILURE".to_string(),
        "1052" => "COMPONENT_RECOVERED".to_string(),
        other => format!("ALARM_{}", other),
    }
}

/// RFC 3339 timestamp or epoch milliseconds
fn parse_occur_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| Error::InvalidResults(format!("Invalid occurTime: {}", raw)))
}

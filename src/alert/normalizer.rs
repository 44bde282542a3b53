//! Alert Normalizer
//!
//! Turns one [`RawAlert`] into one [`CanonicalAlertModel`], or fails with a
//! typed error. The exporter runs exactly once per successful normalization
//! and never after a failure.
//!
//! Steps:
//! 1. Read the storage reference from the raw alert
//! 2. Resolve the storage system descriptor
//! 3. Enrich the alert with the descriptor's name, vendor and model
//! 4. Resolve the live driver instance through the registry
//! 5. Let the driver map vendor fields onto canonical ones
//! 6. Validate the draft into a canonical model
//! 7. Export

use crate::domain::alert::{
    CanonicalAlertModel, RawAlert, MODEL_KEY, STORAGE_NAME_KEY, VENDOR_KEY,
};
use crate::domain::context::RequestContext;
use crate::domain::ports::AlertExporterRef;
use crate::domain::storage::StorageSystemDescriptor;
use crate::error::{Error, Result};
use crate::metrics::HubMetrics;
use crate::registry::DriverRegistry;
use tracing::{debug, info, warn};

const PARSE_FAILURE: &str = "Failed to fill the alert model from driver";

/// Outcome label recorded for successfully exported alerts
pub const OUTCOME_EXPORTED: &str = "exported";

pub struct AlertNormalizer {
    registry: DriverRegistry,
    exporter: AlertExporterRef,
    metrics: HubMetrics,
}

impl AlertNormalizer {
    /// Descriptors are looked up through the registry's metadata store
    pub fn new(registry: DriverRegistry, exporter: AlertExporterRef, metrics: HubMetrics) -> Self {
        Self {
            registry,
            exporter,
            metrics,
        }
    }

    /// Normalize and export one raw alert
    pub async fn normalize(&self, ctx: &RequestContext, alert: RawAlert) -> Result<CanonicalAlertModel> {
        let result = self.process(ctx, alert).await;

        match &result {
            Ok(model) => {
                self.metrics.record_alert(OUTCOME_EXPORTED);
                info!(
                    "Exported alert {} ({}) from storage {}",
                    model.alarm_id(),
                    model.severity(),
                    model.me_dn()
                );
            }
            Err(e) => {
                self.metrics.record_alert(e.kind().as_str());
                warn!("Rejected alert [{}]: {}", ctx.request_id, e);
            }
        }
        result
    }

    async fn process(&self, ctx: &RequestContext, mut alert: RawAlert) -> Result<CanonicalAlertModel> {
        let storage_id = alert.storage_id().ok_or(Error::MissingStorageReference)?;

        let descriptor = self
            .registry
            .metadata()
            .lookup_storage_system(&storage_id)
            .await?
            .ok_or_else(|| Error::UnknownStorageSystem {
                storage_id: storage_id.clone(),
            })?;

        enrich(&mut alert, &descriptor);

        let instance = self.registry.get(&storage_id).await?;
        let draft = match instance.parse_alert(ctx, &alert).await {
            Ok(draft) => draft,
            Err(e) => {
                if e.breaks_session() {
                    self.registry.invalidate_if_current(&storage_id, &instance).await;
                }
                return Err(driver_failure(e));
            }
        };

        let model = draft.into_canonical()?;
        debug!("Alert from {} validated, exporting via {}", storage_id, self.exporter.name());

        self.exporter.export(&model).await.map_err(|e| match e {
            Error::ExportFailed { .. } => e,
            other => Error::ExportFailed {
                exporter: self.exporter.name().to_string(),
                reason: other.to_string(),
            },
        })?;

        Ok(model)
    }
}

/// Overwrite vendor-reported identity fields; the descriptor is authoritative
fn enrich(alert: &mut RawAlert, descriptor: &StorageSystemDescriptor) {
    alert.insert(STORAGE_NAME_KEY, descriptor.name.clone());
    alert.insert(VENDOR_KEY, descriptor.vendor.clone());
    alert.insert(MODEL_KEY, descriptor.model.clone());
}

/// Unreachable stays unreachable; anything else is a parse failure
fn driver_failure(err: Error) -> Error {
    match err {
        Error::BackendUnreachable { .. } => err,
        Error::InvalidResults(reason) => Error::InvalidResults(format!("{}: {}", PARSE_FAILURE, reason)),
        other => Error::InvalidResults(format!("{}: {}", PARSE_FAILURE, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::domain::alert::{AlertSeverity, ParsedAlert, STORAGE_ID_KEY};
    use crate::domain::ports::{AlertExporter, DriverFactory, StorageDriver, StorageDriverRef};
    use crate::domain::storage::{
        AccessInfo, PoolSnapshot, RegisterInfo, StorageSystemSnapshot, VolumeSnapshot,
    };
    use crate::drivers::{DriverCatalog, FakeDriverFactory, ANY_MODEL, FAKE_MODEL, FAKE_VENDOR};
    use crate::metadata::InMemoryMetadataStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    // =========================================================================
    // Test Doubles
    // =========================================================================

    #[derive(Default)]
    struct RecordingExporter {
        alerts: Mutex<Vec<CanonicalAlertModel>>,
        fail: bool,
    }

    impl RecordingExporter {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn count(&self) -> usize {
            self.alerts.lock().len()
        }
    }

    #[async_trait]
    impl AlertExporter for RecordingExporter {
        fn name(&self) -> &str {
            "recording"
        }

        async fn export(&self, alert: &CanonicalAlertModel) -> Result<()> {
            self.alerts.lock().push(alert.clone());
            if self.fail {
                return Err(Error::Internal("sink offline".into()));
            }
            Ok(())
        }
    }

    /// Driver that answers every alert with a fixed draft
    struct ScriptedDriver {
        draft: ParsedAlert,
    }

    #[async_trait]
    impl StorageDriver for ScriptedDriver {
        async fn register_storage(
            &self,
            _ctx: &RequestContext,
            _info: &RegisterInfo,
        ) -> Result<StorageSystemDescriptor> {
            Err(Error::Internal("not scripted".into()))
        }

        async fn get_storage(&self, _ctx: &RequestContext) -> Result<StorageSystemSnapshot> {
            Err(Error::Internal("not scripted".into()))
        }

        async fn list_pools(&self, _ctx: &RequestContext) -> Result<Vec<PoolSnapshot>> {
            Ok(Vec::new())
        }

        async fn list_volumes(&self, _ctx: &RequestContext) -> Result<Vec<VolumeSnapshot>> {
            Ok(Vec::new())
        }

        async fn parse_alert(
            &self,
            _ctx: &RequestContext,
            _storage_id: &str,
            _alert: &RawAlert,
        ) -> Result<ParsedAlert> {
            Ok(self.draft.clone())
        }

        async fn clear_alert(
            &self,
            _ctx: &RequestContext,
            _storage_id: &str,
            _sequence_number: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedFactory {
        draft: ParsedAlert,
    }

    #[async_trait]
    impl DriverFactory for ScriptedFactory {
        fn driver_name(&self) -> &str {
            "scripted"
        }

        async fn connect(&self, _descriptor: &StorageSystemDescriptor) -> Result<StorageDriverRef> {
            Ok(Arc::new(ScriptedDriver {
                draft: self.draft.clone(),
            }))
        }
    }

    // =========================================================================
    // Harness
    // =========================================================================

    struct Harness {
        normalizer: AlertNormalizer,
        registry: DriverRegistry,
        exporter: Arc<RecordingExporter>,
        metrics: HubMetrics,
    }

    fn descriptor(id: &str, vendor: &str, model: &str, access: AccessInfo) -> StorageSystemDescriptor {
        StorageSystemDescriptor {
            storage_id: id.into(),
            name: "array1".into(),
            vendor: vendor.into(),
            model: model.into(),
            serial_number: String::new(),
            description: String::new(),
            location: String::new(),
            access_info: access,
        }
    }

    fn harness(access: AccessInfo, exporter: RecordingExporter, config: RegistryConfig) -> Harness {
        let scripted = ParsedAlert {
            alarm_name: None,
            ..complete_draft()
        };
        let mut catalog = DriverCatalog::new();
        catalog
            .register(FAKE_VENDOR, FAKE_MODEL, Arc::new(FakeDriverFactory::new()))
            .unwrap();
        catalog
            .register("scripted", ANY_MODEL, Arc::new(ScriptedFactory { draft: scripted }))
            .unwrap();

        let metadata = Arc::new(InMemoryMetadataStore::with_storages(vec![
            descriptor("abcd-1234", FAKE_VENDOR, FAKE_MODEL, access),
            descriptor(
                "scripted-1",
                "scripted",
                "v1",
                AccessInfo::new("10.0.0.9", "user", "pass"),
            ),
        ]));
        let metrics = HubMetrics::new();
        let registry = DriverRegistry::new(config, catalog, metadata, metrics.clone());
        let exporter = Arc::new(exporter);
        let normalizer = AlertNormalizer::new(registry.clone(), exporter.clone(), metrics.clone());

        Harness {
            normalizer,
            registry,
            exporter,
            metrics,
        }
    }

    fn default_harness() -> Harness {
        harness(
            AccessInfo::new("10.0.0.1", "user", "pass"),
            RecordingExporter::default(),
            RegistryConfig::default(),
        )
    }

    fn complete_draft() -> ParsedAlert {
        ParsedAlert {
            me_dn: Some("scripted-1".into()),
            me_name: Some("array1".into()),
            manufacturer: Some("scripted".into()),
            location: Some("Storage: array1".into()),
            event_type: Some("status".into()),
            severity: Some(AlertSeverity::Major),
            probable_cause: Some("Controller failover".into()),
            me_category: Some("storage-subsystem".into()),
            native_me_dn: Some("SCRIPTED-01".into()),
            alarm_id: Some("7".into()),
            alarm_name: Some("CONTROLLER_FAILOVER".into()),
            occur_time: Some(Utc::now()),
        }
    }

    fn scenario_alert() -> RawAlert {
        RawAlert::new()
            .with(STORAGE_ID_KEY, "abcd-1234")
            .with("connUnitEventType", "topology")
            .with("connUnitEventSeverity", "warning")
            .with("connUnitEventDescr", "Diagnostic event trace triggered.")
            .with("asyncEventCode", "1050")
            .with("connUnitName", "000192601409")
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn test_scenario_alert_is_exported_once() {
        let h = default_harness();
        let model = h
            .normalizer
            .normalize(&RequestContext::new(), scenario_alert())
            .await
            .unwrap();

        assert_eq!(model.me_dn(), "abcd-1234");
        assert_eq!(model.me_name(), "array1");
        assert_eq!(model.manufacturer(), "fakevendor");
        assert_eq!(model.event_type(), "topology");
        assert_eq!(model.severity(), AlertSeverity::Warning);
        assert_eq!(model.probable_cause(), "Diagnostic event trace triggered.");
        assert_eq!(model.alarm_id(), "1050");
        assert_eq!(model.native_me_dn(), "000192601409");

        assert_eq!(h.exporter.count(), 1);
        assert_eq!(h.exporter.alerts.lock()[0], model);
        assert_eq!(
            h.metrics
                .alerts_processed
                .with_label_values(&[OUTCOME_EXPORTED])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_descriptor_overrides_vendor_fields() {
        let h = default_harness();
        let alert = scenario_alert()
            .with(VENDOR_KEY, "spoofed")
            .with(STORAGE_NAME_KEY, "not-array1");

        let model = h.normalizer.normalize(&RequestContext::new(), alert).await.unwrap();
        assert_eq!(model.manufacturer(), "fakevendor");
        assert_eq!(model.me_name(), "array1");
    }

    #[tokio::test]
    async fn test_missing_storage_reference() {
        let h = default_harness();
        let alert = RawAlert::new().with("connUnitEventType", "topology");

        let result = h.normalizer.normalize(&RequestContext::new(), alert).await;
        assert_matches!(result, Err(Error::MissingStorageReference));
        assert_eq!(h.exporter.count(), 0);
        assert_eq!(
            h.metrics
                .alerts_processed
                .with_label_values(&["missing_storage_reference"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_storage_system() {
        let h = default_harness();
        let alert = scenario_alert().with(STORAGE_ID_KEY, "nope");

        let result = h.normalizer.normalize(&RequestContext::new(), alert).await;
        assert_matches!(result, Err(Error::UnknownStorageSystem { .. }));
        assert_eq!(h.exporter.count(), 0);
    }

    #[tokio::test]
    async fn test_missing_alarm_name_is_rejected() {
        let h = default_harness();
        let alert = scenario_alert().with(STORAGE_ID_KEY, "scripted-1");

        let result = h.normalizer.normalize(&RequestContext::new(), alert).await;
        assert_matches!(
            result,
            Err(Error::InvalidResults(ref msg))
                if msg.contains("Failed to fill the alert model from driver") && msg.contains("alarm_name")
        );
        assert_eq!(h.exporter.count(), 0);
    }

    #[tokio::test]
    async fn test_driver_error_becomes_invalid_results() {
        let h = default_harness();
        let alert = scenario_alert().with("connUnitEventType", "meteor-strike");

        let result = h.normalizer.normalize(&RequestContext::new(), alert).await;
        assert_matches!(
            result,
            Err(Error::InvalidResults(ref msg))
                if msg.starts_with("Failed to fill the alert model from driver") && msg.contains("meteor-strike")
        );
        assert_eq!(h.exporter.count(), 0);
        // A malformed alert does not break the session
        assert_eq!(h.registry.live_sessions(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_driver_stays_unreachable() {
        let config = RegistryConfig {
            call_timeout_ms: 20,
            ..RegistryConfig::default()
        };
        let slow = AccessInfo::new("10.0.0.1", "user", "pass").with_extra("call_delay_ms", "500");
        let h = harness(slow, RecordingExporter::default(), config);

        let result = h.normalizer.normalize(&RequestContext::new(), scenario_alert()).await;
        assert_matches!(result, Err(Error::BackendUnreachable { .. }));
        assert_eq!(h.exporter.count(), 0);
        assert_eq!(h.registry.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_registry_failure_propagates_unchanged() {
        let refused = AccessInfo::new("10.0.0.1", "user", "");
        let h = harness(refused, RecordingExporter::default(), RegistryConfig::default());

        let result = h.normalizer.normalize(&RequestContext::new(), scenario_alert()).await;
        assert_matches!(result, Err(Error::InvalidCredentials { .. }));
        assert_eq!(h.exporter.count(), 0);
    }

    #[tokio::test]
    async fn test_exporter_failure() {
        let h = harness(
            AccessInfo::new("10.0.0.1", "user", "pass"),
            RecordingExporter::failing(),
            RegistryConfig::default(),
        );

        let result = h.normalizer.normalize(&RequestContext::new(), scenario_alert()).await;
        assert_matches!(result, Err(Error::ExportFailed { ref exporter, .. }) if exporter == "recording");
        assert_eq!(h.exporter.count(), 1);
    }

    #[tokio::test]
    async fn test_alerts_are_independent() {
        let h = default_harness();
        let ctx = RequestContext::new();

        assert!(h.normalizer.normalize(&ctx, RawAlert::new()).await.is_err());
        assert!(h.normalizer.normalize(&ctx, scenario_alert()).await.is_ok());
        assert_eq!(h.exporter.count(), 1);
    }
}

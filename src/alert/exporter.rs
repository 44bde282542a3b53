//! Alert Exporters
//!
//! Sinks for finished alerts. Delivery beyond the process boundary (SNMP
//! forwarding, message buses) is left to whatever drains a [`ChannelExporter`].

use crate::domain::alert::CanonicalAlertModel;
use crate::domain::ports::{AlertExporter, AlertExporterRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

// =============================================================================
// Logging Exporter
// =============================================================================

/// Emits one structured log event per alert
#[derive(Debug, Default, Clone)]
pub struct LoggingExporter;

impl LoggingExporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertExporter for LoggingExporter {
    fn name(&self) -> &str {
        "logging"
    }

    async fn export(&self, alert: &CanonicalAlertModel) -> Result<()> {
        info!(
            me_dn = alert.me_dn(),
            me_name = alert.me_name(),
            manufacturer = alert.manufacturer(),
            severity = %alert.severity(),
            event_type = alert.event_type(),
            alarm_id = alert.alarm_id(),
            alarm_name = alert.alarm_name(),
            occur_time = %alert.occur_time(),
            "Alert: {}",
            alert.probable_cause()
        );
        Ok(())
    }
}

// =============================================================================
// Channel Exporter
// =============================================================================

/// Forwards alerts into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelExporter {
    sender: mpsc::Sender<CanonicalAlertModel>,
}

impl ChannelExporter {
    /// Exporter plus the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CanonicalAlertModel>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl AlertExporter for ChannelExporter {
    fn name(&self) -> &str {
        "channel"
    }

    async fn export(&self, alert: &CanonicalAlertModel) -> Result<()> {
        self.sender
            .send(alert.clone())
            .await
            .map_err(|_| Error::ExportFailed {
                exporter: self.name().to_string(),
                reason: "receiver dropped".into(),
            })
    }
}

// =============================================================================
// Fan-out
// =============================================================================

/// Delivers every alert to each sink, continuing past failures
#[derive(Clone, Default)]
pub struct ExporterFanout {
    sinks: Vec<AlertExporterRef>,
}

impl ExporterFanout {
    pub fn new(sinks: Vec<AlertExporterRef>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: AlertExporterRef) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AlertExporter for ExporterFanout {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn export(&self, alert: &CanonicalAlertModel) -> Result<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.export(alert).await {
                warn!("Exporter {} failed: {}", sink.name(), e);
                failures.push(format!("{}: {}", sink.name(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ExportFailed {
                exporter: self.name().to_string(),
                reason: failures.join("; "),
            })
        }
    }
}

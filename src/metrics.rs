//! Prometheus collectors
//!
//! Collectors are created unregistered so components and tests can own
//! isolated instances; the binary registers them into the default registry.

use crate::error::{Error, Result};
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::time::Duration;

/// Metrics shared by the registry and the alert pipeline
#[derive(Clone)]
pub struct HubMetrics {
    /// Alerts processed, labelled by outcome (`exported` or an error kind)
    pub alerts_processed: IntCounterVec,
    /// Vendor sessions opened by the driver registry
    pub sessions_opened: IntCounter,
    /// Vendor sessions currently cached
    pub sessions_live: IntGauge,
    /// Vendor call latency by operation
    pub vendor_call_duration: HistogramVec,
}

impl HubMetrics {
    pub fn new() -> Self {
        let alerts_processed = IntCounterVec::new(
            Opts::new("alerts_processed_total", "Raw alerts processed by outcome")
                .namespace("array_manager"),
            &["outcome"],
        )
        .expect("static metric definition");
        let sessions_opened = IntCounter::with_opts(
            Opts::new("driver_sessions_opened_total", "Vendor sessions opened")
                .namespace("array_manager"),
        )
        .expect("static metric definition");
        let sessions_live = IntGauge::with_opts(
            Opts::new("driver_sessions_live", "Vendor sessions currently cached")
                .namespace("array_manager"),
        )
        .expect("static metric definition");
        let vendor_call_duration = HistogramVec::new(
            HistogramOpts::new("vendor_call_duration_seconds", "Duration of vendor calls")
                .namespace("array_manager"),
            &["operation"],
        )
        .expect("static metric definition");

        Self {
            alerts_processed,
            sessions_opened,
            sessions_live,
            vendor_call_duration,
        }
    }

    /// Register every collector into `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(self.alerts_processed.clone()),
            Box::new(self.sessions_opened.clone()),
            Box::new(self.sessions_live.clone()),
            Box::new(self.vendor_call_duration.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| Error::Internal(format!("Failed to register metrics: {}", e)))?;
        }
        Ok(())
    }

    pub(crate) fn record_alert(&self, outcome: &str) {
        self.alerts_processed.with_label_values(&[outcome]).inc();
    }

    pub(crate) fn observe_call(&self, operation: &str, elapsed: Duration) {
        self.vendor_call_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

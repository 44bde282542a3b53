//! Unified Array Manager
//!
//! Multi-vendor storage driver hub: one driver contract for every array,
//! one cached vendor session per registered array, and one canonical alert
//! model for every vendor alert format.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  REST API  ──►  Alert Normalizer ──► Exporters               │
//! │     │                 │                                      │
//! │     └──► Storage Manager                                     │
//! │                 │     │                                      │
//! │                 ▼     ▼                                      │
//! │            Driver Registry ──► Vendor Drivers ──► Arrays     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use unified_array_manager::{
    AlertNormalizer, ApiServer, ApiServerConfig, DriverCatalog, DriverRegistry, Error,
    ExporterFanout, HubConfig, HubMetrics, InMemoryMetadataStore, LoggingExporter, Result,
    StorageManager,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Unified Array Manager - multi-vendor storage driver hub
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file (registry tuning and initial storage systems)
    #[arg(long, env = "CONFIG")]
    config: Option<String>,

    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8190")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Vendor session connect timeout in milliseconds (overrides the config file)
    #[arg(long, env = "CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: Option<u64>,

    /// Vendor call timeout in milliseconds (overrides the config file)
    #[arg(long, env = "CALL_TIMEOUT_MS")]
    call_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Unified Array Manager");
    info!("  Version: {}", unified_array_manager::VERSION);
    info!("  REST API: {}", args.api_addr);

    let config = load_config(&args)?;
    info!(
        "  Registry: connect timeout {}ms, call timeout {}ms",
        config.registry.connect_timeout_ms, config.registry.call_timeout_ms
    );

    // Metrics
    let metrics = HubMetrics::new();
    metrics.register(prometheus::default_registry())?;

    // Metadata and driver registry
    let metadata = Arc::new(InMemoryMetadataStore::with_storages(config.storages.clone()));
    info!("Metadata store seeded with {} storage system(s)", metadata.len());

    let catalog = DriverCatalog::with_builtin_drivers()?;
    for key in catalog.supported() {
        info!("Driver available: {}", key);
    }

    let registry = DriverRegistry::new(config.registry.clone(), catalog, metadata, metrics.clone());
    spawn_event_logger(&registry);

    // Alert pipeline
    let exporter = ExporterFanout::new(vec![Arc::new(LoggingExporter::new())]);
    let normalizer = Arc::new(AlertNormalizer::new(
        registry.clone(),
        Arc::new(exporter),
        metrics,
    ));
    let manager = Arc::new(StorageManager::new(registry.clone()));

    let shutdown = CancellationToken::new();

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_shutdown).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_shutdown).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
        ..Default::default()
    };

    let api_server = Arc::new(ApiServer::new(api_config, manager, normalizer));

    {
        let api_server = api_server.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
            }
            shutdown.cancel();
            api_server.shutdown();
        });
    }

    info!("Starting API server");
    let result = api_server.run().await;

    shutdown.cancel();
    registry.close_all().await;

    info!("Array manager shutdown complete");
    result
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> Result<HubConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path);
            HubConfig::load(path)?
        }
        None => HubConfig::default(),
    };

    if let Some(ms) = args.connect_timeout_ms {
        config.registry.connect_timeout_ms = ms;
    }
    if let Some(ms) = args.call_timeout_ms {
        config.registry.call_timeout_ms = ms;
    }
    config.validate()?;

    Ok(config)
}

/// Log registry lifecycle events until the registry goes away
fn spawn_event_logger(registry: &DriverRegistry) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(event) if event.is_failure() => warn!("Registry event: {:?}", event),
                Ok(event) => info!("Registry event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Registry event logger skipped {} event(s)", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, shutdown: CancellationToken) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind health server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, shutdown: CancellationToken) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    match encoder.encode(&metric_families, &mut buffer) {
                        Ok(()) => {
                            let mut response = Response::new(Body::from(buffer));
                            if let Ok(value) = encoder.format_type().parse() {
                                response.headers_mut().insert("Content-Type", value);
                            }
                            response
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            text_response(StatusCode::INTERNAL_SERVER_ERROR, "encoding failed")
                        }
                    }
                }
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}

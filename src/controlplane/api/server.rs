//! API Server
//!
//! Serves the REST API for alert ingestion and storage management.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::RestRouter;
use crate::alert::AlertNormalizer;
use crate::controlplane::StorageManager;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8190)),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server with broadcast shutdown
pub struct ApiServer {
    config: ApiServerConfig,
    manager: Arc<StorageManager>,
    normalizer: Arc<AlertNormalizer>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(
        config: ApiServerConfig,
        manager: Arc<StorageManager>,
        normalizer: Arc<AlertNormalizer>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            manager,
            normalizer,
            shutdown_tx,
        }
    }

    /// Run the API server until shutdown is triggered
    pub async fn run(&self) -> Result<()> {
        info!("Starting API Server");
        info!("  REST API: {}", self.config.rest_addr);

        let rest_handle = self.spawn_rest_server();

        match rest_handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("REST server error: {}", e);
                Err(e)
            }
            Err(e) => Err(Error::Internal(format!("REST server task failed: {}", e))),
        }
    }

    /// Spawn the REST server
    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let addr = self.config.rest_addr;
        let router = RestRouter::new(self.manager.clone(), self.normalizer.clone())
            .with_max_body_size(self.config.max_body_size);
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(addr, router, shutdown_rx).await })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Run the REST API server
async fn run_rest_server(
    addr: SocketAddr,
    router: RestRouter,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = router.build();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

    info!("REST API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LoggingExporter;
    use crate::config::RegistryConfig;
    use crate::drivers::DriverCatalog;
    use crate::metadata::InMemoryMetadataStore;
    use crate::metrics::HubMetrics;
    use crate::registry::DriverRegistry;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.rest_addr.port(), 8190);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        let metrics = HubMetrics::new();
        let registry = DriverRegistry::new(
            RegistryConfig::default(),
            DriverCatalog::with_builtin_drivers().unwrap(),
            Arc::new(InMemoryMetadataStore::new()),
            metrics.clone(),
        );
        let normalizer = AlertNormalizer::new(
            registry.clone(),
            Arc::new(LoggingExporter::new()),
            metrics,
        );
        let config = ApiServerConfig {
            rest_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        };
        let server = Arc::new(ApiServer::new(
            config,
            Arc::new(StorageManager::new(registry)),
            Arc::new(normalizer),
        ));

        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}

//! REST API Handlers
//!
//! Implements the REST API endpoints for alert ingestion, storage system
//! registration and inventory queries.

use crate::alert::AlertNormalizer;
use crate::controlplane::StorageManager;
use crate::domain::alert::RawAlert;
use crate::domain::context::RequestContext;
use crate::domain::storage::{AccessInfo, RegisterInfo};
use crate::error::{Error, ErrorAction, ErrorKind};
use axum::{
    extract::{DefaultBodyLimit, Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Header carrying a caller-supplied request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Response Types
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    fn from_error(err: &Error) -> Self {
        let details = match err.action() {
            ErrorAction::RetryAfter(after) => Some(format!("retry after {}s", after.as_secs())),
            ErrorAction::RetryWithBackoff => Some("retry with backoff".to_string()),
            ErrorAction::NoRetry => None,
        };
        Self {
            error: err.kind().as_str().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnknownStorageSystem => StatusCode::NOT_FOUND,
        ErrorKind::StorageAlreadyRegistered => StatusCode::CONFLICT,
        ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::BackendUnreachable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::IncompleteVendorData
        | ErrorKind::PartialCollectionFailure
        | ErrorKind::ExportFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::UnsupportedVendor
        | ErrorKind::MissingStorageReference
        | ErrorKind::InvalidResults
        | ErrorKind::ApiValidation
        | ErrorKind::Parse => StatusCode::BAD_REQUEST,
        ErrorKind::Internal | ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }
    (status, Json(ApiErrorResponse::from_error(&err))).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: crate::Result<T>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    manager: Arc<StorageManager>,
    normalizer: Arc<AlertNormalizer>,
    max_body_size: usize,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(manager: Arc<StorageManager>, normalizer: Arc<AlertNormalizer>) -> Self {
        Self {
            manager,
            normalizer,
            max_body_size: 1024 * 1024,
        }
    }

    /// Limit request bodies to `bytes`
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            manager: self.manager,
            normalizer: self.normalizer,
        };

        Router::new()
            // Alert ingestion
            .route("/v1/alerts", post(receive_alert))
            // Storage systems
            .route("/v1/storages", get(list_storages).post(register_storage))
            .route("/v1/storages/:id", get(get_storage).delete(remove_storage))
            .route("/v1/storages/:id/access-info", put(update_access_info))
            .route("/v1/storages/:id/pools", get(list_pools))
            .route("/v1/storages/:id/volumes", get(list_volumes))
            .route("/v1/storages/:id/sync", post(sync_storage))
            .route("/v1/storages/:id/alerts/:sequence", delete(clear_alert))
            // Health endpoint
            .route("/health", get(health_check))
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    manager: Arc<StorageManager>,
    normalizer: Arc<AlertNormalizer>,
}

/// Context for one request, reusing the caller's request id when given
fn request_context(headers: &HeaderMap) -> RequestContext {
    let mut ctx = RequestContext::new();
    if let Some(id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        ctx.request_id = id.to_string();
    }
    ctx
}

// =============================================================================
// Handlers
// =============================================================================

/// Ingest one raw vendor alert
async fn receive_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(alert): Json<RawAlert>,
) -> Response {
    let ctx = request_context(&headers);
    respond(StatusCode::ACCEPTED, state.normalizer.normalize(&ctx, alert).await)
}

async fn list_storages(State(state): State<AppState>) -> Response {
    respond(StatusCode::OK, state.manager.list_storages().await)
}

async fn register_storage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(info): Json<RegisterInfo>,
) -> Response {
    let ctx = request_context(&headers);
    respond(StatusCode::CREATED, state.manager.register_storage(&ctx, info).await)
}

async fn get_storage(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(StatusCode::OK, state.manager.describe_storage(&id).await)
}

async fn remove_storage(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.manager.remove_storage(&id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_access_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(access_info): Json<AccessInfo>,
) -> Response {
    let ctx = request_context(&headers);
    respond(
        StatusCode::OK,
        state.manager.update_access_info(&ctx, &id, access_info).await,
    )
}

async fn list_pools(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let ctx = request_context(&headers);
    respond(StatusCode::OK, state.manager.list_pools(&ctx, &id).await)
}

async fn list_volumes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let ctx = request_context(&headers);
    respond(StatusCode::OK, state.manager.list_volumes(&ctx, &id).await)
}

async fn sync_storage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let ctx = request_context(&headers);
    respond(StatusCode::OK, state.manager.sync_storage(&ctx, &id).await)
}

async fn clear_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, sequence)): Path<(String, String)>,
) -> Response {
    let ctx = request_context(&headers);
    match state.manager.clear_alert(&ctx, &id, &sequence).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ChannelExporter;
    use crate::config::RegistryConfig;
    use crate::domain::storage::StorageSystemDescriptor;
    use crate::drivers::{DriverCatalog, FAKE_MODEL, FAKE_VENDOR};
    use crate::metadata::InMemoryMetadataStore;
    use crate::metrics::HubMetrics;
    use crate::registry::DriverRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn app() -> (Router, mpsc::Receiver<crate::CanonicalAlertModel>) {
        let metadata = Arc::new(InMemoryMetadataStore::with_storages(vec![StorageSystemDescriptor {
            storage_id: "abcd-1234".into(),
            name: "array1".into(),
            vendor: FAKE_VENDOR.into(),
            model: FAKE_MODEL.into(),
            serial_number: "FAKE-10.0.0.1".into(),
            description: String::new(),
            location: String::new(),
            access_info: AccessInfo::new("10.0.0.1", "user", "pass"),
        }]));
        let metrics = HubMetrics::new();
        let registry = DriverRegistry::new(
            RegistryConfig::default(),
            DriverCatalog::with_builtin_drivers().unwrap(),
            metadata,
            metrics.clone(),
        );
        let (exporter, receiver) = ChannelExporter::channel(8);
        let normalizer = AlertNormalizer::new(registry.clone(), Arc::new(exporter), metrics);
        let router = RestRouter::new(
            Arc::new(StorageManager::new(registry)),
            Arc::new(normalizer),
        )
        .build();
        (router, receiver)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::UnknownStorageSystem), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::BackendUnreachable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::PartialCollectionFailure), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::MissingStorageReference), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::StorageAlreadyRegistered), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_alert_webhook_exports() {
        let (app, mut exported) = app();
        let request = json_request(
            "POST",
            "/v1/alerts",
            serde_json::json!({
                "storage_id": "abcd-1234",
                "connUnitEventType": "topology",
                "connUnitEventSeverity": "warning",
                "connUnitEventDescr": "Diagnostic event trace triggered.",
                "asyncEventCode": 1050,
                "connUnitName": "000192601409"
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["alarm_id"], "1050");
        assert_eq!(body["severity"], "Warning");

        assert_eq!(exported.recv().await.unwrap().me_dn(), "abcd-1234");
    }

    #[tokio::test]
    async fn test_alert_without_storage_reference() {
        let (app, mut exported) = app();
        let request = json_request("POST", "/v1/alerts", serde_json::json!({"connUnitEventType": "status"}));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "missing_storage_reference");
        assert!(exported.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_storage_is_not_found() {
        let (app, _) = app();
        let request = Request::builder()
            .uri("/v1/storages/nope/pools")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_pools() {
        let (app, _) = app();
        let request = Request::builder()
            .uri("/v1/storages/abcd-1234/pools")
            .header(REQUEST_ID_HEADER, "req-test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_register_storage_hides_password() {
        let (app, _) = app();
        let request = json_request(
            "POST",
            "/v1/storages",
            serde_json::json!({
                "vendor": "fakevendor",
                "model": "fakemodel",
                "host": "10.0.0.7",
                "username": "user",
                "password": "s3cret",
                "extra_attributes": {"array_id": "00112233"}
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["serial_number"], "00112233");
        assert!(!body.to_string().contains("s3cret"));
    }

    #[test]
    fn test_request_context_uses_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "req-42".parse().unwrap());
        assert_eq!(request_context(&headers).request_id, "req-42");
        assert!(request_context(&HeaderMap::new()).request_id.starts_with("req-"));
    }
}

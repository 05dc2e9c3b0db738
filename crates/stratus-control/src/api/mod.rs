//! HTTP API for the control service.
//!
//! Provides endpoints for:
//! - Cluster lifecycle operations (provision, install, scale, uninstall, decommission)
//! - Cluster connectivity (cordon, uncordon, drain)
//! - Cluster and node queries and partial updates
//! - Health and readiness checks
//! - Prometheus metrics

mod clusters;
mod nodes;

use std::fmt::Write as _;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::cluster::ClusterManager;
use crate::error::{ControlError, ErrorKind};
use crate::monitor::OperationKind;

/// Shared application state for the control service.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle orchestrator.
    pub manager: ClusterManager,
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Long-running operations
        .route("/clusters/provision", post(clusters::provision))
        .route("/clusters/install", post(clusters::install))
        .route(
            "/organizations/{org}/clusters/{cluster}/scale",
            post(clusters::scale),
        )
        .route(
            "/organizations/{org}/clusters/{cluster}/uninstall",
            post(clusters::uninstall),
        )
        .route(
            "/organizations/{org}/clusters/{cluster}/decommission",
            post(clusters::uninstall_and_decommission),
        )
        .route(
            "/organizations/{org}/clusters/{cluster}/release",
            post(clusters::decommission),
        )
        // Connectivity
        .route(
            "/organizations/{org}/clusters/{cluster}/cordon",
            post(clusters::cordon),
        )
        .route(
            "/organizations/{org}/clusters/{cluster}/uncordon",
            post(clusters::uncordon),
        )
        .route(
            "/organizations/{org}/clusters/{cluster}/drain",
            post(clusters::drain),
        )
        // Registry
        .route("/organizations/{org}/clusters", get(clusters::list_clusters))
        .route(
            "/organizations/{org}/clusters/{cluster}",
            get(clusters::get_cluster)
                .patch(clusters::update_cluster)
                .delete(clusters::remove_cluster),
        )
        .route(
            "/organizations/{org}/clusters/{cluster}/nodes",
            get(nodes::list_nodes),
        )
        .route("/organizations/{org}/nodes/{node}", patch(nodes::update_node))
        .route("/organizations/{org}/nodes", delete(nodes::remove_nodes))
        // Metrics
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

const fn error_to_status(error: &ControlError) -> StatusCode {
    match error.kind() {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::FailedPrecondition => StatusCode::CONFLICT,
        ErrorKind::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: ControlError) -> ApiError {
    let status = error_to_status(&error);
    if status.is_server_error() {
        warn!(error = %error.debug_report(), %status, "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let supervisor = state.manager.supervisor();
    let ready = !supervisor.is_stopped();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            ready,
            active_monitors: supervisor.active(),
        }),
    )
}

/// Metrics endpoint.
async fn metrics(State(state): State<AppState>) -> String {
    let supervisor = state.manager.supervisor();
    let mut output = String::new();

    output.push_str("# HELP control_monitors_active Number of running operation monitors\n");
    output.push_str("# TYPE control_monitors_active gauge\n");
    let _ = writeln!(output, "control_monitors_active {}", supervisor.active());

    output.push_str(
        "# HELP control_operations_in_flight Number of clusters held by an operation, by kind\n",
    );
    output.push_str("# TYPE control_operations_in_flight gauge\n");
    let counts = supervisor.in_flight_by_kind();
    for kind in [
        OperationKind::Provision,
        OperationKind::Install,
        OperationKind::Scale,
        OperationKind::Uninstall,
        OperationKind::Decommission,
    ] {
        let count = counts.get(&kind).copied().unwrap_or(0);
        let _ = writeln!(
            output,
            "control_operations_in_flight{{kind=\"{kind}\"}} {count}"
        );
    }

    output
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    active_monitors: usize,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::bus::MemoryEventBus;
    use crate::cluster::Collaborators;
    use crate::config::{MonitorConfig, TimeoutConfig};
    use crate::discovery::StaticDiscovery;
    use crate::installer::MockInstaller;
    use crate::inventory::MemoryInventory;
    use crate::monitor::{MonitorSettings, MonitorSupervisor};
    use crate::provisioner::MockProvisioner;
    use crate::registry::MemoryRegistry;

    pub(crate) struct TestApp {
        pub(crate) registry: Arc<MemoryRegistry>,
        pub(crate) bus: Arc<MemoryEventBus>,
        pub(crate) inventory: Arc<MemoryInventory>,
        pub(crate) state: AppState,
    }

    pub(crate) fn make_app() -> TestApp {
        let registry = Arc::new(MemoryRegistry::new());
        let bus = Arc::new(MemoryEventBus::new());
        let inventory = Arc::new(MemoryInventory::new());
        let deps = Collaborators {
            clusters: registry.clone(),
            nodes: registry.clone(),
            installer: Arc::new(MockInstaller::new()),
            provisioner: Arc::new(MockProvisioner::new()),
            inventory: inventory.clone(),
            bus: bus.clone(),
            discovery: Arc::new(StaticDiscovery::with_nodes(&["10.0.0.1"])),
        };
        let monitor = MonitorConfig {
            poll_interval_ms: 5,
            ..MonitorConfig::default()
        };
        let manager = ClusterManager::new(
            deps,
            MonitorSupervisor::new(&monitor),
            TimeoutConfig::default(),
            MonitorSettings::from(&monitor),
        );
        TestApp {
            registry,
            bus,
            inventory,
            state: AppState { manager },
        }
    }

    pub(crate) async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = make_app();
        let (status, body) = send(&app.state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn ready_endpoint() {
        let app = make_app();
        let (status, body) = send(&app.state, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["active_monitors"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint() {
        let app = make_app();
        let response = router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("control_monitors_active 0"));
        assert!(text.contains("control_operations_in_flight{kind=\"provision\"} 0"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            error_to_status(&ControlError::invalid("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_to_status(&ControlError::NotFound("x".to_owned())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_to_status(&ControlError::precondition("x")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_to_status(&ControlError::Unimplemented("x")),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            error_to_status(&ControlError::bus("down")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_to_status(&ControlError::Timeout {
                operation: "x",
                after: std::time::Duration::from_secs(1),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            error_to_status(&ControlError::internal("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

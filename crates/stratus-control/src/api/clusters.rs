//! Cluster lifecycle and registry endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::operation::{OperationResponse, ProvisionResponse};
use crate::registry::UpdateClusterRequest;
use crate::requests::{
    ClusterRef, DecommissionClusterRequest, InstallRequest, ProvisionClusterRequest,
    ScaleClusterRequest, UninstallClusterRequest,
};
use crate::types::{ClusterId, ClusterRecord, OrganizationId};

use super::{api_error, ApiError, AppState};

type Accepted<T> = Result<(StatusCode, Json<T>), ApiError>;

fn accepted<T>(response: T) -> (StatusCode, Json<T>) {
    (StatusCode::ACCEPTED, Json(response))
}

/// Provision infrastructure for a new cluster and install the platform.
pub async fn provision(
    State(state): State<AppState>,
    Json(request): Json<ProvisionClusterRequest>,
) -> Accepted<ProvisionResponse> {
    info!(
        organization_id = %request.organization_id,
        cluster_name = %request.cluster_name,
        "provisioning cluster via API"
    );
    state
        .manager
        .provision_and_install(request)
        .await
        .map(accepted)
        .map_err(api_error)
}

/// Install the platform on an existing or discovered cluster.
pub async fn install(
    State(state): State<AppState>,
    Json(request): Json<InstallRequest>,
) -> Accepted<OperationResponse> {
    state
        .manager
        .install_cluster(request)
        .await
        .map(accepted)
        .map_err(api_error)
}

/// Change the node count of a cluster.
pub async fn scale(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
    Json(mut request): Json<ScaleClusterRequest>,
) -> Accepted<OperationResponse> {
    request.organization_id = org;
    request.cluster_id = cluster;
    state
        .manager
        .scale(request)
        .await
        .map(accepted)
        .map_err(api_error)
}

/// Remove the platform from a cluster.
pub async fn uninstall(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
    Json(mut request): Json<UninstallClusterRequest>,
) -> Accepted<OperationResponse> {
    request.organization_id = org;
    request.cluster_id = cluster;
    state
        .manager
        .uninstall_cluster(request)
        .await
        .map(accepted)
        .map_err(api_error)
}

/// Remove the platform, then release the infrastructure.
pub async fn uninstall_and_decommission(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
    Json(mut request): Json<DecommissionClusterRequest>,
) -> Accepted<OperationResponse> {
    request.organization_id = org;
    request.cluster_id = cluster;
    state
        .manager
        .uninstall_and_decommission(request)
        .await
        .map(accepted)
        .map_err(api_error)
}

/// Release the infrastructure only.
pub async fn decommission(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
    Json(mut request): Json<DecommissionClusterRequest>,
) -> Accepted<OperationResponse> {
    request.organization_id = org;
    request.cluster_id = cluster;
    state
        .manager
        .decommission(request)
        .await
        .map(accepted)
        .map_err(api_error)
}

/// Close a cluster to new workloads.
pub async fn cordon(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
) -> Result<Json<ClusterRecord>, ApiError> {
    state
        .manager
        .cordon(&ClusterRef::new(org, cluster))
        .await
        .map(Json)
        .map_err(api_error)
}

/// Reopen a cluster to new workloads.
pub async fn uncordon(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
) -> Result<Json<ClusterRecord>, ApiError> {
    state
        .manager
        .uncordon(&ClusterRef::new(org, cluster))
        .await
        .map(Json)
        .map_err(api_error)
}

/// Ask the scheduler to move workloads off a cordoned cluster.
pub async fn drain(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .drain(&ClusterRef::new(org, cluster))
        .await
        .map(|()| StatusCode::ACCEPTED)
        .map_err(api_error)
}

/// List the clusters of an organization.
pub async fn list_clusters(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
) -> Result<Json<Vec<ClusterRecord>>, ApiError> {
    state
        .manager
        .list_clusters(&org)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Get a cluster.
pub async fn get_cluster(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
) -> Result<Json<ClusterRecord>, ApiError> {
    state
        .manager
        .get_cluster(&ClusterRef::new(org, cluster))
        .await
        .map(Json)
        .map_err(api_error)
}

/// Apply a partial update to a cluster.
pub async fn update_cluster(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
    Json(mut request): Json<UpdateClusterRequest>,
) -> Result<Json<ClusterRecord>, ApiError> {
    request.organization_id = org;
    request.cluster_id = cluster;
    state
        .manager
        .update_cluster(&request)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Reserved; clusters are removed by decommissioning them.
pub async fn remove_cluster(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .remove_cluster(&ClusterRef::new(org, cluster))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::tests::{make_app, send};
    use crate::bus::InfrastructureOp;
    use crate::registry::{AddClusterRequest, ClusterRegistry, MemoryRegistry};
    use crate::requests::ClusterRef;
    use crate::types::{
        ClusterId, ClusterRecord, ClusterState, ClusterStatus, OrganizationId, RequestId,
    };

    async fn add_cluster(registry: &MemoryRegistry, state: ClusterState) -> ClusterRecord {
        registry
            .add_cluster(&AddClusterRequest {
                request_id: RequestId::generate(),
                organization_id: OrganizationId::new("org-1"),
                name: "edge".to_owned(),
                state: Some(state),
                ..AddClusterRequest::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn provision_is_accepted() {
        let app = make_app();
        let (status, body) = send(
            &app.state,
            "POST",
            "/clusters/provision",
            Some(json!({
                "organization_id": "org-1",
                "cluster_name": "edge",
                "kubernetes_version": "1.30",
                "num_nodes": 3,
                "node_type": "standard-4",
                "target_platform": "BARE_METAL",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(!body["request_id"].as_str().unwrap().is_empty());
        assert_eq!(app.registry.cluster_count().unwrap(), 1);
        app.state.manager.supervisor().wait_idle().await;
    }

    #[tokio::test]
    async fn provision_with_request_id_is_rejected() {
        let app = make_app();
        let (status, body) = send(
            &app.state,
            "POST",
            "/clusters/provision",
            Some(json!({
                "request_id": "caller-chosen",
                "organization_id": "org-1",
                "cluster_name": "edge",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("request_id"));
        assert_eq!(app.registry.cluster_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn get_missing_cluster_is_not_found() {
        let app = make_app();
        let (status, _) = send(
            &app.state,
            "GET",
            "/organizations/org-1/clusters/missing",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cordon_and_drain() {
        let app = make_app();
        let record = add_cluster(&app.registry, ClusterState::Installed).await;
        app.registry
            .set_status(
                &ClusterRef::new(record.organization_id.clone(), record.cluster_id.clone()),
                ClusterStatus::Online,
            )
            .unwrap();
        let base = format!("/organizations/org-1/clusters/{}", record.cluster_id);

        let (status, _) = send(&app.state, "POST", &format!("{base}/drain"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app.state, "POST", &format!("{base}/cordon"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ONLINE_CORDON");

        let (status, _) = send(&app.state, "POST", &format!("{base}/drain"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            app.bus.ops().unwrap(),
            vec![InfrastructureOp::DrainCluster(ClusterRef::new(
                OrganizationId::new("org-1"),
                record.cluster_id.clone(),
            ))]
        );
    }

    #[tokio::test]
    async fn drain_publish_failure_is_bad_gateway() {
        let app = make_app();
        let record = add_cluster(&app.registry, ClusterState::Installed).await;
        let target = ClusterRef::new(record.organization_id.clone(), record.cluster_id.clone());
        app.registry
            .set_status(&target, ClusterStatus::OnlineCordon)
            .unwrap();
        app.bus.set_failing(true).unwrap();

        let (status, _) = send(
            &app.state,
            "POST",
            &format!("/organizations/org-1/clusters/{}/drain", record.cluster_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn uninstall_with_deployed_apps_conflicts() {
        let app = make_app();
        let record = add_cluster(&app.registry, ClusterState::Installed).await;
        let target = ClusterRef::new(record.organization_id.clone(), record.cluster_id.clone());
        app.registry
            .set_status(&target, ClusterStatus::OnlineCordon)
            .unwrap();
        app.inventory
            .deploy(&target.organization_id, &target.cluster_id)
            .unwrap();

        let (status, body) = send(
            &app.state,
            "POST",
            &format!("/organizations/org-1/clusters/{}/uninstall", record.cluster_id),
            Some(json!({ "kube_config_raw": "apiVersion: v1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("deployed applications"));
        assert_eq!(
            app.registry
                .state_history(&record.cluster_id)
                .unwrap()
                .last()
                .copied(),
            Some(ClusterState::Installed)
        );
    }

    #[tokio::test]
    async fn update_cluster_labels() {
        let app = make_app();
        let record = add_cluster(&app.registry, ClusterState::Installed).await;
        let (status, body) = send(
            &app.state,
            "PATCH",
            &format!("/organizations/org-1/clusters/{}", record.cluster_id),
            Some(json!({
                "add_labels": true,
                "labels": { "region": "eu-west" },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["labels"]["region"], "eu-west");
    }

    #[tokio::test]
    async fn update_cluster_state_is_rejected() {
        let app = make_app();
        let record = add_cluster(&app.registry, ClusterState::Installed).await;
        let (status, _) = send(
            &app.state,
            "PATCH",
            &format!("/organizations/org-1/clusters/{}", record.cluster_id),
            Some(json!({ "state": "FAILURE" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remove_cluster_is_not_implemented() {
        let app = make_app();
        let (status, _) = send(
            &app.state,
            "DELETE",
            &format!("/organizations/org-1/clusters/{}", ClusterId::new("c1")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }
}

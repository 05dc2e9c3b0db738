//! Node endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::registry::{RemoveNodesRequest, UpdateNodeRequest};
use crate::requests::ClusterRef;
use crate::types::{ClusterId, NodeId, NodeRecord, OrganizationId};

use super::{api_error, ApiError, AppState};

/// List the nodes attached to a cluster.
pub async fn list_nodes(
    State(state): State<AppState>,
    Path((org, cluster)): Path<(OrganizationId, ClusterId)>,
) -> Result<Json<Vec<NodeRecord>>, ApiError> {
    state
        .manager
        .list_nodes(&ClusterRef::new(org, cluster))
        .await
        .map(Json)
        .map_err(api_error)
}

/// Apply a partial update to a node.
pub async fn update_node(
    State(state): State<AppState>,
    Path((org, node)): Path<(OrganizationId, NodeId)>,
    Json(mut request): Json<UpdateNodeRequest>,
) -> Result<Json<NodeRecord>, ApiError> {
    request.organization_id = org;
    request.node_id = node;
    state
        .manager
        .update_node(&request)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Reserved; nodes are removed with their cluster.
pub async fn remove_nodes(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    Json(mut request): Json<RemoveNodesRequest>,
) -> Result<StatusCode, ApiError> {
    request.organization_id = org;
    state
        .manager
        .remove_nodes(&request)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

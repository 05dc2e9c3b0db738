//! Integration tests for removing the platform from clusters.

mod common;

use common::{fixtures, fixtures::ClusterBuilder, TestControlPlane};
use stratus_control::operation::OperationProgress;
use stratus_control::registry::NodeRegistry;
use stratus_control::requests::UninstallClusterRequest;
use stratus_control::types::{ClusterState, ClusterStatus, NodeState};
use stratus_control::{ControlError, ErrorKind};

#[tokio::test]
async fn uninstall_returns_cluster_to_provisioned() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .with_node("10.2.0.1")
        .create(&plane.registry)
        .await;

    let started = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![
            ClusterState::Installed,
            ClusterState::Uninstalling,
            ClusterState::Provisioned,
        ]
    );
    let uninstalls = plane.installer.uninstalls().unwrap();
    assert_eq!(uninstalls.len(), 1);
    assert_eq!(uninstalls[0].request_id.as_ref(), Some(&started.request_id));

    let nodes = plane.registry.list_nodes(&cluster).await.unwrap();
    assert_eq!(nodes[0].state, NodeState::Assigned);
    assert!(plane.provisioner.decommissions().unwrap().is_empty());
}

#[tokio::test]
async fn uninstall_requires_cordon() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .create(&plane.registry)
        .await;

    let err = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(err.to_string().contains("cordoned"));
    assert!(plane.installer.uninstalls().unwrap().is_empty());
    assert!(!plane.manager.supervisor().is_in_flight(&cluster.cluster_id));
}

#[tokio::test]
async fn offline_cluster_cannot_be_uninstalled() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .with_status(ClusterStatus::OfflineCordon)
        .create(&plane.registry)
        .await;

    let err = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![ClusterState::Installed]
    );
}

#[tokio::test]
async fn deployed_applications_block_uninstall() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;
    plane
        .inventory
        .deploy(&cluster.organization_id, &cluster.cluster_id)
        .unwrap();

    let err = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(err.to_string().contains("deployed applications"));
    assert!(plane.installer.uninstalls().unwrap().is_empty());
}

#[tokio::test]
async fn applications_elsewhere_do_not_block_uninstall() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;
    plane
        .inventory
        .deploy(
            &cluster.organization_id,
            &stratus_control::types::ClusterId::new("another"),
        )
        .unwrap();

    plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;
    assert_eq!(
        plane.history(&cluster.cluster_id).last().copied(),
        Some(ClusterState::Provisioned)
    );
}

#[tokio::test]
async fn unavailable_inventory_blocks_uninstall() {
    let plane = TestControlPlane::new();
    plane.inventory.set_unavailable(true).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;

    let err = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(plane.installer.uninstalls().unwrap().is_empty());
}

#[tokio::test]
async fn failed_uninstall_marks_cluster_and_nodes() {
    let plane = TestControlPlane::new();
    plane.installer.set_outcome(OperationProgress::Failed).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .with_node("10.2.0.1")
        .create(&plane.registry)
        .await;

    plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(
        plane.history(&cluster.cluster_id).last().copied(),
        Some(ClusterState::Failure)
    );
    let nodes = plane.registry.list_nodes(&cluster).await.unwrap();
    assert_eq!(nodes[0].state, NodeState::Failure);
}

#[tokio::test]
async fn rejected_uninstall_marks_failure() {
    let plane = TestControlPlane::new();
    plane.installer.reject_calls(true).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;

    let err = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![
            ClusterState::Installed,
            ClusterState::Uninstalling,
            ClusterState::Failure,
        ]
    );
}

#[tokio::test]
async fn failed_cluster_can_be_uninstalled() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Failure)
        .cordoned()
        .create(&plane.registry)
        .await;

    plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![
            ClusterState::Failure,
            ClusterState::Uninstalling,
            ClusterState::Provisioned,
        ]
    );
}

#[tokio::test]
async fn uninstall_needs_kubeconfig() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;
    let request = UninstallClusterRequest {
        kube_config_raw: String::new(),
        ..fixtures::uninstall_request(&cluster)
    };

    let err = plane.manager.uninstall_cluster(request).await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidArgument(_)));
}

#[tokio::test]
async fn caller_request_id_is_rejected() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;
    let request = UninstallClusterRequest {
        request_id: Some(stratus_control::types::RequestId::new("mine")),
        ..fixtures::uninstall_request(&cluster)
    };

    let err = plane.manager.uninstall_cluster(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(plane.installer.uninstalls().unwrap().is_empty());
    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![ClusterState::Installed]
    );
}

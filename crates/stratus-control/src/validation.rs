//! Structural request checks.
//!
//! These run before any remote call. They check field presence and shape
//! only; lifecycle preconditions are checked by the orchestrator against the
//! registry.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ControlError, ControlResult};
use crate::registry::{RemoveNodesRequest, UpdateClusterRequest, UpdateNodeRequest};
use crate::requests::{
    ClusterRef, DecommissionClusterRequest, InstallRequest, ProvisionClusterRequest,
    ScaleClusterRequest, UninstallClusterRequest,
};
use crate::types::{AzureCredentials, AzureOptions, Labels, OrganizationId, Platform};

/// Maximum length of a Kubernetes label value.
pub const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Kubernetes label-value grammar.
static LABEL_VALUE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").ok()
});

const EMPTY_ORGANIZATION_ID: &str = "organization_id cannot be empty";
const EMPTY_CLUSTER_ID: &str = "cluster_id cannot be empty";
const REQUEST_ID_ASSIGNED: &str = "request_id is assigned by the control plane";

fn organization(organization_id: &OrganizationId) -> ControlResult<()> {
    if organization_id.is_empty() {
        return Err(ControlError::invalid(EMPTY_ORGANIZATION_ID));
    }
    Ok(())
}

fn no_request_id<T>(request_id: Option<&T>) -> ControlResult<()> {
    if request_id.is_some() {
        return Err(ControlError::invalid(REQUEST_ID_ASSIGNED));
    }
    Ok(())
}

/// Validate a cluster reference.
pub fn validate_cluster_ref(cluster: &ClusterRef) -> ControlResult<()> {
    organization(&cluster.organization_id)?;
    if cluster.cluster_id.is_empty() {
        return Err(ControlError::invalid(EMPTY_CLUSTER_ID));
    }
    Ok(())
}

/// Validate an organization identifier.
pub fn validate_organization(organization_id: &OrganizationId) -> ControlResult<()> {
    organization(organization_id)
}

/// Validate a provisioning request.
pub fn validate_provision(request: &ProvisionClusterRequest) -> ControlResult<()> {
    no_request_id(request.request_id.as_ref())?;
    if request.cluster_id.is_some() {
        return Err(ControlError::invalid(
            "cluster_id is assigned by the registry when provisioning",
        ));
    }
    if request.is_management_cluster {
        return Err(ControlError::invalid(
            "only application clusters can be provisioned",
        ));
    }
    organization(&request.organization_id)?;
    if request.num_nodes == 0 {
        return Err(ControlError::invalid("num_nodes must be positive"));
    }
    if request.node_type.is_empty() {
        return Err(ControlError::invalid("node_type must be set"));
    }
    if request.target_platform.requires_azure() {
        if request.azure_credentials.is_none() {
            return Err(ControlError::invalid(
                "azure_credentials must be set when the platform is Azure",
            ));
        }
        if request.azure_options.is_none() {
            return Err(ControlError::invalid(
                "azure_options must be set when the platform is Azure",
            ));
        }
    }
    Ok(())
}

/// Validate an install request.
///
/// Exactly one authentication method is accepted: a raw kubeconfig, or a
/// username with a private key and at least one node address.
pub fn validate_install(request: &InstallRequest) -> ControlResult<()> {
    organization(&request.organization_id)?;
    no_request_id(request.request_id.as_ref())?;

    let username = request.username.as_deref().unwrap_or_default();
    let private_key = request.private_key.as_deref().unwrap_or_default();
    let mut authenticated = false;

    if !username.is_empty() {
        if private_key.is_empty() {
            return Err(ControlError::invalid("expecting private_key with username"));
        }
        if request.nodes.is_empty() {
            return Err(ControlError::invalid("expecting nodes with username"));
        }
        authenticated = true;
    }
    if request.uses_kube_config() {
        if !username.is_empty() {
            return Err(ControlError::invalid(
                "expecting kube_config_raw without username",
            ));
        }
        if !private_key.is_empty() {
            return Err(ControlError::invalid(
                "expecting kube_config_raw without private_key",
            ));
        }
        if !request.nodes.is_empty() {
            return Err(ControlError::invalid("expecting kube_config_raw without nodes"));
        }
        authenticated = true;
    }
    if !authenticated {
        return Err(ControlError::invalid(
            "expecting kube_config_raw, or username, private_key and nodes",
        ));
    }
    Ok(())
}

fn azure_resources(
    platform: Platform,
    credentials: Option<&AzureCredentials>,
    options: Option<&AzureOptions>,
) -> ControlResult<()> {
    if !platform.requires_azure() {
        return Ok(());
    }
    if credentials.is_none() {
        return Err(ControlError::invalid("azure_credentials cannot be empty"));
    }
    if options.map_or(true, |o| o.resource_group.is_empty()) {
        return Err(ControlError::invalid(
            "azure_options.resource_group cannot be empty",
        ));
    }
    Ok(())
}

/// Validate a scale request.
pub fn validate_scale(request: &ScaleClusterRequest) -> ControlResult<()> {
    no_request_id(request.request_id.as_ref())?;
    validate_cluster_ref(&ClusterRef::new(
        request.organization_id.clone(),
        request.cluster_id.clone(),
    ))?;
    if request.is_management_cluster {
        return Err(ControlError::invalid("only application clusters can be scaled"));
    }
    azure_resources(
        request.target_platform,
        request.azure_credentials.as_ref(),
        request.azure_options.as_ref(),
    )
}

/// Validate an uninstall request.
pub fn validate_uninstall(request: &UninstallClusterRequest) -> ControlResult<()> {
    no_request_id(request.request_id.as_ref())?;
    validate_cluster_ref(&ClusterRef::new(
        request.organization_id.clone(),
        request.cluster_id.clone(),
    ))?;
    if request.kube_config_raw.is_empty() {
        return Err(ControlError::invalid("kube_config_raw cannot be empty"));
    }
    Ok(())
}

/// Validate a decommission request.
pub fn validate_decommission(request: &DecommissionClusterRequest) -> ControlResult<()> {
    no_request_id(request.request_id.as_ref())?;
    validate_cluster_ref(&ClusterRef::new(
        request.organization_id.clone(),
        request.cluster_id.clone(),
    ))?;
    if request.is_management_cluster {
        return Err(ControlError::invalid(
            "only application clusters can be decommissioned",
        ));
    }
    azure_resources(
        request.target_platform,
        request.azure_credentials.as_ref(),
        request.azure_options.as_ref(),
    )
}

/// Validate a cluster update.
///
/// Empty values are accepted; callers may want a field cleared.
pub fn validate_update_cluster(request: &UpdateClusterRequest) -> ControlResult<()> {
    validate_cluster_ref(&ClusterRef::new(
        request.organization_id.clone(),
        request.cluster_id.clone(),
    ))?;
    if request.state.is_some() {
        return Err(ControlError::invalid(
            "cluster state is managed by the control plane",
        ));
    }
    if request.add_labels {
        validate_labels(&request.labels)?;
    }
    Ok(())
}

/// Validate a node update.
pub fn validate_update_node(request: &UpdateNodeRequest) -> ControlResult<()> {
    organization(&request.organization_id)?;
    if request.node_id.is_empty() {
        return Err(ControlError::invalid("node_id cannot be empty"));
    }
    if request.state.is_some() {
        return Err(ControlError::invalid(
            "node state is managed by the control plane",
        ));
    }
    if request.add_labels {
        validate_labels(&request.labels)?;
    }
    Ok(())
}

/// Validate a node removal.
pub fn validate_remove_nodes(request: &RemoveNodesRequest) -> ControlResult<()> {
    organization(&request.organization_id)?;
    if request.nodes.is_empty() {
        return Err(ControlError::invalid("nodes must not be empty"));
    }
    Ok(())
}

/// Validate label values against the Kubernetes label-value grammar.
pub fn validate_labels(labels: &Labels) -> ControlResult<()> {
    let Some(pattern) = LABEL_VALUE_PATTERN.as_ref() else {
        return Err(ControlError::internal("label validation unavailable"));
    };
    for (key, value) in labels {
        if value.len() > MAX_LABEL_VALUE_LENGTH {
            return Err(ControlError::invalid(format!(
                "label {key}: value must be no more than {MAX_LABEL_VALUE_LENGTH} characters"
            )));
        }
        if !pattern.is_match(value) {
            return Err(ControlError::invalid(format!(
                "label {key}: value must consist of alphanumeric characters, '-', '_' or '.', \
                 and must start and end with an alphanumeric character"
            )));
        }
    }
    Ok(())
}

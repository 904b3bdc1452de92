//! Kubernetes helpers for the Cluster API kinds the affinity controller reads
//!
//! Member objects (KubeadmControlPlane, MachineDeployment) and the objects
//! used to route events to them are handled as `DynamicObject`s; their
//! `ApiResource`s are built from fixed apiVersion/kind pairs.

use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde_json::Value;

/// Trait for Cluster API types with a compile-time known apiVersion/kind
pub trait HasApiResource {
    /// Full API version (e.g., "cluster.x-k8s.io/v1beta1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "MachineDeployment")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Marker for `KubeadmControlPlane`
pub struct KubeadmControlPlane;

impl HasApiResource for KubeadmControlPlane {
    const API_VERSION: &'static str = "controlplane.cluster.x-k8s.io/v1beta1";
    const KIND: &'static str = "KubeadmControlPlane";
}

/// Marker for `MachineDeployment`
pub struct MachineDeployment;

impl HasApiResource for MachineDeployment {
    const API_VERSION: &'static str = "cluster.x-k8s.io/v1beta1";
    const KIND: &'static str = "MachineDeployment";
}

/// Marker for the Cluster API `Cluster`
pub struct CapiCluster;

impl HasApiResource for CapiCluster {
    const API_VERSION: &'static str = "cluster.x-k8s.io/v1beta1";
    const KIND: &'static str = "Cluster";
}

/// Marker for `VSphereMachineTemplate`
pub struct VSphereMachineTemplate;

impl HasApiResource for VSphereMachineTemplate {
    const API_VERSION: &'static str = "infrastructure.cluster.x-k8s.io/v1beta1";
    const KIND: &'static str = "VSphereMachineTemplate";
}

/// Build an ApiResource from an apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Group portion of an apiVersion string ("" for the core group)
pub fn api_group(api_version: &str) -> &str {
    api_version.split_once('/').map(|(g, _)| g).unwrap_or("")
}

/// Walk a JSON path inside a value
pub fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// Whether the object carries a deletion timestamp
pub fn is_deleting(obj: &DynamicObject) -> bool {
    obj.metadata.deletion_timestamp.is_some()
}

//! VSphereCluster CRD (Cluster API Provider vSphere infrastructure cluster)
//!
//! The VSphereCluster is the aggregate root for cluster-module membership:
//! `spec.clusterModules` records which control plane / machine deployment
//! owns which vCenter cluster module.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ApiEndpoint, ClusterModule, Condition, IdentityRef};
use crate::CLUSTER_NAME_LABEL;

/// Condition reporting whether cluster modules are in place for all targets
pub const CLUSTER_MODULES_AVAILABLE_CONDITION: &str = "ClusterModulesAvailable";

/// Reason used when at least one cluster module operation failed
pub const CLUSTER_MODULE_SETUP_FAILED_REASON: &str = "ClusterModuleSetupFailed";

/// VSphereCluster spec, limited to the fields the affinity controller uses.
///
/// Example:
/// ```yaml
/// apiVersion: infrastructure.cluster.x-k8s.io/v1beta1
/// kind: VSphereCluster
/// metadata:
///   name: prod
///   namespace: default
///   labels:
///     cluster.x-k8s.io/cluster-name: prod
/// spec:
///   server: vcenter.example.com
///   thumbprint: "AB:CD:..."
///   clusterModules:
///     - controlPlane: true
///       targetObjectName: prod-control-plane
///       moduleUUID: 52a4...
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "VSphereCluster",
    namespaced,
    status = "VSphereClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterSpec {
    /// vCenter server address
    #[serde(default)]
    pub server: String,

    /// SHA-1 thumbprint of the vCenter certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,

    /// Identity used to authenticate against vCenter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<IdentityRef>,

    /// Workload cluster API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Cluster modules created for the cluster's control plane and machine deployments
    #[serde(default)]
    pub cluster_modules: Vec<ClusterModule>,
}

/// VSphereCluster status, limited to the fields the affinity controller uses
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterStatus {
    /// Whether the infrastructure is ready
    #[serde(default)]
    pub ready: bool,

    /// Cluster API conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl VSphereClusterStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Set a condition, keeping the previous transition time when nothing changed
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter()
            .position(|c| c.type_ == condition.type_)
        {
            Some(i) => {
                if !self.conditions[i].same_state(&condition) {
                    self.conditions[i] = condition;
                }
            }
            None => self.conditions.push(condition),
        }
    }
}

impl VSphereCluster {
    /// `namespace/name` used in logs and error context
    pub fn namespaced_name(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Value of the Cluster API cluster-name label, if present
    pub fn cluster_label(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(CLUSTER_NAME_LABEL))
            .map(String::as_str)
    }

    /// Whether the given finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// Add a finalizer. Returns true if it was not already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers_mut().push(finalizer.to_string());
        true
    }

    /// Remove a finalizer. Returns true if it was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers().len();
        self.finalizers_mut().retain(|f| f != finalizer);
        before != self.finalizers().len()
    }

    /// Mutable status, created on first access
    pub fn status_mut(&mut self) -> &mut VSphereClusterStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ConditionSeverity, ConditionStatus};
    use crate::CLUSTER_AFFINITY_FINALIZER;
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn sample_cluster() -> VSphereCluster {
        let mut cluster = VSphereCluster::new(
            "prod",
            VSphereClusterSpec {
                server: "vcenter.example.com".to_string(),
                ..Default::default()
            },
        );
        cluster.metadata = ObjectMeta {
            name: Some("prod".to_string()),
            namespace: Some("default".to_string()),
            labels: Some(BTreeMap::from([(
                CLUSTER_NAME_LABEL.to_string(),
                "prod-capi".to_string(),
            )])),
            ..Default::default()
        };
        cluster
    }

    #[test]
    fn deserializes_capv_object_and_ignores_unknown_fields() {
        let json = serde_json::json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
            "kind": "VSphereCluster",
            "metadata": {"name": "prod", "namespace": "default"},
            "spec": {
                "server": "vcenter.example.com",
                "thumbprint": "AB:CD",
                "identityRef": {"kind": "Secret", "name": "creds"},
                "failureDomainSelector": {},
                "clusterModules": [
                    {"controlPlane": true, "targetObjectName": "kcp", "moduleUUID": "uuid-1"}
                ]
            },
            "status": {"ready": true, "vCenterVersion": "8.0"}
        });

        let cluster: VSphereCluster = serde_json::from_value(json).unwrap();
        assert_eq!(cluster.spec.server, "vcenter.example.com");
        assert_eq!(cluster.spec.cluster_modules.len(), 1);
        assert_eq!(cluster.spec.cluster_modules[0].module_uuid, "uuid-1");
        assert!(cluster.status.unwrap().ready);
    }

    #[test]
    fn cluster_label_and_namespaced_name() {
        let cluster = sample_cluster();
        assert_eq!(cluster.cluster_label(), Some("prod-capi"));
        assert_eq!(cluster.namespaced_name(), "default/prod");

        let mut unlabeled = cluster.clone();
        unlabeled.metadata.labels = None;
        assert_eq!(unlabeled.cluster_label(), None);
    }

    #[test]
    fn finalizer_add_and_remove_are_idempotent() {
        let mut cluster = sample_cluster();
        assert!(!cluster.has_finalizer(CLUSTER_AFFINITY_FINALIZER));

        assert!(cluster.add_finalizer(CLUSTER_AFFINITY_FINALIZER));
        assert!(!cluster.add_finalizer(CLUSTER_AFFINITY_FINALIZER));
        assert_eq!(cluster.finalizers().len(), 1);

        assert!(cluster.remove_finalizer(CLUSTER_AFFINITY_FINALIZER));
        assert!(!cluster.remove_finalizer(CLUSTER_AFFINITY_FINALIZER));
        assert!(cluster.finalizers().is_empty());
    }

    #[test]
    fn set_condition_keeps_transition_time_when_unchanged() {
        let mut status = VSphereClusterStatus::default();
        let first = Condition::true_(CLUSTER_MODULES_AVAILABLE_CONDITION);
        let first_time = first.last_transition_time;
        status.set_condition(first);

        let mut again = Condition::true_(CLUSTER_MODULES_AVAILABLE_CONDITION);
        again.last_transition_time = first_time + chrono::Duration::seconds(30);
        status.set_condition(again);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(
            status
                .condition(CLUSTER_MODULES_AVAILABLE_CONDITION)
                .unwrap()
                .last_transition_time,
            first_time
        );

        status.set_condition(Condition::false_(
            CLUSTER_MODULES_AVAILABLE_CONDITION,
            CLUSTER_MODULE_SETUP_FAILED_REASON,
            ConditionSeverity::Warning,
            "boom",
        ));
        let cond = status.condition(CLUSTER_MODULES_AVAILABLE_CONDITION).unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason.as_deref(), Some(CLUSTER_MODULE_SETUP_FAILED_REASON));
    }
}

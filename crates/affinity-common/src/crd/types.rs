//! Shared types used by the VSphereCluster resource

use chrono::{DateTime, SubsecRound, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One persisted cluster-module membership record
///
/// Stored in `VSphereCluster.spec.clusterModules`. `module_uuid` is empty
/// until the module has been created on vCenter.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModule {
    /// Whether the target object is the cluster's control plane
    pub control_plane: bool,

    /// Name of the KubeadmControlPlane or MachineDeployment
    pub target_object_name: String,

    /// UUID of the cluster module on vCenter
    #[serde(rename = "moduleUUID", default)]
    pub module_uuid: String,
}

impl ClusterModule {
    /// Create a record for a target that has no module yet
    pub fn pending(control_plane: bool, target_object_name: impl Into<String>) -> Self {
        Self {
            control_plane,
            target_object_name: target_object_name.into(),
            module_uuid: String::new(),
        }
    }

    /// Return this record with the given module UUID
    pub fn with_uuid(mut self, module_uuid: impl Into<String>) -> Self {
        self.module_uuid = module_uuid.into();
        self
    }
}

/// Reference to the identity used to authenticate against vCenter
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct IdentityRef {
    /// Kind of the identity (VSphereClusterIdentity or Secret)
    pub kind: String,
    /// Name of the identity object
    pub name: String,
}

/// Control plane endpoint of the workload cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ApiEndpoint {
    /// Hostname or IP address
    #[serde(default)]
    pub host: String,
    /// Port
    #[serde(default)]
    pub port: i32,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Severity of a false condition (Cluster API convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionSeverity {
    /// Something is broken and needs attention
    Error,
    /// Something is not right but may resolve on its own
    Warning,
    /// Informational only
    Info,
}

/// Cluster API style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., ClusterModulesAvailable)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Severity, only set when status is False
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a True condition with the current timestamp
    pub fn true_(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::True,
            severity: None,
            reason: None,
            message: None,
            last_transition_time: Utc::now().trunc_subsecs(0),
        }
    }

    /// Create a False condition with the current timestamp
    pub fn false_(
        type_: impl Into<String>,
        reason: impl Into<String>,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::False,
            severity: Some(severity),
            reason: Some(reason.into()),
            message: Some(message.into()),
            last_transition_time: Utc::now().trunc_subsecs(0),
        }
    }

    /// Whether two conditions differ in anything but their transition time
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.severity == other.severity
            && self.reason == other.reason
            && self.message == other.message
    }
}

//! Custom Resource Definitions consumed by the affinity controller
//!
//! The controller does not own these CRDs; the types mirror only the fields
//! it reads or writes.

mod types;
mod vsphere_cluster;

pub use types::{
    ApiEndpoint, ClusterModule, Condition, ConditionSeverity, ConditionStatus, IdentityRef,
};
pub use vsphere_cluster::{
    VSphereCluster, VSphereClusterSpec, VSphereClusterStatus, CLUSTER_MODULES_AVAILABLE_CONDITION,
    CLUSTER_MODULE_SETUP_FAILED_REASON,
};

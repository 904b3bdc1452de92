//! Common types for the cluster-module affinity controller: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Label carried by every Cluster API object that belongs to a cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Finalizer held on a VSphereCluster while it still owns cluster modules
pub const CLUSTER_AFFINITY_FINALIZER: &str =
    "vspherecluster/affinity.infrastructure.cluster.x-k8s.io";

/// Field manager used for patches issued by the affinity controller
pub const FIELD_MANAGER: &str = "affinity-controller";

/// Fixed backoff (seconds) before retrying a pass whose desired state could not be loaded
pub const DESIRED_STATE_REQUEUE_SECS: u64 = 10;

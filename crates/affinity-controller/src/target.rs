//! Uniform view over the two kinds of cluster-module targets
//!
//! A target is either the cluster's `KubeadmControlPlane` or one of its
//! `MachineDeployment`s. Both are handled as `DynamicObject` snapshots.

use std::sync::Arc;

use kube::api::DynamicObject;
use kube::ResourceExt;

use affinity_common::crd::ClusterModule;
use affinity_common::kube_utils::value_at;

use crate::client::ObjectKind;

const CONTROL_PLANE_TEMPLATE_REF: &[&str] = &["spec", "machineTemplate", "infrastructureRef"];
const WORKER_POOL_TEMPLATE_REF: &[&str] = &["spec", "template", "spec", "infrastructureRef"];

/// Reference from a target to its infrastructure machine template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfrastructureRef {
    /// apiVersion of the referenced template
    pub api_version: String,
    /// Kind of the referenced template
    pub kind: String,
    /// Name of the referenced template
    pub name: String,
}

/// An object eligible for cluster-module membership
#[derive(Clone, Debug)]
pub enum TargetObject {
    /// The cluster's KubeadmControlPlane
    ControlPlane(Arc<DynamicObject>),
    /// One of the cluster's MachineDeployments
    WorkerPool(Arc<DynamicObject>),
}

impl TargetObject {
    /// Wrap a KubeadmControlPlane snapshot
    pub fn control_plane(obj: DynamicObject) -> Self {
        Self::ControlPlane(Arc::new(obj))
    }

    /// Wrap a MachineDeployment snapshot
    pub fn worker_pool(obj: DynamicObject) -> Self {
        Self::WorkerPool(Arc::new(obj))
    }

    /// Identity-only object carrying just namespace and name
    pub fn stub(namespace: &str, name: &str, control_plane: bool) -> Self {
        let kind = if control_plane {
            ObjectKind::ControlPlane
        } else {
            ObjectKind::MachineDeployment
        };
        let obj = DynamicObject::new(name, &kind.api_resource()).within(namespace);
        if control_plane {
            Self::control_plane(obj)
        } else {
            Self::worker_pool(obj)
        }
    }

    /// Underlying object snapshot
    pub fn object(&self) -> &DynamicObject {
        match self {
            Self::ControlPlane(obj) | Self::WorkerPool(obj) => obj,
        }
    }

    /// Object name
    pub fn name(&self) -> String {
        self.object().name_any()
    }

    /// Object namespace
    pub fn namespace(&self) -> String {
        self.object().namespace().unwrap_or_default()
    }

    /// Whether this target is the control plane
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Self::ControlPlane(_))
    }

    /// Kind of the wrapped object
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::ControlPlane(_) => ObjectKind::ControlPlane,
            Self::WorkerPool(_) => ObjectKind::MachineDeployment,
        }
    }

    /// Infrastructure machine template the target's machines are cloned from
    pub fn infrastructure_ref(&self) -> Option<InfrastructureRef> {
        let path = match self {
            Self::ControlPlane(_) => CONTROL_PLANE_TEMPLATE_REF,
            Self::WorkerPool(_) => WORKER_POOL_TEMPLATE_REF,
        };
        let reference = value_at(&self.object().data, path)?;
        let field = |key: &str| {
            reference
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let name = field("name");
        if name.is_empty() {
            return None;
        }
        Some(InfrastructureRef {
            api_version: field("apiVersion"),
            kind: field("kind"),
            name,
        })
    }

    /// Membership record for this target before a module exists
    pub fn pending_module(&self) -> ClusterModule {
        ClusterModule::pending(self.is_control_plane(), self.name())
    }
}

/// A persisted membership record joined with its target
#[derive(Clone, Debug)]
pub struct ModuleInfo {
    /// Target the module belongs to
    pub target: TargetObject,
    /// vCenter module UUID
    pub module_uuid: String,
}

impl ModuleInfo {
    /// Join a target with a module UUID
    pub fn new(target: TargetObject, module_uuid: impl Into<String>) -> Self {
        Self {
            target,
            module_uuid: module_uuid.into(),
        }
    }

    /// Target object name
    pub fn name(&self) -> String {
        self.target.name()
    }

    /// Membership record as persisted on the VSphereCluster
    pub fn to_cluster_module(&self) -> ClusterModule {
        self.target.pending_module().with_uuid(self.module_uuid.clone())
    }
}

//! Kubernetes Events for cluster-module operations
//!
//! Operations on a VSphereCluster are reported as [`AffinityEvent`]s and
//! surface in `kubectl describe vspherecluster`. Publishing is
//! fire-and-forget: a failed publish is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Event reason strings
pub mod reasons {
    /// A cluster module was created for a target
    pub const MODULE_CREATED: &str = "ClusterModuleCreated";
    /// Creating a cluster module failed
    pub const MODULE_CREATE_FAILED: &str = "ClusterModuleCreateFailed";
    /// A cluster module was deleted
    pub const MODULE_DELETED: &str = "ClusterModuleDeleted";
    /// Deleting a cluster module failed
    pub const MODULE_DELETE_FAILED: &str = "ClusterModuleDeleteFailed";
    /// The live control plane and machine deployments could not be resolved
    pub const DESIRED_STATE_UNAVAILABLE: &str = "DesiredStateUnavailable";
}

/// Event action strings
pub mod actions {
    /// A reconcile pass
    pub const RECONCILE: &str = "Reconcile";
    /// Creating a cluster module
    pub const CREATE: &str = "Create";
    /// Deleting a cluster module
    pub const DELETE: &str = "Delete";
}

/// Something worth telling the owner of a VSphereCluster about
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AffinityEvent {
    /// A module now exists for the target
    ModuleCreated {
        /// Target object name
        target: String,
        /// UUID returned by vCenter
        module_uuid: String,
    },
    /// A module could not be created
    ModuleCreateFailed {
        /// Failure description
        message: String,
    },
    /// A module was deleted
    ModuleDeleted {
        /// Target object name
        target: String,
        /// UUID of the deleted module
        module_uuid: String,
    },
    /// A module could not be deleted
    ModuleDeleteFailed {
        /// Failure description
        message: String,
    },
    /// The pass stopped before any module was touched
    DesiredStateUnavailable {
        /// Failure description
        message: String,
    },
}

impl AffinityEvent {
    /// Normal for successes, Warning for failures
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ModuleCreated { .. } | Self::ModuleDeleted { .. } => EventType::Normal,
            _ => EventType::Warning,
        }
    }

    /// Machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ModuleCreated { .. } => reasons::MODULE_CREATED,
            Self::ModuleCreateFailed { .. } => reasons::MODULE_CREATE_FAILED,
            Self::ModuleDeleted { .. } => reasons::MODULE_DELETED,
            Self::ModuleDeleteFailed { .. } => reasons::MODULE_DELETE_FAILED,
            Self::DesiredStateUnavailable { .. } => reasons::DESIRED_STATE_UNAVAILABLE,
        }
    }

    /// Action the controller was taking
    pub fn action(&self) -> &'static str {
        match self {
            Self::ModuleCreated { .. } | Self::ModuleCreateFailed { .. } => actions::CREATE,
            Self::ModuleDeleted { .. } | Self::ModuleDeleteFailed { .. } => actions::DELETE,
            Self::DesiredStateUnavailable { .. } => actions::RECONCILE,
        }
    }

    /// Human-readable note
    pub fn note(&self) -> String {
        match self {
            Self::ModuleCreated {
                target,
                module_uuid,
            } => format!("Created cluster module {} for {}", module_uuid, target),
            Self::ModuleDeleted {
                target,
                module_uuid,
            } => format!("Deleted cluster module {} for {}", module_uuid, target),
            Self::ModuleCreateFailed { message }
            | Self::ModuleDeleteFailed { message }
            | Self::DesiredStateUnavailable { message } => message.clone(),
        }
    }
}

/// Sink for [`AffinityEvent`]s
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event about the referenced object
    async fn publish(&self, regarding: &ObjectReference, event: AffinityEvent);
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as the given controller
    ///
    /// `POD_NAME`, when set, is reported as the instance.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, regarding: &ObjectReference, event: AffinityEvent) {
        let reason = event.reason();
        let record = Event {
            type_: event.event_type(),
            reason: reason.to_string(),
            note: Some(event.note()),
            action: event.action().to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&record, regarding).await {
            warn!(reason, object = ?regarding.name, error = %e, "failed to publish event");
        }
    }
}

/// Discards every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _regarding: &ObjectReference, _event: AffinityEvent) {}
}

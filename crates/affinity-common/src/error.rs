//! Error types for the affinity controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Load-phase errors (configuration, ambiguity, listing) abort a reconcile
//! pass; module-operation errors are scoped to a single target and are
//! folded into the pass result instead.

use std::fmt;

use thiserror::Error;

/// Operation issued against the cluster-module provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleOp {
    /// Create a new cluster module
    Create,
    /// Delete an existing cluster module
    Delete,
}

impl fmt::Display for ModuleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Main error type for affinity operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The aggregate is missing configuration required to resolve its members
    #[error("configuration error for {cluster}: {message}")]
    Configuration {
        /// Namespaced name of the VSphereCluster
        cluster: String,
        /// Description of what's missing
        message: String,
    },

    /// More than one control plane matched the cluster label
    #[error("multiple control plane objects found for {cluster}, expected 1, found {found}")]
    AmbiguousState {
        /// Namespaced name of the VSphereCluster
        cluster: String,
        /// Number of control plane objects that matched
        found: usize,
    },

    /// Listing member objects failed at the storage layer
    #[error("failed to list {kind} objects for {cluster}: {message}")]
    List {
        /// Kind being listed (e.g. "KubeadmControlPlane")
        kind: String,
        /// Namespaced name of the VSphereCluster
        cluster: String,
        /// Underlying failure
        message: String,
    },

    /// A vCenter session could not be obtained for a target
    #[error("session error for {target}: {message}")]
    Session {
        /// Name of the target object the session was for
        target: String,
        /// Description of what failed
        message: String,
    },

    /// A single create/delete call against the module provider failed
    #[error("failed to {operation} cluster module for {target}{}: {message}", uuid_suffix(.module_uuid))]
    ModuleOperation {
        /// Operation that failed
        operation: ModuleOp,
        /// Name of the target object
        target: String,
        /// Module UUID involved, if one was known
        module_uuid: Option<String>,
        /// Provider failure message
        message: String,
    },

    /// The vCenter behind a target does not support cluster modules
    #[error("vCenter version {version} does not support cluster modules (target {target})")]
    UnsupportedVCenter {
        /// Name of the target object
        target: String,
        /// Version string reported by vCenter
        version: String,
    },

    /// Invalid input (configuration values, malformed objects)
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a configuration error for the given cluster
    pub fn configuration(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an ambiguous-state error for the given cluster
    pub fn ambiguous_state(cluster: impl Into<String>, found: usize) -> Self {
        Self::AmbiguousState {
            cluster: cluster.into(),
            found,
        }
    }

    /// Create a list error for the given kind and cluster
    pub fn list(
        kind: impl Into<String>,
        cluster: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::List {
            kind: kind.into(),
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a session error for the given target
    pub fn session(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Session {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a module create error
    pub fn module_create(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ModuleOperation {
            operation: ModuleOp::Create,
            target: target.into(),
            module_uuid: None,
            message: msg.into(),
        }
    }

    /// Create a module delete error for a known UUID
    pub fn module_delete(
        target: impl Into<String>,
        module_uuid: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ModuleOperation {
            operation: ModuleOp::Delete,
            target: target.into(),
            module_uuid: Some(module_uuid.into()),
            message: msg.into(),
        }
    }

    /// Create an unsupported-vCenter error
    pub fn unsupported_vcenter(target: impl Into<String>, version: impl Into<String>) -> Self {
        Self::UnsupportedVCenter {
            target: target.into(),
            version: version.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Whether this error aborts a pass while loading desired state
    ///
    /// These are requeued after the fixed desired-state backoff.
    pub fn is_desired_state_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::AmbiguousState { .. } | Self::List { .. }
        )
    }

    /// Name of the target object this error is attributed to, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Session { target, .. }
            | Self::ModuleOperation { target, .. }
            | Self::UnsupportedVCenter { target, .. } => Some(target),
            _ => None,
        }
    }
}

fn uuid_suffix(module_uuid: &Option<String>) -> String {
    module_uuid
        .as_deref()
        .map(|uuid| format!(" (uuid {uuid})"))
        .unwrap_or_default()
}

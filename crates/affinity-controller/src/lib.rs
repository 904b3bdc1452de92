//! vSphere cluster-module affinity controller
//!
//! Keeps `VSphereCluster.spec.clusterModules` in step with the cluster's
//! live KubeadmControlPlane and MachineDeployments, creating and deleting
//! the matching vCenter cluster modules.
//!
//! Data flows router → controller → {current state, desired state} → diff →
//! applier → patch scope.

#![deny(missing_docs)]

pub mod apply;
pub mod client;
pub mod config;
pub mod controller;
pub mod current_state;
pub mod desired_state;
pub mod diff;
pub mod patch;
pub mod router;
pub mod runner;
pub mod session;
pub mod target;

pub use client::{KubeClient, KubeClientImpl, ObjectKind};
pub use config::ControllerConfig;
pub use controller::{error_policy, reconcile, Context, ContextBuilder};
pub use runner::build_affinity_controller;
pub use session::{Endpoint, ModuleProvider, SessionProvider, VCenterVersion};

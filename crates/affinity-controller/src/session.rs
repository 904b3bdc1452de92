//! vCenter session seam
//!
//! Transport and credentials live behind [`SessionProvider`]. This module
//! decides which endpoint a target's session is scoped to and classifies the
//! vCenter version reported by a session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

use affinity_common::crd::{ClusterModule, IdentityRef, VSphereCluster};
use affinity_common::kube_utils::{value_at, HasApiResource, VSphereMachineTemplate};
use affinity_common::Error;

use crate::client::{KubeClient, ObjectKind};
use crate::target::TargetObject;

const TEMPLATE_SPEC: &[&str] = &["spec", "template", "spec"];

/// Where a vCenter session is opened
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// vCenter server address
    pub server: String,
    /// Certificate thumbprint, if pinned
    pub thumbprint: Option<String>,
    /// Datacenter the session is scoped to
    pub datacenter: Option<String>,
    /// Identity used to authenticate
    pub identity_ref: Option<IdentityRef>,
    /// Namespace used to resolve the identity
    pub namespace: String,
}

impl Endpoint {
    /// Endpoint of the aggregate itself
    pub fn for_cluster(cluster: &VSphereCluster) -> Self {
        Self {
            server: cluster.spec.server.clone(),
            thumbprint: cluster.spec.thumbprint.clone(),
            datacenter: None,
            identity_ref: cluster.spec.identity_ref.clone(),
            namespace: cluster.namespace().unwrap_or_default(),
        }
    }

    /// Endpoint a target's module is created on
    ///
    /// Starts from the cluster endpoint and applies the server, thumbprint and
    /// datacenter of the target's VSphereMachineTemplate when it sets them.
    pub async fn for_target(
        kube: &dyn KubeClient,
        cluster: &VSphereCluster,
        target: &TargetObject,
    ) -> Result<Self, Error> {
        let mut endpoint = Self::for_cluster(cluster);

        let Some(infra) = target.infrastructure_ref() else {
            return Ok(endpoint);
        };
        if infra.kind != VSphereMachineTemplate::KIND {
            debug!(target = %target.name(), kind = %infra.kind, "target does not use a vSphere machine template");
            return Ok(endpoint);
        }

        let namespace = target.namespace();
        let template = kube
            .get_object(ObjectKind::MachineTemplate, &namespace, &infra.name)
            .await
            .map_err(|e| Error::session(target.name(), e.to_string()))?
            .ok_or_else(|| {
                Error::session(
                    target.name(),
                    format!("VSphereMachineTemplate {}/{} not found", namespace, infra.name),
                )
            })?;

        if let Some(spec) = value_at(&template.data, TEMPLATE_SPEC) {
            let field = |key: &str| {
                spec.get(key)
                    .and_then(|v| v.as_str())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            if let Some(server) = field("server") {
                endpoint.server = server;
            }
            if let Some(thumbprint) = field("thumbprint") {
                endpoint.thumbprint = Some(thumbprint);
            }
            if let Some(datacenter) = field("datacenter") {
                endpoint.datacenter = Some(datacenter);
            }
        }
        Ok(endpoint)
    }
}

/// vCenter release line, classified by version prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VCenterVersion {
    /// 6.7.x
    V6_7,
    /// 7.0.x
    V7_0,
    /// 8.0.x
    V8_0,
    /// Anything else, carrying the raw version string
    Unidentified(String),
}

impl VCenterVersion {
    /// Classify a version string as reported by vCenter's About info
    pub fn parse(version: &str) -> Self {
        if version.starts_with("6.7") {
            Self::V6_7
        } else if version.starts_with("7.0") {
            Self::V7_0
        } else if version.starts_with("8.0") {
            Self::V8_0
        } else {
            Self::Unidentified(version.to_string())
        }
    }

    /// Cluster modules are available from 7.0 onwards
    pub fn supports_cluster_modules(&self) -> bool {
        matches!(self, Self::V7_0 | Self::V8_0)
    }
}

impl fmt::Display for VCenterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V6_7 => write!(f, "6.7"),
            Self::V7_0 => write!(f, "7.0"),
            Self::V8_0 => write!(f, "8.0"),
            Self::Unidentified(raw) => write!(f, "unidentified ({})", raw),
        }
    }
}

/// Cluster-module operations on an authenticated vCenter session
#[async_trait]
pub trait ModuleProvider: Send + Sync {
    /// Version string reported by the vCenter
    fn version(&self) -> String;

    /// Create a cluster module for a target, returning its UUID
    async fn create_module(&self, module: &ClusterModule) -> Result<String, Error>;

    /// Delete a cluster module by UUID
    async fn delete_module(&self, module_uuid: &str) -> Result<(), Error>;
}

/// Opens authenticated vCenter sessions
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Acquire a session for the given endpoint
    async fn acquire(&self, endpoint: &Endpoint) -> Result<Arc<dyn ModuleProvider>, Error>;
}

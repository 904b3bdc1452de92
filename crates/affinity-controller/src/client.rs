//! Kubernetes API seam for the affinity controller
//!
//! Everything the controller reads or writes goes through [`KubeClient`] so
//! reconcile logic can be exercised against `mockall` mocks.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use affinity_common::crd::VSphereCluster;
use affinity_common::kube_utils::{
    CapiCluster, HasApiResource, KubeadmControlPlane, MachineDeployment, VSphereMachineTemplate,
};
use affinity_common::Error;

/// Kinds of dynamically-typed objects the controller reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// `KubeadmControlPlane`
    ControlPlane,
    /// `MachineDeployment`
    MachineDeployment,
    /// Cluster API `Cluster`
    CapiCluster,
    /// `VSphereMachineTemplate`
    MachineTemplate,
}

impl ObjectKind {
    /// ApiResource used to address this kind
    pub fn api_resource(self) -> ApiResource {
        match self {
            Self::ControlPlane => KubeadmControlPlane::api_resource(),
            Self::MachineDeployment => MachineDeployment::api_resource(),
            Self::CapiCluster => CapiCluster::api_resource(),
            Self::MachineTemplate => VSphereMachineTemplate::api_resource(),
        }
    }

    /// Kubernetes kind name
    pub fn kind(self) -> &'static str {
        match self {
            Self::ControlPlane => KubeadmControlPlane::KIND,
            Self::MachineDeployment => MachineDeployment::KIND,
            Self::CapiCluster => CapiCluster::KIND,
            Self::MachineTemplate => VSphereMachineTemplate::KIND,
        }
    }
}

/// Trait abstracting Kubernetes client operations for the affinity controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a VSphereCluster, returning None if it does not exist
    async fn get_vsphere_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VSphereCluster>, Error>;

    /// List objects of a kind in a namespace matching a label selector
    async fn list_objects(
        &self,
        kind: ObjectKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, Error>;

    /// Get an object of a kind by name, returning None if it does not exist
    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Merge-patch a VSphereCluster (spec and metadata), returning the stored object
    async fn patch_vsphere_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VSphereCluster, Error>;

    /// Merge-patch the status subresource of a VSphereCluster, returning the stored object
    async fn patch_vsphere_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VSphereCluster, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    field_manager: String,
}

impl KubeClientImpl {
    /// Create a client that patches under the given field manager
    pub fn with_field_manager(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn dynamic_api(&self, kind: ObjectKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_vsphere_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VSphereCluster>, Error> {
        let api: Api<VSphereCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_objects(
        &self,
        kind: ObjectKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        let api = self.dynamic_api(kind, namespace);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn get_object(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        let api = self.dynamic_api(kind, namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_vsphere_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VSphereCluster, Error> {
        let api: Api<VSphereCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .patch(name, &self.patch_params(), &Patch::Merge(patch))
            .await?)
    }

    async fn patch_vsphere_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<VSphereCluster, Error> {
        let api: Api<VSphereCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .patch_status(name, &self.patch_params(), &Patch::Merge(patch))
            .await?)
    }
}

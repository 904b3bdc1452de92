//! Single write boundary for a reconcile pass
//!
//! A [`PatchScope`] snapshots the parts of a VSphereCluster the controller
//! owns when a pass starts. Committing compares the mutated object against
//! that snapshot and writes back only what changed: one merge patch for
//! `spec.clusterModules` and `metadata.finalizers`, one for
//! `status.conditions`.
//!
//! Both lists are shared with other controllers, so every patch carries the
//! `resourceVersion` it was computed against. A concurrent write makes the
//! API server reject the patch with a conflict instead of losing that write.

use kube::ResourceExt;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use affinity_common::crd::{ClusterModule, Condition, VSphereCluster};
use affinity_common::Error;

use crate::client::KubeClient;

/// Merge patches produced by comparing an object against its baseline
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchSet {
    /// Patch for spec and metadata, if either changed
    pub object: Option<Value>,
    /// Patch for the status subresource, if it changed
    pub status: Option<Value>,
}

impl PatchSet {
    /// Whether nothing needs writing
    pub fn is_empty(&self) -> bool {
        self.object.is_none() && self.status.is_none()
    }
}

/// Baseline of a VSphereCluster captured at the start of a pass
pub struct PatchScope<'a> {
    kube: &'a dyn KubeClient,
    namespace: String,
    name: String,
    resource_version: Option<String>,
    cluster_modules: Vec<ClusterModule>,
    finalizers: Vec<String>,
    conditions: Vec<Condition>,
    committed: bool,
}

impl<'a> PatchScope<'a> {
    /// Capture the baseline of the given cluster
    pub fn open(kube: &'a dyn KubeClient, cluster: &VSphereCluster) -> Self {
        Self {
            kube,
            namespace: cluster.namespace().unwrap_or_default(),
            name: cluster.name_any(),
            resource_version: cluster.resource_version(),
            cluster_modules: cluster.spec.cluster_modules.clone(),
            finalizers: cluster.finalizers().to_vec(),
            conditions: conditions_of(cluster).to_vec(),
            committed: false,
        }
    }

    /// Patches needed to bring the stored object in line with `cluster`
    pub fn changes(&self, cluster: &VSphereCluster) -> PatchSet {
        let mut object = Map::new();
        if cluster.spec.cluster_modules != self.cluster_modules {
            object.insert(
                "spec".to_string(),
                json!({ "clusterModules": cluster.spec.cluster_modules }),
            );
        }
        if cluster.finalizers() != self.finalizers.as_slice() {
            object.insert(
                "metadata".to_string(),
                json!({ "finalizers": cluster.finalizers() }),
            );
        }

        let conditions = conditions_of(cluster);
        let status = (conditions != self.conditions.as_slice())
            .then(|| json!({ "status": { "conditions": conditions } }));

        let lock = self.resource_version.as_deref();
        PatchSet {
            object: (!object.is_empty()).then(|| locked(Value::Object(object), lock)),
            status: status.map(|patch| locked(patch, lock)),
        }
    }

    /// Write back every change made to `cluster` since the scope was opened
    ///
    /// Both patches are attempted; the first failure is returned.
    pub async fn commit(mut self, cluster: &VSphereCluster) -> Result<(), Error> {
        self.committed = true;
        let patches = self.changes(cluster);
        if patches.is_empty() {
            debug!(cluster = %self.name, "nothing to patch");
            return Ok(());
        }

        let mut lock = self.resource_version.clone();
        let object_result = match &patches.object {
            Some(patch) => {
                debug!(cluster = %self.name, %patch, "patching VSphereCluster");
                self.kube
                    .patch_vsphere_cluster(&self.namespace, &self.name, patch)
                    .await
                    .map(|stored| {
                        // Status shares the object's resourceVersion
                        if stored.resource_version().is_some() {
                            lock = stored.resource_version();
                        }
                    })
            }
            None => Ok(()),
        };
        let status_result = match patches.status {
            Some(patch) => {
                let patch = locked(patch, lock.as_deref());
                debug!(cluster = %self.name, %patch, "patching VSphereCluster status");
                self.kube
                    .patch_vsphere_cluster_status(&self.namespace, &self.name, &patch)
                    .await
                    .map(|_| ())
            }
            None => Ok(()),
        };
        object_result.and(status_result)
    }
}

impl Drop for PatchScope<'_> {
    fn drop(&mut self) {
        if !self.committed {
            warn!(
                cluster = %self.name,
                namespace = %self.namespace,
                "patch scope dropped without commit, changes discarded"
            );
        }
    }
}

fn locked(mut patch: Value, resource_version: Option<&str>) -> Value {
    if let Some(rv) = resource_version {
        patch["metadata"]["resourceVersion"] = json!(rv);
    }
    patch
}

fn conditions_of(cluster: &VSphereCluster) -> &[Condition] {
    cluster
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or(&[])
}

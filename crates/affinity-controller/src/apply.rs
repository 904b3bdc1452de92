//! Executes a diff against vCenter
//!
//! Phases run in a fixed order: verify, add, remove. Failures are isolated
//! to the entry that caused them and recorded in the [`DiffResult`].

use std::sync::Arc;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use tracing::{debug, info, warn};

use affinity_common::crd::VSphereCluster;
use affinity_common::events::{AffinityEvent, EventPublisher};
use affinity_common::Error;

use crate::client::KubeClient;
use crate::diff::{Diff, DiffResult, Outcome};
use crate::session::{Endpoint, ModuleProvider, SessionProvider, VCenterVersion};
use crate::target::{ModuleInfo, TargetObject};

/// Applies diffs for one VSphereCluster
pub struct DiffApplier<'a> {
    kube: &'a dyn KubeClient,
    sessions: &'a dyn SessionProvider,
    events: &'a dyn EventPublisher,
    cluster: &'a VSphereCluster,
    cluster_ref: ObjectReference,
}

impl<'a> DiffApplier<'a> {
    /// Create an applier for the given cluster
    pub fn new(
        kube: &'a dyn KubeClient,
        sessions: &'a dyn SessionProvider,
        events: &'a dyn EventPublisher,
        cluster: &'a VSphereCluster,
    ) -> Self {
        Self {
            kube,
            sessions,
            events,
            cluster,
            cluster_ref: cluster.object_ref(&()),
        }
    }

    /// Apply the diff, returning one outcome per processed entry
    pub async fn apply(&self, diff: Diff) -> DiffResult {
        let mut result = DiffResult::default();
        self.verify(diff.to_verify, &mut result);
        self.add(diff.to_add, &mut result).await;
        self.remove(diff.to_remove, &mut result).await;
        result
    }

    // Recorded modules are re-emitted unchanged; nothing is checked on vCenter.
    fn verify(&self, to_verify: Vec<ModuleInfo>, result: &mut DiffResult) {
        for info in to_verify {
            result.push(Outcome::Module(info.to_cluster_module()));
        }
    }

    async fn add(&self, to_add: Vec<TargetObject>, result: &mut DiffResult) {
        for target in to_add {
            match self.create(&target).await {
                Ok(module_uuid) => {
                    info!(target = %target.name(), module_uuid = %module_uuid, "created cluster module");
                    self.publish(AffinityEvent::ModuleCreated {
                        target: target.name(),
                        module_uuid: module_uuid.clone(),
                    })
                    .await;
                    result.push(Outcome::Module(target.pending_module().with_uuid(module_uuid)));
                }
                Err(e) => {
                    warn!(target = %target.name(), error = %e, "failed to create cluster module");
                    self.publish(AffinityEvent::ModuleCreateFailed {
                        message: e.to_string(),
                    })
                    .await;
                    result.push(Outcome::Failed(e));
                }
            }
        }
    }

    async fn create(&self, target: &TargetObject) -> Result<String, Error> {
        let name = target.name();
        let endpoint = Endpoint::for_target(self.kube, self.cluster, target).await?;
        let session = self.acquire(&endpoint, &name).await?;

        let version = VCenterVersion::parse(&session.version());
        if !version.supports_cluster_modules() {
            return Err(Error::unsupported_vcenter(&name, session.version()));
        }

        session
            .create_module(&target.pending_module())
            .await
            .map_err(|e| Error::module_create(&name, e.to_string()))
    }

    async fn remove(&self, to_remove: Vec<ModuleInfo>, result: &mut DiffResult) {
        if to_remove.is_empty() {
            return;
        }

        let endpoint = Endpoint::for_cluster(self.cluster);
        let session = match self.acquire(&endpoint, &self.cluster.namespaced_name()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, count = to_remove.len(), "no vCenter session for cluster module deletion");
                for info in to_remove {
                    let name = info.name();
                    let err = Error::module_delete(&name, &info.module_uuid, e.to_string());
                    self.delete_failed(&err).await;
                    result.push(Outcome::Failed(err));
                }
                return;
            }
        };

        for info in to_remove {
            let name = info.name();
            let namespace = info.target.namespace();
            match session.delete_module(&info.module_uuid).await {
                Ok(()) => {
                    info!(
                        target = %name,
                        namespace = %namespace,
                        module_uuid = %info.module_uuid,
                        "deleted cluster module"
                    );
                    self.publish(AffinityEvent::ModuleDeleted {
                        target: name.clone(),
                        module_uuid: info.module_uuid.clone(),
                    })
                    .await;
                    result.push(Outcome::Deleted {
                        target: name,
                        module_uuid: info.module_uuid,
                    });
                }
                Err(e) => {
                    warn!(
                        target = %name,
                        namespace = %namespace,
                        module_uuid = %info.module_uuid,
                        error = %e,
                        "failed to delete cluster module"
                    );
                    let err = Error::module_delete(&name, &info.module_uuid, e.to_string());
                    self.delete_failed(&err).await;
                    result.push(Outcome::Failed(err));
                }
            }
        }
    }

    async fn acquire(
        &self,
        endpoint: &Endpoint,
        owner: &str,
    ) -> Result<Arc<dyn ModuleProvider>, Error> {
        debug!(server = %endpoint.server, owner, "acquiring vCenter session");
        self.sessions.acquire(endpoint).await.map_err(|e| match e {
            Error::Session { .. } => e,
            other => Error::session(owner, other.to_string()),
        })
    }

    async fn delete_failed(&self, err: &Error) {
        self.publish(AffinityEvent::ModuleDeleteFailed {
            message: err.to_string(),
        })
        .await;
    }

    async fn publish(&self, event: AffinityEvent) {
        self.events.publish(&self.cluster_ref, event).await;
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use affinity_common::crd::ClusterModule;

    use super::*;

    /// Session provider recording every call against a single fake vCenter
    #[derive(Default)]
    pub struct RecordingSessions {
        pub provider: Arc<RecordingProvider>,
        pub fail_acquire: bool,
        pub acquired: Mutex<Vec<Endpoint>>,
    }

    impl RecordingSessions {
        pub fn with_version(version: &str) -> Self {
            Self {
                provider: Arc::new(RecordingProvider {
                    version: version.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }

        pub fn failing_create(mut self, target: &str) -> Self {
            Arc::get_mut(&mut self.provider)
                .unwrap()
                .fail_create
                .insert(target.to_string());
            self
        }

        pub fn failing_delete(mut self, uuid: &str) -> Self {
            Arc::get_mut(&mut self.provider)
                .unwrap()
                .fail_delete
                .insert(uuid.to_string());
            self
        }

        pub fn created(&self) -> Vec<String> {
            self.provider.created.lock().unwrap().clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.provider.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionProvider for RecordingSessions {
        async fn acquire(&self, endpoint: &Endpoint) -> Result<Arc<dyn ModuleProvider>, Error> {
            self.acquired.lock().unwrap().push(endpoint.clone());
            if self.fail_acquire {
                return Err(Error::validation("login failed"));
            }
            Ok(self.provider.clone())
        }
    }

    #[derive(Default)]
    pub struct RecordingProvider {
        pub version: String,
        pub fail_create: HashSet<String>,
        pub fail_delete: HashSet<String>,
        pub created: Mutex<Vec<String>>,
        pub deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModuleProvider for RecordingProvider {
        fn version(&self) -> String {
            self.version.clone()
        }

        async fn create_module(&self, module: &ClusterModule) -> Result<String, Error> {
            if self.fail_create.contains(&module.target_object_name) {
                return Err(Error::validation("quota exceeded"));
            }
            self.created
                .lock()
                .unwrap()
                .push(module.target_object_name.clone());
            Ok(format!("uuid-{}", module.target_object_name))
        }

        async fn delete_module(&self, module_uuid: &str) -> Result<(), Error> {
            if self.fail_delete.contains(module_uuid) {
                return Err(Error::validation("module not found"));
            }
            self.deleted.lock().unwrap().push(module_uuid.to_string());
            Ok(())
        }
    }

    /// Event publisher remembering reasons in publish order
    #[derive(Default)]
    pub struct RecordingEvents {
        pub reasons: Mutex<Vec<String>>,
    }

    impl RecordingEvents {
        pub fn reasons(&self) -> Vec<String> {
            self.reasons.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingEvents {
        async fn publish(&self, _regarding: &ObjectReference, event: AffinityEvent) {
            self.reasons.lock().unwrap().push(event.reason().to_string());
        }
    }
}

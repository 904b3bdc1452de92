//! Routes member-object lifecycle events to the owning VSphereCluster
//!
//! Only creations and deletions of control planes and machine deployments
//! trigger a reconcile. The watch API does not tell a create from an update,
//! so [`LifecycleFilter`] tracks which objects have already been seen.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{future, stream, Stream, StreamExt};
use kube::api::{Api, DynamicObject};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use tracing::{debug, warn};

use affinity_common::crd::VSphereCluster;
use affinity_common::kube_utils::{api_group, value_at};
use affinity_common::CLUSTER_NAME_LABEL;

use crate::client::{KubeClient, ObjectKind};

const CAPI_GROUP: &str = "cluster.x-k8s.io";
const VSPHERE_CLUSTER_KIND: &str = "VSphereCluster";

/// Structural change to a member object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// First sighting of the object
    Created,
    /// The object is gone
    Deleted,
}

/// Turns raw watch events into create/delete notifications
///
/// A watch restart re-lists every object; objects already known are not
/// reported again, and known objects missing from the re-list are reported
/// as deleted.
#[derive(Debug, Default)]
pub struct LifecycleFilter {
    known: HashMap<String, DynamicObject>,
    relisted: Option<HashSet<String>>,
}

impl LifecycleFilter {
    /// Feed one watch event, returning the notifications it produces
    pub fn observe(&mut self, event: Event<DynamicObject>) -> Vec<(Lifecycle, DynamicObject)> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(obj) => {
                let key = identity(&obj);
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(key.clone());
                }
                self.sighted(key, obj)
            }
            Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let stale: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !relisted.contains(*key))
                    .cloned()
                    .collect();
                stale
                    .into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(|obj| (Lifecycle::Deleted, obj))
                    .collect()
            }
            Event::Apply(obj) => {
                let key = identity(&obj);
                self.sighted(key, obj)
            }
            Event::Delete(obj) => {
                self.known.remove(&identity(&obj));
                vec![(Lifecycle::Deleted, obj)]
            }
        }
    }

    fn sighted(&mut self, key: String, obj: DynamicObject) -> Vec<(Lifecycle, DynamicObject)> {
        if self.known.contains_key(&key) {
            self.known.insert(key, obj);
            return Vec::new();
        }
        self.known.insert(key, obj.clone());
        vec![(Lifecycle::Created, obj)]
    }
}

fn identity(obj: &DynamicObject) -> String {
    obj.uid().unwrap_or_else(|| {
        format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
    })
}

/// Name of the Cluster API cluster a member belongs to
///
/// Uses the cluster-name label, falling back to a `Cluster` owner reference.
pub fn owner_cluster_name(obj: &DynamicObject) -> Option<String> {
    if let Some(name) = obj.labels().get(CLUSTER_NAME_LABEL) {
        return Some(name.clone());
    }
    obj.owner_references()
        .iter()
        .find(|owner| owner.kind == "Cluster" && api_group(&owner.api_version) == CAPI_GROUP)
        .map(|owner| owner.name.clone())
}

/// Reconcile key of the VSphereCluster owning a member object
///
/// Every failure is logged and yields None.
pub async fn resolve_owner(
    kube: &dyn KubeClient,
    obj: &DynamicObject,
) -> Option<ObjectRef<VSphereCluster>> {
    let namespace = obj.namespace()?;
    let Some(cluster_name) = owner_cluster_name(obj) else {
        debug!(object = %obj.name_any(), namespace = %namespace, "member has no owning cluster");
        return None;
    };

    let cluster = match kube
        .get_object(ObjectKind::CapiCluster, &namespace, &cluster_name)
        .await
    {
        Ok(Some(cluster)) => cluster,
        Ok(None) => {
            debug!(cluster = %cluster_name, namespace = %namespace, "owner cluster not found");
            return None;
        }
        Err(e) => {
            warn!(cluster = %cluster_name, namespace = %namespace, error = %e, "failed to get owner cluster");
            return None;
        }
    };

    let infra = value_at(&cluster.data, &["spec", "infrastructureRef"])?;
    let kind = infra.get("kind").and_then(|v| v.as_str()).unwrap_or_default();
    let name = infra.get("name").and_then(|v| v.as_str()).unwrap_or_default();
    if kind != VSPHERE_CLUSTER_KIND || name.is_empty() {
        debug!(cluster = %cluster_name, kind, "cluster infrastructure is not a VSphereCluster");
        return None;
    }

    Some(ObjectRef::new(name).within(&namespace))
}

/// Stream of VSphereCluster keys triggered by create/delete of members of one kind
pub fn member_triggers(
    kube: Arc<dyn KubeClient>,
    api: Api<DynamicObject>,
    config: watcher::Config,
) -> impl Stream<Item = ObjectRef<VSphereCluster>> + Send + 'static {
    route_member_events(kube, watcher::watcher(api, config).default_backoff())
}

/// Route a member watch stream to owning VSphereCluster keys
///
/// Watch errors are logged and skipped; the watcher recovers on its own.
pub fn route_member_events<S>(
    kube: Arc<dyn KubeClient>,
    events: S,
) -> impl Stream<Item = ObjectRef<VSphereCluster>> + Send + 'static
where
    S: Stream<Item = Result<Event<DynamicObject>, watcher::Error>> + Send + 'static,
{
    let mut filter = LifecycleFilter::default();
    events
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "member watch error");
                    None
                }
            })
        })
        .flat_map(move |event| stream::iter(filter.observe(event)))
        .then(move |(lifecycle, obj)| {
            let kube = kube.clone();
            async move {
                let key = resolve_owner(kube.as_ref(), &obj).await;
                debug!(
                    ?lifecycle,
                    kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default(),
                    object = %obj.name_any(),
                    cluster = ?key.as_ref().map(|k| k.name.as_str()),
                    "member lifecycle event"
                );
                key
            }
        })
        .filter_map(future::ready)
}

//! Live membership from the Cluster API objects labeled for the cluster

use kube::ResourceExt;
use tracing::debug;

use affinity_common::crd::VSphereCluster;
use affinity_common::kube_utils::is_deleting;
use affinity_common::{Error, CLUSTER_NAME_LABEL};

use crate::client::{KubeClient, ObjectKind};
use crate::target::TargetObject;

/// Targets that should own a cluster module
#[derive(Clone, Debug, Default)]
pub struct DesiredState {
    /// The live control plane, if any
    pub control_plane: Option<TargetObject>,
    /// Live worker pools, in list order
    pub worker_pools: Vec<TargetObject>,
}

impl DesiredState {
    /// Resolve desired state by listing the cluster's control plane and machine deployments
    ///
    /// Objects pending deletion are excluded. More than one control plane
    /// (counted before the deletion filter) is an ambiguity error.
    pub async fn resolve(kube: &dyn KubeClient, cluster: &VSphereCluster) -> Result<Self, Error> {
        let cluster_key = cluster.namespaced_name();
        let label_value = cluster
            .cluster_label()
            .ok_or_else(|| Error::configuration(&cluster_key, "missing CAPI cluster label"))?;
        let namespace = cluster.namespace().unwrap_or_default();
        let selector = format!("{}={}", CLUSTER_NAME_LABEL, label_value);

        let control_planes =
            list(kube, ObjectKind::ControlPlane, &namespace, &selector, &cluster_key).await?;
        if control_planes.len() > 1 {
            return Err(Error::ambiguous_state(&cluster_key, control_planes.len()));
        }

        let control_plane = control_planes
            .into_iter()
            .find(|obj| !is_deleting(obj))
            .map(TargetObject::control_plane);

        let worker_pools: Vec<_> =
            list(kube, ObjectKind::MachineDeployment, &namespace, &selector, &cluster_key)
                .await?
                .into_iter()
                .filter(|obj| {
                    let deleting = is_deleting(obj);
                    if deleting {
                        debug!(target = %obj.name_any(), "skipping machine deployment pending deletion");
                    }
                    !deleting
                })
                .map(TargetObject::worker_pool)
                .collect();

        debug!(
            cluster = %cluster_key,
            control_plane = control_plane.is_some(),
            worker_pools = worker_pools.len(),
            "resolved desired state"
        );

        Ok(Self {
            control_plane,
            worker_pools,
        })
    }
}

async fn list(
    kube: &dyn KubeClient,
    kind: ObjectKind,
    namespace: &str,
    selector: &str,
    cluster_key: &str,
) -> Result<Vec<kube::api::DynamicObject>, Error> {
    kube.list_objects(kind, namespace, selector)
        .await
        .map_err(|e| Error::list(kind.kind(), cluster_key, e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use affinity_common::crd::VSphereClusterSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::DynamicObject;
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    pub(crate) fn labeled_cluster(name: &str, label: Option<&str>) -> VSphereCluster {
        let mut cluster = VSphereCluster::new(
            name,
            VSphereClusterSpec {
                server: "vcenter.example.com".to_string(),
                ..Default::default()
            },
        );
        cluster.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: label.map(|l| BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), l.to_string())])),
            ..Default::default()
        };
        cluster
    }

    pub(crate) fn member(kind: ObjectKind, name: &str) -> DynamicObject {
        DynamicObject::new(name, &kind.api_resource()).within("default")
    }

    fn deleting(mut obj: DynamicObject) -> DynamicObject {
        obj.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        obj
    }

    fn mock_lists(cps: Vec<DynamicObject>, mds: Vec<DynamicObject>) -> MockKubeClient {
        let mut kube = MockKubeClient::new();
        kube.expect_list_objects()
            .withf(|kind, ns, selector| {
                *kind == ObjectKind::ControlPlane
                    && ns == "default"
                    && selector == "cluster.x-k8s.io/cluster-name=prod"
            })
            .returning(move |_, _, _| Ok(cps.clone()));
        kube.expect_list_objects()
            .withf(|kind, _, _| *kind == ObjectKind::MachineDeployment)
            .returning(move |_, _, _| Ok(mds.clone()));
        kube
    }

    #[tokio::test]
    async fn resolves_control_plane_and_worker_pools() {
        let kube = mock_lists(
            vec![member(ObjectKind::ControlPlane, "prod-cp")],
            vec![
                member(ObjectKind::MachineDeployment, "md-0"),
                member(ObjectKind::MachineDeployment, "md-1"),
            ],
        );
        let state = DesiredState::resolve(&kube, &labeled_cluster("prod", Some("prod")))
            .await
            .unwrap();

        assert_eq!(state.control_plane.unwrap().name(), "prod-cp");
        let names: Vec<_> = state.worker_pools.iter().map(TargetObject::name).collect();
        assert_eq!(names, vec!["md-0", "md-1"]);
    }

    #[tokio::test]
    async fn missing_label_is_configuration_error() {
        let kube = MockKubeClient::new();
        let err = DesiredState::resolve(&kube, &labeled_cluster("prod", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn two_control_planes_are_ambiguous() {
        let mut kube = MockKubeClient::new();
        kube.expect_list_objects()
            .withf(|kind, _, _| *kind == ObjectKind::ControlPlane)
            .returning(|_, _, _| {
                Ok(vec![
                    member(ObjectKind::ControlPlane, "cp-a"),
                    member(ObjectKind::ControlPlane, "cp-b"),
                ])
            });
        kube.expect_list_objects()
            .withf(|kind, _, _| *kind == ObjectKind::MachineDeployment)
            .never();

        let err = DesiredState::resolve(&kube, &labeled_cluster("prod", Some("prod")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousState { found: 2, .. }));
    }

    #[tokio::test]
    async fn objects_pending_deletion_are_excluded() {
        let kube = mock_lists(
            vec![deleting(member(ObjectKind::ControlPlane, "prod-cp"))],
            vec![
                deleting(member(ObjectKind::MachineDeployment, "md-0")),
                member(ObjectKind::MachineDeployment, "md-1"),
            ],
        );
        let state = DesiredState::resolve(&kube, &labeled_cluster("prod", Some("prod")))
            .await
            .unwrap();

        assert!(state.control_plane.is_none());
        assert_eq!(state.worker_pools.len(), 1);
        assert_eq!(state.worker_pools[0].name(), "md-1");
    }

    #[tokio::test]
    async fn no_control_plane_is_not_an_error() {
        let kube = mock_lists(vec![], vec![]);
        let state = DesiredState::resolve(&kube, &labeled_cluster("prod", Some("prod")))
            .await
            .unwrap();
        assert!(state.control_plane.is_none());
        assert!(state.worker_pools.is_empty());
    }

    #[tokio::test]
    async fn list_failure_is_wrapped() {
        let mut kube = MockKubeClient::new();
        kube.expect_list_objects()
            .withf(|kind, _, _| *kind == ObjectKind::ControlPlane)
            .returning(|_, _, _| Ok(vec![]));
        kube.expect_list_objects()
            .withf(|kind, _, _| *kind == ObjectKind::MachineDeployment)
            .returning(|_, _, _| Err(Error::validation("etcd unavailable")));

        let err = DesiredState::resolve(&kube, &labeled_cluster("prod", Some("prod")))
            .await
            .unwrap_err();
        match err {
            Error::List { kind, message, .. } => {
                assert_eq!(kind, "MachineDeployment");
                assert!(message.contains("etcd unavailable"));
            }
            other => panic!("expected list error, got {other:?}"),
        }
    }
}

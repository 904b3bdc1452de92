//! Reconstruction of prior membership from `spec.clusterModules`
//!
//! Current state is rebuilt from persisted records only. Targets are stubs
//! carrying namespace and name; nothing is fetched, so a target deleted out
//! of band still appears here until the diff removes it. Current state
//! describes declared prior membership, not live object health.

use kube::ResourceExt;

use affinity_common::crd::{ClusterModule, VSphereCluster};

use crate::target::{ModuleInfo, TargetObject};

/// Membership recorded on the aggregate before this pass
#[derive(Clone, Debug, Default)]
pub struct CurrentState {
    /// Module recorded for the control plane, if any
    pub control_plane: Option<ModuleInfo>,
    /// Modules recorded for worker pools, in persisted order
    pub worker_pools: Vec<ModuleInfo>,
}

impl CurrentState {
    /// Rebuild current state from a VSphereCluster's persisted records
    pub fn from_cluster(cluster: &VSphereCluster) -> Self {
        let namespace = cluster.namespace().unwrap_or_default();
        Self::from_modules(&namespace, &cluster.spec.cluster_modules)
    }

    /// Rebuild current state from a list of records in a namespace
    ///
    /// If more than one control-plane record is present the last one wins.
    pub fn from_modules(namespace: &str, modules: &[ClusterModule]) -> Self {
        let mut state = Self::default();
        for module in modules {
            let target =
                TargetObject::stub(namespace, &module.target_object_name, module.control_plane);
            let info = ModuleInfo::new(target, module.module_uuid.clone());
            if module.control_plane {
                state.control_plane = Some(info);
            } else {
                state.worker_pools.push(info);
            }
        }
        state
    }

    /// Look up a worker-pool module by target name
    ///
    /// Returns the entry only when the name is recorded exactly once.
    pub fn worker_pool(&self, name: &str) -> Option<&ModuleInfo> {
        let mut matches = self.worker_pools.iter().filter(|m| m.name() == name);
        match (matches.next(), matches.next()) {
            (Some(info), None) => Some(info),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(name: &str, uuid: &str) -> ClusterModule {
        ClusterModule::pending(false, name).with_uuid(uuid)
    }

    #[test]
    fn splits_control_plane_from_worker_pools() {
        let modules = vec![
            ClusterModule::pending(true, "cp").with_uuid("uuid-cp"),
            md("md-0", "uuid-0"),
            md("md-1", "uuid-1"),
        ];
        let state = CurrentState::from_modules("default", &modules);

        let cp = state.control_plane.as_ref().unwrap();
        assert!(cp.target.is_control_plane());
        assert_eq!(cp.module_uuid, "uuid-cp");
        assert_eq!(cp.target.namespace(), "default");

        let names: Vec<_> = state.worker_pools.iter().map(ModuleInfo::name).collect();
        assert_eq!(names, vec!["md-0", "md-1"]);
    }

    #[test]
    fn empty_records_give_empty_state() {
        let state = CurrentState::from_modules("default", &[]);
        assert!(state.control_plane.is_none());
        assert!(state.worker_pools.is_empty());
        assert!(state.worker_pool("anything").is_none());
    }

    #[test]
    fn lookup_finds_single_entry_with_its_uuid() {
        let state =
            CurrentState::from_modules("default", &[md("md-0", "uuid-0"), md("md-1", "uuid-1")]);
        for (name, uuid) in [("md-0", "uuid-0"), ("md-1", "uuid-1")] {
            let found = state.worker_pool(name).unwrap();
            assert_eq!(found.module_uuid, uuid);
        }
        assert!(state.worker_pool("md-2").is_none());
    }

    #[test]
    fn lookup_rejects_duplicated_names() {
        let state =
            CurrentState::from_modules("default", &[md("md-0", "uuid-a"), md("md-0", "uuid-b")]);
        assert!(state.worker_pool("md-0").is_none());
    }

    #[test]
    fn lookup_property_over_generated_states() {
        // For every N and every position of a duplicate, lookup succeeds only for
        // names recorded exactly once.
        for n in 0..6usize {
            for dup in 0..=n {
                let mut modules: Vec<_> =
                    (0..n).map(|i| md(&format!("md-{i}"), &format!("uuid-{i}"))).collect();
                if dup < n {
                    modules.push(md(&format!("md-{dup}"), "uuid-dup"));
                }
                let state = CurrentState::from_modules("ns", &modules);
                for i in 0..n {
                    let name = format!("md-{i}");
                    let found = state.worker_pool(&name);
                    if i == dup {
                        assert!(found.is_none(), "duplicate {name} must not be found");
                    } else {
                        assert_eq!(found.unwrap().module_uuid, format!("uuid-{i}"));
                    }
                }
            }
        }
    }

    #[test]
    fn later_control_plane_record_wins() {
        let modules = vec![
            ClusterModule::pending(true, "cp-old").with_uuid("uuid-old"),
            ClusterModule::pending(true, "cp-new").with_uuid("uuid-new"),
        ];
        let state = CurrentState::from_modules("default", &modules);
        assert_eq!(state.control_plane.unwrap().name(), "cp-new");
        assert!(state.worker_pools.is_empty());
    }
}

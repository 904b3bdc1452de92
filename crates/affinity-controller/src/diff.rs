//! Diff between recorded and live membership, and the result of applying it

use thiserror::Error as ThisError;

use affinity_common::crd::ClusterModule;
use affinity_common::Error;

use crate::current_state::CurrentState;
use crate::desired_state::DesiredState;
use crate::target::{ModuleInfo, TargetObject};

/// Partition of targets into add, remove and verify sets
#[derive(Clone, Debug, Default)]
pub struct Diff {
    /// Live targets with no recorded module
    pub to_add: Vec<TargetObject>,
    /// Recorded modules whose target is no longer live
    pub to_remove: Vec<ModuleInfo>,
    /// Recorded modules whose target is still live
    pub to_verify: Vec<ModuleInfo>,
}

impl Diff {
    /// Compare recorded membership against live membership
    ///
    /// Worker pools match by name only. A renamed pool is a removal plus an
    /// addition.
    pub fn compute(current: &CurrentState, desired: &DesiredState) -> Self {
        let mut diff = Self::default();

        match (&desired.control_plane, &current.control_plane) {
            (None, Some(recorded)) => diff.to_remove.push(recorded.clone()),
            (Some(live), None) => diff.to_add.push(live.clone()),
            (Some(_), Some(recorded)) => diff.to_verify.push(recorded.clone()),
            (None, None) => {}
        }

        for live in &desired.worker_pools {
            match current.worker_pool(&live.name()) {
                Some(recorded) => diff.to_verify.push(recorded.clone()),
                None => diff.to_add.push(live.clone()),
            }
        }

        for recorded in &current.worker_pools {
            let name = recorded.name();
            let verified = diff
                .to_verify
                .iter()
                .any(|v| !v.target.is_control_plane() && v.name() == name);
            if !verified {
                diff.to_remove.push(recorded.clone());
            }
        }

        diff
    }
}

/// Outcome of one processed diff entry
#[derive(Debug)]
pub enum Outcome {
    /// The target keeps (or gained) a module
    Module(ClusterModule),
    /// A module was deleted and its record is dropped
    Deleted {
        /// Target the module belonged to
        target: String,
        /// UUID of the deleted module
        module_uuid: String,
    },
    /// The operation for this entry failed
    Failed(Error),
}

/// Ordered outcomes of applying a diff (verify, then add, then remove)
#[derive(Debug, Default)]
pub struct DiffResult {
    /// One outcome per processed entry
    pub items: Vec<Outcome>,
}

impl DiffResult {
    /// Record an outcome
    pub fn push(&mut self, outcome: Outcome) {
        self.items.push(outcome);
    }

    /// Membership records to persist: every surviving module, in processed order
    pub fn spec(&self) -> Vec<ClusterModule> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Outcome::Module(module) => Some(module.clone()),
                _ => None,
            })
            .collect()
    }

    /// Aggregate of every failed entry, or None if nothing failed
    pub fn error(&self) -> Option<ApplyError<'_>> {
        let errors: Vec<&Error> = self
            .items
            .iter()
            .filter_map(|item| match item {
                Outcome::Failed(e) => Some(e),
                _ => None,
            })
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(ApplyError { errors })
        }
    }
}

/// Aggregated per-entry failures from one apply
#[derive(Debug, ThisError)]
#[error("[{}]", join_errors(.errors))]
pub struct ApplyError<'a> {
    /// Failures in processed order
    pub errors: Vec<&'a Error>,
}

impl ApplyError<'_> {
    /// Names of the targets that failed
    pub fn targets(&self) -> Vec<&str> {
        self.errors.iter().filter_map(|e| e.target()).collect()
    }
}

fn join_errors(errors: &[&Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

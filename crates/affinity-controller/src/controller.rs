//! VSphereCluster cluster-module reconciliation
//!
//! Each pass rebuilds recorded membership from `spec.clusterModules`, lists
//! the live control plane and machine deployments, applies the difference on
//! vCenter, and writes the surviving records back through a single
//! [`PatchScope`]. The finalizer is held while any record remains.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use affinity_common::crd::{
    Condition, ConditionSeverity, VSphereCluster, CLUSTER_MODULES_AVAILABLE_CONDITION,
    CLUSTER_MODULE_SETUP_FAILED_REASON,
};
use affinity_common::events::{AffinityEvent, EventPublisher, KubeEventPublisher};
use affinity_common::{Error, CLUSTER_AFFINITY_FINALIZER};

use crate::apply::DiffApplier;
use crate::client::{KubeClient, KubeClientImpl};
use crate::config::ControllerConfig;
use crate::current_state::CurrentState;
use crate::desired_state::DesiredState;
use crate::diff::Diff;
use crate::patch::PatchScope;
use crate::session::SessionProvider;

/// Requeue delay for failures other than desired-state loading
const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "vspherecluster-affinity-controller";

/// Shared context for the affinity controller
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// vCenter session provider
    pub sessions: Arc<dyn SessionProvider>,
    /// Event publisher for cluster-module operations
    pub events: Arc<dyn EventPublisher>,
    /// Runtime settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, sessions: Arc<dyn SessionProvider>) -> ContextBuilder {
        ContextBuilder::new(client, sessions)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        sessions: Arc<dyn SessionProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            kube,
            sessions,
            events,
            config: ControllerConfig::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    sessions: Arc<dyn SessionProvider>,
    kube: Option<Arc<dyn KubeClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(client: Client, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            client,
            sessions,
            kube: None,
            events: None,
            config: ControllerConfig::default(),
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use the given runtime settings
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let field_manager = self.config.field_manager.clone();
        Context {
            kube: self.kube.unwrap_or_else(|| {
                Arc::new(KubeClientImpl::with_field_manager(
                    self.client.clone(),
                    field_manager,
                ))
            }),
            sessions: self.sessions,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME))),
            config: self.config,
        }
    }
}

/// Reconcile the cluster modules of a VSphereCluster
///
/// The object is re-read before the pass. Whatever happens after that, the
/// changes made during the pass are committed exactly once; an error from
/// the pass itself takes precedence over a commit error.
#[instrument(
    skip(cluster, ctx),
    fields(cluster = %cluster.name_any(), namespace = %cluster.namespace().unwrap_or_default())
)]
pub async fn reconcile(cluster: Arc<VSphereCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    info!("reconciling cluster modules");

    let Some(mut cluster) = ctx.kube.get_vsphere_cluster(&namespace, &name).await? else {
        debug!("VSphereCluster no longer exists");
        return Ok(Action::await_change());
    };

    let scope = PatchScope::open(ctx.kube.as_ref(), &cluster);
    let outcome = reconcile_modules(&mut cluster, &ctx).await;
    let committed = scope.commit(&cluster).await;

    match (outcome, committed) {
        (Ok(action), Ok(())) => Ok(action),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(patch_err)) => {
            error!(error = %patch_err, "patch failed");
            Err(e)
        }
    }
}

async fn reconcile_modules(cluster: &mut VSphereCluster, ctx: &Context) -> Result<Action, Error> {
    if cluster.meta().deletion_timestamp.is_none() && cluster.add_finalizer(CLUSTER_AFFINITY_FINALIZER)
    {
        debug!("added cluster-module finalizer");
    }

    let current = CurrentState::from_cluster(cluster);

    let desired = match DesiredState::resolve(ctx.kube.as_ref(), cluster).await {
        Ok(desired) => desired,
        Err(e) => {
            ctx.events
                .publish(
                    &cluster.object_ref(&()),
                    AffinityEvent::DesiredStateUnavailable {
                        message: e.to_string(),
                    },
                )
                .await;
            return Err(e);
        }
    };

    let diff = Diff::compute(&current, &desired);
    debug!(
        add = diff.to_add.len(),
        remove = diff.to_remove.len(),
        verify = diff.to_verify.len(),
        "computed cluster-module diff"
    );

    let result = DiffApplier::new(
        ctx.kube.as_ref(),
        ctx.sessions.as_ref(),
        ctx.events.as_ref(),
        cluster,
    )
    .apply(diff)
    .await;

    let failed = result.error().is_some();
    let condition = match result.error() {
        Some(err) => {
            warn!(error = %err, "errors when reconciling the cluster modules");
            Condition::false_(
                CLUSTER_MODULES_AVAILABLE_CONDITION,
                CLUSTER_MODULE_SETUP_FAILED_REASON,
                ConditionSeverity::Warning,
                err.to_string(),
            )
        }
        None => Condition::true_(CLUSTER_MODULES_AVAILABLE_CONDITION),
    };

    cluster.spec.cluster_modules = result.spec();
    cluster.status_mut().set_condition(condition);

    if cluster.spec.cluster_modules.is_empty() && cluster.remove_finalizer(CLUSTER_AFFINITY_FINALIZER)
    {
        info!("no cluster modules remain, removed finalizer");
    }

    if failed {
        Ok(Action::requeue(ctx.config.retry_requeue))
    } else {
        Ok(Action::await_change())
    }
}

/// Error policy for the affinity controller
///
/// Desired-state failures wait the configured fixed backoff; everything
/// else retries sooner.
pub fn error_policy(cluster: Arc<VSphereCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        cluster = %cluster.name_any(),
        namespace = %cluster.namespace().unwrap_or_default(),
        "reconciliation failed"
    );

    if error.is_desired_state_error() {
        Action::requeue(ctx.config.desired_state_requeue)
    } else {
        Action::requeue(DEFAULT_ERROR_REQUEUE)
    }
}

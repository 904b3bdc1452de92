//! Controller runner - builds the VSphereCluster affinity controller future

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, StreamExt};
use kube::api::DynamicObject;
use kube::runtime::controller::Config as ControllerRuntimeConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use affinity_common::crd::VSphereCluster;

use crate::client::ObjectKind;
use crate::config::ControllerConfig;
use crate::controller::{error_policy, reconcile, Context};
use crate::router::member_triggers;
use crate::session::SessionProvider;

/// Server-side watch timeout in seconds
///
/// Kept under the client's 30s read timeout so idle watches are closed by
/// the API server first.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the affinity controller future
///
/// VSphereClusters are the primary resource. KubeadmControlPlane and
/// MachineDeployment creations and deletions are routed to their owning
/// VSphereCluster.
pub fn build_affinity_controller(
    client: Client,
    sessions: Arc<dyn SessionProvider>,
    config: ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let concurrency = config.max_concurrent_reconciles;
    let namespace = config.watch_namespace.clone();
    let ctx = Arc::new(
        Context::builder(client.clone(), sessions)
            .config(config)
            .build(),
    );

    let clusters: Api<VSphereCluster> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let members = |kind: ObjectKind| -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match &namespace {
            Some(ns) => Api::namespaced_with(client.clone(), ns, &resource),
            None => Api::all_with(client.clone(), &resource),
        }
    };

    let triggers = stream::select(
        member_triggers(
            ctx.kube.clone(),
            members(ObjectKind::ControlPlane),
            watcher_config(),
        ),
        member_triggers(
            ctx.kube.clone(),
            members(ObjectKind::MachineDeployment),
            watcher_config(),
        ),
    );

    tracing::info!(
        namespace = namespace.as_deref().unwrap_or("*"),
        concurrency,
        "starting VSphereCluster affinity controller"
    );

    Box::pin(
        Controller::new(clusters, watcher_config())
            .with_config(ControllerRuntimeConfig::default().concurrency(concurrency))
            .reconcile_on(triggers)
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(|result| {
                log_pass(result);
                std::future::ready(())
            }),
    )
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

fn log_pass<T: std::fmt::Debug, E: std::fmt::Debug>(result: Result<T, E>) {
    match result {
        Ok(pass) => tracing::debug!(?pass, "cluster-module pass finished"),
        Err(e) => tracing::warn!(error = ?e, "cluster-module pass failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_timeout_is_below_client_read_timeout() {
        assert!(WATCH_TIMEOUT_SECS < 30);
        assert_eq!(watcher_config().timeout, Some(WATCH_TIMEOUT_SECS));
    }
}

use crate::{
    core::{ControllerKind, Error, Resources, Result},
    index::{Config, NamespaceResources},
};
use futures::{prelude::*, try_join};
use std::sync::Arc;
use tokio::time;

/// Fetches the objects needed to resolve a namespace's workloads.
///
/// Every kind is fetched concurrently. The first failure fails the whole batch
/// and cancels the fetches still in flight: a partial view would resolve
/// ownership incorrectly.
#[derive(Clone)]
pub struct Fetcher {
    resources: Arc<dyn Resources>,
    config: Arc<Config>,
}

// === impl Fetcher ===

impl Fetcher {
    pub fn new(resources: Arc<dyn Resources>, config: Arc<Config>) -> Self {
        Self { resources, config }
    }

    /// Fetches every object in the namespace. The selector only applies to
    /// pods.
    pub async fn namespace(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<NamespaceResources> {
        let res = &*self.resources;
        let included = |kind: ControllerKind| self.config.is_workload_included(&kind);

        let (
            pods,
            deployments,
            replica_sets,
            replication_controllers,
            deployment_configs,
            stateful_sets,
            daemon_sets,
            jobs,
            cron_jobs,
        ) = self
            .bounded(async {
                try_join!(
                    fetch(namespace, "Pods", true, res.pods(namespace, selector)),
                    fetch(namespace, "Deployments", true, res.deployments(namespace)),
                    fetch(namespace, "ReplicaSets", true, res.replica_sets(namespace)),
                    fetch(
                        namespace,
                        "ReplicationControllers",
                        included(ControllerKind::ReplicationController),
                        res.replication_controllers(namespace),
                    ),
                    fetch(
                        namespace,
                        "DeploymentConfigs",
                        res.is_openshift() && included(ControllerKind::DeploymentConfig),
                        res.deployment_configs(namespace),
                    ),
                    fetch(
                        namespace,
                        "StatefulSets",
                        included(ControllerKind::StatefulSet),
                        res.stateful_sets(namespace),
                    ),
                    fetch(
                        namespace,
                        "DaemonSets",
                        included(ControllerKind::DaemonSet),
                        res.daemon_sets(namespace),
                    ),
                    fetch(
                        namespace,
                        "Jobs",
                        included(ControllerKind::Job),
                        res.jobs(namespace),
                    ),
                    fetch(
                        namespace,
                        "CronJobs",
                        included(ControllerKind::CronJob),
                        res.cron_jobs(namespace),
                    ),
                )
            })
            .await?;

        Ok(NamespaceResources {
            pods,
            deployments,
            replica_sets,
            replication_controllers,
            deployment_configs,
            stateful_sets,
            daemon_sets,
            jobs,
            cron_jobs,
        })
    }

    /// Fetches what is needed to resolve a single workload.
    ///
    /// Pods are always listed. With a kind hint, only objects of that kind are
    /// fetched, plus the children the hinted kind is resolved through: Jobs for
    /// a CronJob, and ReplicaSets when the hinted kind is not ranked. Controllers
    /// that may be fetched by name are; a missing object yields no object
    /// rather than an error.
    pub async fn workload(
        &self,
        namespace: &str,
        name: &str,
        hint: Option<&ControllerKind>,
    ) -> Result<NamespaceResources> {
        let res = &*self.resources;
        let wanted = |kind: ControllerKind| {
            hint.map_or(true, |h| *h == kind) && self.config.is_workload_included(&kind)
        };
        let wants_replica_sets =
            wanted(ControllerKind::ReplicaSet) || hint.is_some_and(|h| !h.is_ranked());
        let wants_jobs = wanted(ControllerKind::Job) || wanted(ControllerKind::CronJob);

        let (
            pods,
            deployment,
            replica_sets,
            replication_controllers,
            deployment_config,
            stateful_set,
            daemon_set,
            jobs,
            cron_jobs,
        ) = self
            .bounded(async {
                try_join!(
                    fetch(namespace, "Pods", true, res.pods(namespace, None)),
                    fetch(
                        namespace,
                        "Deployment",
                        wanted(ControllerKind::Deployment),
                        res.deployment(namespace, name).map_ok(Vec::from_iter),
                    ),
                    fetch(
                        namespace,
                        "ReplicaSets",
                        wants_replica_sets,
                        res.replica_sets(namespace),
                    ),
                    fetch(
                        namespace,
                        "ReplicationControllers",
                        wanted(ControllerKind::ReplicationController),
                        res.replication_controllers(namespace),
                    ),
                    fetch(
                        namespace,
                        "DeploymentConfig",
                        res.is_openshift() && wanted(ControllerKind::DeploymentConfig),
                        res.deployment_config(namespace, name).map_ok(Vec::from_iter),
                    ),
                    fetch(
                        namespace,
                        "StatefulSet",
                        wanted(ControllerKind::StatefulSet),
                        res.stateful_set(namespace, name).map_ok(Vec::from_iter),
                    ),
                    fetch(
                        namespace,
                        "DaemonSet",
                        wanted(ControllerKind::DaemonSet),
                        res.daemon_set(namespace, name).map_ok(Vec::from_iter),
                    ),
                    fetch(namespace, "Jobs", wants_jobs, res.jobs(namespace)),
                    fetch(
                        namespace,
                        "CronJobs",
                        wanted(ControllerKind::CronJob),
                        res.cron_jobs(namespace),
                    ),
                )
            })
            .await?;

        Ok(NamespaceResources {
            pods,
            deployments: deployment,
            replica_sets,
            replication_controllers,
            deployment_configs: deployment_config,
            stateful_sets: stateful_set,
            daemon_sets: daemon_set,
            jobs,
            cron_jobs,
        })
    }

    /// Bounds a batch of fetches by the configured timeout.
    pub(crate) async fn bounded<T>(&self, batch: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.fetch_timeout;
        time::timeout(timeout, batch)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }
}

/// Runs a fetch when it is enabled. Disabled fetches produce no objects and
/// never poll the underlying future.
async fn fetch<T>(
    namespace: &str,
    what: &'static str,
    enabled: bool,
    fetch: impl Future<Output = Result<Vec<T>>>,
) -> Result<Vec<T>> {
    if !enabled {
        return Ok(Vec::new());
    }
    fetch
        .inspect_err(|error| tracing::error!(%namespace, %error, "Failed to fetch {what}"))
        .await
}

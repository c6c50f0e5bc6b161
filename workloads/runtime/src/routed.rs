use crate::{
    core::{
        istio::{IstioKind, IstioObject},
        Cache, ControllerKind, Error, Resources, Result,
    },
    k8s::{self, Selector},
};
use anyhow::Context;
use std::sync::Arc;

/// Serves reads from the cache for namespaces it has fully synced, and from
/// the API server otherwise.
///
/// Only the kinds the cache holds are ever routed to it; everything else, as
/// well as every write, goes to the live API.
#[derive(Clone)]
pub struct Routed {
    live: Arc<dyn Resources>,
    cache: Option<Arc<dyn Cache>>,
}

// === impl Routed ===

impl Routed {
    pub fn new(live: Arc<dyn Resources>, cache: Option<Arc<dyn Cache>>) -> Self {
        Self { live, cache }
    }

    fn cached(&self, namespace: &str) -> Option<&dyn Cache> {
        self.cache
            .as_deref()
            .filter(|c| c.is_namespace_cached(namespace))
    }
}

#[async_trait::async_trait]
impl Resources for Routed {
    async fn pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<k8s::Pod>> {
        if let Some(cache) = self.cached(namespace) {
            let selector = selector
                .unwrap_or_default()
                .parse::<Selector>()
                .with_context(|| format!("invalid label selector {selector:?}"))
                .map_err(Error::Other)?;
            return Ok(cache.pods(namespace, &selector));
        }
        self.live.pods(namespace, selector).await
    }

    async fn pod(&self, namespace: &str, name: &str) -> Result<Option<k8s::Pod>> {
        self.live.pod(namespace, name).await
    }

    async fn deployments(&self, namespace: &str) -> Result<Vec<k8s::Deployment>> {
        match self.cached(namespace) {
            Some(cache) => Ok(cache.deployments(namespace)),
            None => self.live.deployments(namespace).await,
        }
    }

    async fn deployment(&self, namespace: &str, name: &str) -> Result<Option<k8s::Deployment>> {
        match self.cached(namespace) {
            Some(cache) => Ok(take_named(cache.deployments(namespace), name)),
            None => self.live.deployment(namespace, name).await,
        }
    }

    async fn replica_sets(&self, namespace: &str) -> Result<Vec<k8s::ReplicaSet>> {
        match self.cached(namespace) {
            Some(cache) => Ok(cache.replica_sets(namespace)),
            None => self.live.replica_sets(namespace).await,
        }
    }

    async fn replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<k8s::ReplicationController>> {
        self.live.replication_controllers(namespace).await
    }

    async fn deployment_configs(&self, namespace: &str) -> Result<Vec<k8s::DeploymentConfig>> {
        self.live.deployment_configs(namespace).await
    }

    async fn deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<k8s::DeploymentConfig>> {
        self.live.deployment_config(namespace, name).await
    }

    async fn stateful_sets(&self, namespace: &str) -> Result<Vec<k8s::StatefulSet>> {
        match self.cached(namespace) {
            Some(cache) => Ok(cache.stateful_sets(namespace)),
            None => self.live.stateful_sets(namespace).await,
        }
    }

    async fn stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<k8s::StatefulSet>> {
        match self.cached(namespace) {
            Some(cache) => Ok(take_named(cache.stateful_sets(namespace), name)),
            None => self.live.stateful_set(namespace, name).await,
        }
    }

    async fn daemon_sets(&self, namespace: &str) -> Result<Vec<k8s::DaemonSet>> {
        match self.cached(namespace) {
            Some(cache) => Ok(cache.daemon_sets(namespace)),
            None => self.live.daemon_sets(namespace).await,
        }
    }

    async fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<k8s::DaemonSet>> {
        match self.cached(namespace) {
            Some(cache) => Ok(take_named(cache.daemon_sets(namespace), name)),
            None => self.live.daemon_set(namespace, name).await,
        }
    }

    async fn jobs(&self, namespace: &str) -> Result<Vec<k8s::Job>> {
        self.live.jobs(namespace).await
    }

    async fn cron_jobs(&self, namespace: &str) -> Result<Vec<k8s::CronJob>> {
        self.live.cron_jobs(namespace).await
    }

    async fn services(&self, namespace: &str) -> Result<Vec<k8s::Service>> {
        match self.cached(namespace) {
            Some(cache) => Ok(cache.services(namespace)),
            None => self.live.services(namespace).await,
        }
    }

    async fn istio_objects(&self, namespace: &str, kind: IstioKind) -> Result<Vec<IstioObject>> {
        self.live.istio_objects(namespace, kind).await
    }

    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: &ControllerKind,
        patch: &serde_json::Value,
    ) -> Result<()> {
        self.live.patch_workload(namespace, name, kind, patch).await
    }

    fn is_openshift(&self) -> bool {
        self.live.is_openshift()
    }
}

fn take_named<T: k8s::ResourceExt>(objects: Vec<T>, name: &str) -> Option<T> {
    objects.into_iter().find(|o| o.name_any() == name)
}

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod app;
mod error;
pub mod istio;
mod kind;
pub mod pod;
pub mod proxy;
pub mod workload;

pub use self::{
    error::{Error, Result},
    kind::{controller_priority, ControllerKind},
};
use workload_resolver_k8s_api::{self as k8s, Labels, Selector, Time};

/// The namespace a resolution runs in, as seen by the access check.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInfo {
    pub name: String,
    pub labels: Labels,
    pub creation_timestamp: Option<Time>,
}

/// Gates every resolution on the caller's access to a namespace.
#[async_trait::async_trait]
pub trait Namespaces: Send + Sync {
    async fn get_namespace(&self, name: &str) -> Result<NamespaceInfo>;
}

/// Lists and fetches the objects that make up workloads.
///
/// Listings take an optional label selector in the API server's textual
/// syntax. Single-object fetches return `Ok(None)` when the object does not
/// exist.
#[async_trait::async_trait]
pub trait Resources: Send + Sync {
    async fn pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<k8s::Pod>>;

    async fn pod(&self, namespace: &str, name: &str) -> Result<Option<k8s::Pod>>;

    async fn deployments(&self, namespace: &str) -> Result<Vec<k8s::Deployment>>;

    async fn deployment(&self, namespace: &str, name: &str) -> Result<Option<k8s::Deployment>>;

    async fn replica_sets(&self, namespace: &str) -> Result<Vec<k8s::ReplicaSet>>;

    async fn replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<k8s::ReplicationController>>;

    async fn deployment_configs(&self, namespace: &str) -> Result<Vec<k8s::DeploymentConfig>>;

    async fn deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<k8s::DeploymentConfig>>;

    async fn stateful_sets(&self, namespace: &str) -> Result<Vec<k8s::StatefulSet>>;

    async fn stateful_set(&self, namespace: &str, name: &str)
        -> Result<Option<k8s::StatefulSet>>;

    async fn daemon_sets(&self, namespace: &str) -> Result<Vec<k8s::DaemonSet>>;

    async fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<k8s::DaemonSet>>;

    async fn jobs(&self, namespace: &str) -> Result<Vec<k8s::Job>>;

    async fn cron_jobs(&self, namespace: &str) -> Result<Vec<k8s::CronJob>>;

    async fn services(&self, namespace: &str) -> Result<Vec<k8s::Service>>;

    async fn istio_objects(
        &self,
        namespace: &str,
        kind: istio::IstioKind,
    ) -> Result<Vec<istio::IstioObject>>;

    /// Applies a JSON merge patch to the named object of the given kind.
    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: &ControllerKind,
        patch: &serde_json::Value,
    ) -> Result<()>;

    /// Whether the cluster serves OpenShift's `DeploymentConfig` API.
    fn is_openshift(&self) -> bool;
}

/// Looks up the xDS sync state of a pod's sidecar proxy.
#[async_trait::async_trait]
pub trait ProxyStatuses: Send + Sync {
    async fn get_pod_proxy_status(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<proxy::SyncStatus>>;
}

/// A watch-driven, in-memory view of a subset of the cluster's objects.
///
/// Reads are only meaningful for namespaces for which
/// [`Cache::is_namespace_cached`] returns true.
pub trait Cache: Send + Sync {
    fn is_namespace_cached(&self, namespace: &str) -> bool;

    fn pods(&self, namespace: &str, selector: &Selector) -> Vec<k8s::Pod>;

    fn deployments(&self, namespace: &str) -> Vec<k8s::Deployment>;

    fn replica_sets(&self, namespace: &str) -> Vec<k8s::ReplicaSet>;

    fn stateful_sets(&self, namespace: &str) -> Vec<k8s::StatefulSet>;

    fn daemon_sets(&self, namespace: &str) -> Vec<k8s::DaemonSet>;

    fn services(&self, namespace: &str) -> Vec<k8s::Service>;
}

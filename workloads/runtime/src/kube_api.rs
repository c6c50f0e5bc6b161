use crate::{
    core::{
        istio::{IstioKind, IstioObject},
        ControllerKind, Error, NamespaceInfo, Namespaces, Resources, Result,
    },
    index::Config,
    k8s::{self, Client, Patch, PatchParams, Resource, ResourceExt},
};
use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams},
    core::NamespaceResourceScope,
};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc};

/// Reads namespaces from the API server, rejecting those outside of the
/// accessible set before any request is made.
#[derive(Clone)]
pub struct KubeNamespaces {
    client: Client,
    config: Arc<Config>,
}

/// Reads and patches workload objects through the API server.
#[derive(Clone)]
pub struct KubeResources {
    client: Client,
    openshift: bool,
}

// === impl KubeNamespaces ===

impl KubeNamespaces {
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }
}

#[async_trait::async_trait]
impl Namespaces for KubeNamespaces {
    async fn get_namespace(&self, name: &str) -> Result<NamespaceInfo> {
        if !self.config.is_namespace_accessible(name) {
            return Err(Error::NamespaceNotAccessible(name.to_string()));
        }
        let ns = Api::<k8s::Namespace>::all(self.client.clone())
            .get_opt(name)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| Error::not_found("Namespace", name))?;
        Ok(NamespaceInfo {
            name: ns.name_any(),
            labels: ns.metadata.labels.clone().into(),
            creation_timestamp: ns.metadata.creation_timestamp.clone(),
        })
    }
}

// === impl KubeResources ===

impl KubeResources {
    /// Probes the cluster for the OpenShift `DeploymentConfig` API.
    pub async fn new(client: Client) -> Self {
        let openshift = api_resource_exists::<k8s::DeploymentConfig>(&client).await;
        tracing::debug!(%openshift, "Discovered cluster capabilities");
        Self { client, openshift }
    }

    fn api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        T::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list<T>(&self, namespace: &str, params: &ListParams) -> Result<Vec<T>>
    where
        T: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        T::DynamicType: Default,
    {
        let list = self
            .api::<T>(namespace)
            .list(params)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(list.items)
    }

    async fn get<T>(&self, namespace: &str, name: &str) -> Result<Option<T>>
    where
        T: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        T::DynamicType: Default,
    {
        let obj = self
            .api::<T>(namespace)
            .get_opt(name)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(obj)
    }

    async fn patch<T>(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<()>
    where
        T: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        T::DynamicType: Default,
    {
        match self
            .api::<T>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(rsp)) if rsp.code == 404 => {
                Err(Error::not_found(T::kind(&Default::default()), name))
            }
            Err(error) => Err(anyhow::Error::from(error).into()),
        }
    }
}

#[async_trait::async_trait]
impl Resources for KubeResources {
    async fn pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<k8s::Pod>> {
        let mut params = ListParams::default();
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params = params.labels(selector);
        }
        self.list(namespace, &params).await
    }

    async fn pod(&self, namespace: &str, name: &str) -> Result<Option<k8s::Pod>> {
        self.get(namespace, name).await
    }

    async fn deployments(&self, namespace: &str) -> Result<Vec<k8s::Deployment>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn deployment(&self, namespace: &str, name: &str) -> Result<Option<k8s::Deployment>> {
        self.get(namespace, name).await
    }

    async fn replica_sets(&self, namespace: &str) -> Result<Vec<k8s::ReplicaSet>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<k8s::ReplicationController>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn deployment_configs(&self, namespace: &str) -> Result<Vec<k8s::DeploymentConfig>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<k8s::DeploymentConfig>> {
        self.get(namespace, name).await
    }

    async fn stateful_sets(&self, namespace: &str) -> Result<Vec<k8s::StatefulSet>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<k8s::StatefulSet>> {
        self.get(namespace, name).await
    }

    async fn daemon_sets(&self, namespace: &str) -> Result<Vec<k8s::DaemonSet>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<k8s::DaemonSet>> {
        self.get(namespace, name).await
    }

    async fn jobs(&self, namespace: &str) -> Result<Vec<k8s::Job>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn cron_jobs(&self, namespace: &str) -> Result<Vec<k8s::CronJob>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn services(&self, namespace: &str) -> Result<Vec<k8s::Service>> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn istio_objects(&self, namespace: &str, kind: IstioKind) -> Result<Vec<IstioObject>> {
        let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
        let resource = ApiResource::from_gvk_with_plural(&gvk, kind.plural());
        let api = Api::<DynamicObject>::namespaced_with(self.client.clone(), namespace, &resource);

        let list = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            // Istio isn't installed.
            Err(kube::Error::Api(rsp)) if rsp.code == 404 => {
                tracing::debug!(%namespace, %kind, "Istio API not served");
                return Ok(Vec::new());
            }
            Err(error) => return Err(anyhow::Error::from(error).into()),
        };

        Ok(list
            .items
            .into_iter()
            .map(|obj| IstioObject {
                kind,
                name: obj.name_any(),
                namespace: obj.namespace().unwrap_or_else(|| namespace.to_string()),
                spec: obj.data.get("spec").cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: &ControllerKind,
        patch: &serde_json::Value,
    ) -> Result<()> {
        match kind {
            ControllerKind::Deployment => self.patch::<k8s::Deployment>(namespace, name, patch).await,
            ControllerKind::ReplicaSet => self.patch::<k8s::ReplicaSet>(namespace, name, patch).await,
            ControllerKind::ReplicationController => {
                self.patch::<k8s::ReplicationController>(namespace, name, patch)
                    .await
            }
            ControllerKind::DeploymentConfig => {
                self.patch::<k8s::DeploymentConfig>(namespace, name, patch)
                    .await
            }
            ControllerKind::StatefulSet => {
                self.patch::<k8s::StatefulSet>(namespace, name, patch).await
            }
            ControllerKind::DaemonSet => self.patch::<k8s::DaemonSet>(namespace, name, patch).await,
            ControllerKind::Job => self.patch::<k8s::Job>(namespace, name, patch).await,
            ControllerKind::CronJob => self.patch::<k8s::CronJob>(namespace, name, patch).await,
            ControllerKind::Pod => self.patch::<k8s::Pod>(namespace, name, patch).await,
            ControllerKind::Custom(_) => Err(Error::not_found(kind, name)),
        }
    }

    fn is_openshift(&self) -> bool {
        self.openshift
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}

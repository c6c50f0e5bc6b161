use crate::{
    core::{
        istio::{IstioKind, IstioObject},
        pod::Pod,
        workload::{Workload, WorkloadList, WorkloadListItem},
        ControllerKind, Error, NamespaceInfo, Namespaces, ProxyStatuses, Resources, Result,
    },
    fetch::Fetcher,
    index::{self, Config},
    k8s::{self, Selector},
};
use futures::{future, prelude::*, try_join};
use std::sync::Arc;
use tracing::instrument;

/// Resolves, describes and patches the workloads of a namespace.
///
/// Every operation first checks that the namespace is accessible; a rejected
/// namespace issues no other request.
#[derive(Clone)]
pub struct WorkloadService {
    namespaces: Arc<dyn Namespaces>,
    resources: Arc<dyn Resources>,
    proxy_statuses: Arc<dyn ProxyStatuses>,
    config: Arc<Config>,
    fetcher: Fetcher,
}

// === impl WorkloadService ===

impl WorkloadService {
    pub fn new(
        namespaces: Arc<dyn Namespaces>,
        resources: Arc<dyn Resources>,
        proxy_statuses: Arc<dyn ProxyStatuses>,
        config: Arc<Config>,
    ) -> Self {
        let fetcher = Fetcher::new(resources.clone(), config.clone());
        Self {
            namespaces,
            resources,
            proxy_statuses,
            config,
            fetcher,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub(crate) fn resources(&self) -> &dyn Resources {
        &*self.resources
    }

    pub(crate) async fn namespace(&self, namespace: &str) -> Result<NamespaceInfo> {
        self.namespaces.get_namespace(namespace).await
    }

    /// Lists every workload in the namespace.
    ///
    /// When `link_istio_resources` is set, the Istio objects that select
    /// workloads by label are fetched alongside the workloads and referenced
    /// from each workload they select.
    #[instrument(skip(self))]
    pub async fn get_workload_list(
        &self,
        namespace: &str,
        link_istio_resources: bool,
    ) -> Result<WorkloadList> {
        let info = self.namespaces.get_namespace(namespace).await?;

        let (resources, istio) = self
            .fetcher
            .bounded(async {
                try_join!(
                    self.fetcher.namespace(namespace, None),
                    self.workload_selecting(namespace, link_istio_resources),
                )
            })
            .await?;

        let workloads = index::workloads(&resources, None, &self.config.sidecar_annotation)
            .iter()
            .map(|w| {
                let mut item = WorkloadListItem::from_workload(
                    w,
                    &self.config.app_label,
                    &self.config.version_label,
                );
                item.istio_references = istio
                    .iter()
                    .filter(|o| o.selects_workload(&w.labels))
                    .map(IstioObject::reference)
                    .collect();
                item
            })
            .collect::<Vec<_>>();
        tracing::debug!(workloads = workloads.len(), "Resolved");

        Ok(WorkloadList {
            namespace: info,
            workloads,
        })
    }

    /// Describes a single workload, with the sync status of its sidecars.
    ///
    /// `kind` restricts the fetches to a single controller kind and selects
    /// how the workload is built, even when it resolves to another kind.
    #[instrument(skip(self))]
    pub async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: Option<&ControllerKind>,
        include_services: bool,
    ) -> Result<Workload> {
        self.namespaces.get_namespace(namespace).await?;

        let (resources, services) = self
            .fetcher
            .bounded(async {
                try_join!(
                    self.fetcher.workload(namespace, name, kind),
                    async {
                        if include_services {
                            self.resources.services(namespace).await
                        } else {
                            Ok(Vec::new())
                        }
                    },
                )
            })
            .await?;

        let mut workload =
            index::workload(&resources, name, kind, &self.config.sidecar_annotation)
                .ok_or_else(|| Error::not_found("Workload", name))?;

        index::attach_proxy_status(&mut workload, namespace, &*self.proxy_statuses).await;

        if include_services {
            let selecting = services
                .into_iter()
                .filter(|svc| selects(svc, &workload))
                .collect::<Vec<_>>();
            workload.set_services(&selecting);
        }

        Ok(workload)
    }

    /// Applies a JSON merge patch to the named workload.
    ///
    /// Without a recognized kind, the patch is sent to an object of every
    /// patchable kind with that name. Kinds that have no such object are
    /// ignored; any other failure fails the update.
    #[instrument(skip(self, patch))]
    pub async fn update_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: Option<&ControllerKind>,
        patch: &serde_json::Value,
    ) -> Result<()> {
        self.namespaces.get_namespace(namespace).await?;

        let kinds = match kind {
            Some(kind) if ControllerKind::PATCHABLE.contains(kind) => vec![kind.clone()],
            _ => ControllerKind::PATCHABLE.to_vec(),
        };

        let patches = kinds
            .iter()
            .filter(|kind| self.config.is_workload_included(kind))
            .filter(|kind| {
                **kind != ControllerKind::DeploymentConfig || self.resources.is_openshift()
            })
            .map(|kind| {
                self.resources
                    .patch_workload(namespace, name, kind, patch)
                    .map(move |res| (kind, res))
            });
        let results = self
            .fetcher
            .bounded(future::join_all(patches).map(Ok))
            .await?;

        let mut failure = None;
        for (kind, res) in results {
            match res {
                Ok(()) => tracing::info!(%kind, "Patched"),
                Err(error) if error.is_not_found() => {}
                Err(error) => {
                    tracing::error!(%kind, %error, "Failed to patch workload");
                    failure.get_or_insert(error);
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Lists the namespace's pods matching a label selector.
    #[instrument(skip(self))]
    pub async fn get_pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<Pod>> {
        self.namespaces.get_namespace(namespace).await?;
        let pods = self
            .fetcher
            .bounded(self.resources.pods(namespace, selector))
            .await?;
        Ok(pods
            .iter()
            .map(|p| Pod::parse(p, &self.config.sidecar_annotation))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.namespaces.get_namespace(namespace).await?;
        let pod = self
            .fetcher
            .bounded(self.resources.pod(namespace, name))
            .await?
            .ok_or_else(|| Error::not_found("Pod", name))?;
        Ok(Pod::parse(&pod, &self.config.sidecar_annotation))
    }

    /// The value of the app label on the named workload, if it has one.
    #[instrument(skip(self))]
    pub async fn get_workload_app_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>> {
        self.namespaces.get_namespace(namespace).await?;
        let resources = self.fetcher.workload(namespace, name, None).await?;
        let workload = index::workload(&resources, name, None, &self.config.sidecar_annotation)
            .ok_or_else(|| Error::not_found("Workload", name))?;
        Ok(workload
            .labels
            .get(&self.config.app_label)
            .map(str::to_string))
    }

    /// Fetches the Istio objects that select workloads, when `enabled`.
    pub(crate) async fn workload_selecting(
        &self,
        namespace: &str,
        enabled: bool,
    ) -> Result<Vec<IstioObject>> {
        if !enabled {
            return Ok(Vec::new());
        }
        self.istio_objects(namespace, &IstioKind::WORKLOAD_SELECTING)
            .await
    }

    pub(crate) async fn istio_objects(
        &self,
        namespace: &str,
        kinds: &[IstioKind],
    ) -> Result<Vec<IstioObject>> {
        let lists = future::try_join_all(kinds.iter().map(|&kind| {
            self.resources
                .istio_objects(namespace, kind)
                .inspect_err(move |error| {
                    tracing::error!(%namespace, %kind, %error, "Failed to fetch Istio objects")
                })
        }))
        .await?;
        Ok(lists.into_iter().flatten().collect())
    }
}

/// Whether the service's selector picks the workload's pods. Services without
/// a selector select nothing.
fn selects(service: &k8s::Service, workload: &Workload) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .filter(|s| !s.is_empty())
        .is_some_and(|s| Selector::from_map(s.clone()).matches(&workload.labels))
}

use crate::{
    core::{
        app::{App, AppList, AppListItem, JoinedLabels, WorkloadItem},
        istio::{IstioKind, IstioObject, IstioReference},
        workload::Workload,
        Error, Result,
    },
    index,
    k8s::{self, ResourceExt},
    workloads::WorkloadService,
};
use futures::try_join;
use std::collections::BTreeMap;
use tracing::instrument;

/// Groups a namespace's services and workloads into applications by the value
/// of the app label.
#[derive(Clone)]
pub struct AppService {
    workloads: WorkloadService,
}

/// The services and workloads of a single app.
#[derive(Debug, Default)]
struct AppDetails {
    services: Vec<k8s::Service>,
    workloads: Vec<Workload>,
}

// === impl AppService ===

impl AppService {
    pub fn new(workloads: WorkloadService) -> Self {
        Self { workloads }
    }

    /// Lists the apps of a namespace, ordered by name.
    ///
    /// When `link_istio_resources` is set, each app references the virtual
    /// services and destination rules that route to its services, and the
    /// objects that select its workloads.
    #[instrument(skip(self))]
    pub async fn get_app_list(&self, namespace: &str, link_istio_resources: bool) -> Result<AppList> {
        let info = self.workloads.namespace(namespace).await?;

        let (apps, routing, selecting) = self
            .workloads
            .fetcher()
            .bounded(async {
                try_join!(
                    self.fetch_namespace_apps(namespace, None),
                    async {
                        if link_istio_resources {
                            self.workloads
                                .istio_objects(
                                    namespace,
                                    &[IstioKind::VirtualService, IstioKind::DestinationRule],
                                )
                                .await
                        } else {
                            Ok(Vec::new())
                        }
                    },
                    self.workloads
                        .workload_selecting(namespace, link_istio_resources),
                )
            })
            .await?;

        let apps = apps
            .into_iter()
            .map(|(name, details)| details.list_item(name, &routing, &selecting))
            .collect();

        Ok(AppList {
            namespace: info,
            apps,
        })
    }

    /// Describes a single app.
    #[instrument(skip(self))]
    pub async fn get_app(&self, namespace: &str, app: &str) -> Result<App> {
        let info = self.workloads.namespace(namespace).await?;

        let mut apps = self
            .workloads
            .fetcher()
            .bounded(self.fetch_namespace_apps(namespace, Some(app)))
            .await?;
        let details = apps
            .remove(app)
            .ok_or_else(|| Error::not_found("App", app))?;

        Ok(App {
            namespace: info,
            name: app.to_string(),
            workloads: details
                .workloads
                .iter()
                .map(|w| WorkloadItem {
                    workload_name: w.name.clone(),
                    istio_sidecar: w.istio_sidecar,
                })
                .collect(),
            service_names: details.services.iter().map(|s| s.name_any()).collect(),
            runtimes: Vec::new(),
        })
    }

    /// Fetches the services and workloads labeled with an app, or with any app
    /// when `app` is unset, and groups them by app.
    async fn fetch_namespace_apps(
        &self,
        namespace: &str,
        app: Option<&str>,
    ) -> Result<BTreeMap<String, AppDetails>> {
        let config = self.workloads.config();
        let app_label = config.app_label.as_str();
        let selector = match app {
            Some(app) => format!("{app_label}={app}"),
            None => app_label.to_string(),
        };

        let (services, resources) = try_join!(
            self.workloads.resources().services(namespace),
            self.workloads
                .fetcher()
                .namespace(namespace, Some(&selector)),
        )?;
        let workloads = index::workloads(&resources, Some(&selector), &config.sidecar_annotation);

        let mut apps = BTreeMap::<String, AppDetails>::new();
        for svc in services {
            let Some(name) = service_selector(&svc).and_then(|s| s.get(app_label)).cloned()
            else {
                continue;
            };
            if app.is_some_and(|app| app != name) {
                continue;
            }
            apps.entry(name).or_default().services.push(svc);
        }
        for workload in workloads {
            if let Some(name) = workload.labels.get(app_label) {
                apps.entry(name.to_string())
                    .or_default()
                    .workloads
                    .push(workload);
            }
        }
        Ok(apps)
    }
}

// === impl AppDetails ===

impl AppDetails {
    fn list_item(
        self,
        name: String,
        routing: &[IstioObject],
        selecting: &[IstioObject],
    ) -> AppListItem {
        let mut labels = JoinedLabels::default();
        let mut istio_references = Vec::<IstioReference>::new();

        for svc in &self.services {
            if let Some(l) = svc.metadata.labels.as_ref() {
                labels.join(l);
            }
            let namespace = svc.namespace().unwrap_or_default();
            istio_references.extend(
                routing
                    .iter()
                    .filter(|o| o.refers_to_service(&svc.name_any(), &namespace))
                    .map(IstioObject::reference),
            );
        }

        let mut workload_references = Vec::<IstioReference>::new();
        for workload in &self.workloads {
            labels.join(workload.labels.to_map().iter());
            for reference in selecting
                .iter()
                .filter(|o| o.selects_workload(&workload.labels))
                .map(IstioObject::reference)
            {
                if !workload_references.contains(&reference) {
                    workload_references.push(reference);
                }
            }
        }
        istio_references.extend(workload_references);

        AppListItem {
            name,
            istio_sidecar: self.workloads.iter().all(|w| w.istio_sidecar),
            labels: labels.build(),
            istio_references,
        }
    }
}

fn service_selector(svc: &k8s::Service) -> Option<&BTreeMap<String, String>> {
    svc.spec.as_ref().and_then(|s| s.selector.as_ref())
}


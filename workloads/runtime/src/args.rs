use crate::{
    core::{Cache, ControllerKind, Namespaces, ProxyStatuses, Resources},
    index::{
        self,
        cache::{NamespaceCache, SharedCache},
        metrics::CacheMetrics,
        Config,
    },
    k8s::{self, Client},
    AppService, IstiodProxyStatuses, KubeNamespaces, KubeResources, Routed, WorkloadService,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{info, info_span, Instrument};

/// How long a snapshot of istiod's sync state is reused.
const PROXY_STATUS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[clap(name = "workloads", about = "Resolves Kubernetes workloads from pod ownership")]
pub struct Args {
    #[clap(long, default_value = "workloads=info,warn", env = "WORKLOADS_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Controller kinds that are never fetched, e.g. `DaemonSet,CronJob`.
    ///
    /// Deployments, ReplicaSets and Pods can't be excluded.
    #[clap(long, value_delimiter = ',')]
    excluded_workloads: Vec<ControllerKind>,

    /// Patterns of the namespaces that may be read. `**` matches any namespace.
    #[clap(long, value_delimiter = ',', default_value = "**")]
    accessible_namespaces: Vec<String>,

    /// Patterns of the namespaces served from the watch cache.
    #[clap(long, value_delimiter = ',')]
    cached_namespaces: Vec<String>,

    #[clap(long, default_value = "app")]
    app_label: String,

    #[clap(long, default_value = "version")]
    version_label: String,

    #[clap(long, default_value = "sidecar.istio.io/status")]
    sidecar_annotation: String,

    #[clap(long, default_value = "istio-system")]
    istiod_namespace: String,

    #[clap(long, default_value = "istiod")]
    istiod_service: String,

    #[clap(long, default_value = "15014")]
    istiod_port: u16,

    #[clap(long, default_value = "30000")]
    fetch_timeout_ms: u64,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lists the workloads of a namespace
    List {
        namespace: String,

        /// Links the Istio objects that select each workload
        #[clap(long)]
        link_istio_resources: bool,
    },

    /// Describes a workload
    Get {
        namespace: String,
        name: String,

        /// Only looks for a workload of this kind
        #[clap(long)]
        kind: Option<ControllerKind>,

        /// Lists the services that select the workload
        #[clap(long)]
        include_services: bool,
    },

    /// Applies a JSON merge patch to a workload and describes the result
    Update {
        namespace: String,
        name: String,

        /// The merge patch, e.g. `{"metadata":{"labels":{"version":"v2"}}}`
        patch: String,

        #[clap(long)]
        kind: Option<ControllerKind>,
    },

    /// Lists the pods of a namespace
    Pods {
        namespace: String,

        #[clap(long, short = 'l')]
        selector: Option<String>,
    },

    /// Describes a pod
    Pod { namespace: String, name: String },

    /// Prints the app a workload belongs to
    AppName { namespace: String, name: String },

    /// Lists the apps of a namespace
    Apps {
        namespace: String,

        #[clap(long)]
        link_istio_resources: bool,
    },

    /// Describes an app
    App { namespace: String, name: String },

    /// Watches the cached namespaces and periodically resolves their
    /// workloads, serving cache metrics on the admin server
    Watch {
        #[clap(flatten)]
        admin: kubert::AdminArgs,

        #[clap(long, default_value = "10")]
        resolve_interval_secs: u64,
    },
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            excluded_workloads,
            accessible_namespaces,
            cached_namespaces,
            app_label,
            version_label,
            sidecar_annotation,
            istiod_namespace,
            istiod_service,
            istiod_port,
            fetch_timeout_ms,
            command,
        } = self;

        let accessible_namespaces = index::namespace_patterns(&accessible_namespaces)
            .context("invalid accessible namespace pattern")?;
        let cached_namespaces = index::namespace_patterns(&cached_namespaces)
            .context("invalid cached namespace pattern")?;
        let config = Arc::new(Config {
            excluded_workloads: excluded_workloads.into_iter().collect(),
            accessible_namespaces: Some(accessible_namespaces),
            cached_namespaces,
            app_label,
            version_label,
            sidecar_annotation,
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        });
        let istiod = Istiod {
            namespace: istiod_namespace,
            service: istiod_service,
            port: istiod_port,
        };

        let (admin, resolve_interval) = match command {
            Command::Watch {
                admin,
                resolve_interval_secs,
            } => (admin, Duration::from_secs(resolve_interval_secs)),
            command => {
                log_format.try_init(log_level)?;
                let client = client.try_client().await?;
                let services = Services::new(client, config, &istiod, None).await;
                return services.run(command).await;
            }
        };

        let mut prom = <Registry>::default();
        let (reader, cache) = NamespaceCache::shared(config.cached_namespaces.clone());
        let cache_metrics =
            CacheMetrics::register(cache.clone(), prom.sub_registry_with_prefix("workloads"))
                .shared();
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn cache watches.

        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(cache_metrics.clone(), pods).instrument(info_span!("pods")),
        );

        let deployments = runtime.watch_all::<k8s::Deployment>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(cache_metrics.clone(), deployments)
                .instrument(info_span!("deployments")),
        );

        let replica_sets = runtime.watch_all::<k8s::ReplicaSet>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(cache_metrics.clone(), replica_sets)
                .instrument(info_span!("replicasets")),
        );

        let stateful_sets = runtime.watch_all::<k8s::StatefulSet>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(cache_metrics.clone(), stateful_sets)
                .instrument(info_span!("statefulsets")),
        );

        let daemon_sets = runtime.watch_all::<k8s::DaemonSet>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(cache_metrics.clone(), daemon_sets)
                .instrument(info_span!("daemonsets")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(cache_metrics, services).instrument(info_span!("services")),
        );

        let reader: Arc<dyn Cache> = Arc::new(reader);
        let services = Services::new(runtime.client(), config, &istiod, Some(reader)).await;
        tokio::spawn(
            resolve_cached(
                services.workloads,
                cache,
                resolve_interval,
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("resolve")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Istiod {
    namespace: String,
    service: String,
    port: u16,
}

struct Services {
    workloads: WorkloadService,
    apps: AppService,
}

// === impl Services ===

impl Services {
    async fn new(
        client: Client,
        config: Arc<Config>,
        istiod: &Istiod,
        cache: Option<Arc<dyn Cache>>,
    ) -> Self {
        let live = Arc::new(KubeResources::new(client.clone()).await);
        let resources: Arc<dyn Resources> = Arc::new(Routed::new(live, cache));
        let namespaces: Arc<dyn Namespaces> =
            Arc::new(KubeNamespaces::new(client.clone(), config.clone()));
        let proxy_statuses: Arc<dyn ProxyStatuses> = Arc::new(IstiodProxyStatuses::new(
            client,
            &istiod.namespace,
            &istiod.service,
            istiod.port,
            PROXY_STATUS_TTL,
        ));
        let workloads = WorkloadService::new(namespaces, resources, proxy_statuses, config);
        let apps = AppService::new(workloads.clone());
        Self { workloads, apps }
    }

    /// Runs a one-shot command, printing its result as JSON.
    async fn run(&self, command: Command) -> Result<()> {
        let Self { workloads, apps } = self;
        let output = match command {
            Command::List {
                namespace,
                link_istio_resources,
            } => to_json(
                workloads
                    .get_workload_list(&namespace, link_istio_resources)
                    .await?,
            )?,
            Command::Get {
                namespace,
                name,
                kind,
                include_services,
            } => to_json(
                workloads
                    .get_workload(&namespace, &name, kind.as_ref(), include_services)
                    .await?,
            )?,
            Command::Update {
                namespace,
                name,
                patch,
                kind,
            } => {
                let patch = serde_json::from_str::<serde_json::Value>(&patch)
                    .context("invalid JSON merge patch")?;
                workloads
                    .update_workload(&namespace, &name, kind.as_ref(), &patch)
                    .await?;
                to_json(
                    workloads
                        .get_workload(&namespace, &name, kind.as_ref(), false)
                        .await?,
                )?
            }
            Command::Pods {
                namespace,
                selector,
            } => to_json(workloads.get_pods(&namespace, selector.as_deref()).await?)?,
            Command::Pod { namespace, name } => {
                to_json(workloads.get_pod(&namespace, &name).await?)?
            }
            Command::AppName { namespace, name } => to_json(
                workloads
                    .get_workload_app_name(&namespace, &name)
                    .await?,
            )?,
            Command::Apps {
                namespace,
                link_istio_resources,
            } => to_json(apps.get_app_list(&namespace, link_istio_resources).await?)?,
            Command::App { namespace, name } => to_json(apps.get_app(&namespace, &name).await?)?,
            Command::Watch { .. } => bail!("watch is not a one-shot command"),
        };
        println!("{output}");
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<String> {
    serde_json::to_string_pretty(&value).map_err(Into::into)
}

/// Resolves the workloads of every namespace served from the cache until
/// shutdown.
async fn resolve_cached(
    workloads: WorkloadService,
    cache: SharedCache,
    interval: Duration,
    shutdown: drain::Watch,
) {
    let mut interval = time::interval(interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down");
                return;
            }
        }

        let namespaces = cache.read().cached_namespaces();
        for namespace in namespaces {
            match workloads.get_workload_list(&namespace, false).await {
                Ok(list) => info!(%namespace, workloads = list.workloads.len(), "Resolved"),
                Err(error) => tracing::warn!(%namespace, %error, "Failed to resolve workloads"),
            }
        }
    }
}

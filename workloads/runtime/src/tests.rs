use crate::{
    core::{
        istio::{IstioKind, IstioObject},
        proxy::{SyncStatus, SYNCED},
        Cache, ControllerKind, Error, NamespaceInfo, Namespaces, ProxyStatuses, Resources, Result,
    },
    index::{cache::NamespaceCache, namespace_patterns, Config},
    k8s::{
        self,
        api::{
            apps::v1::{DeploymentSpec, ReplicaSetSpec, StatefulSetSpec},
            batch::v1::{CronJobSpec, JobSpec, JobTemplateSpec},
            core::v1::ServiceSpec,
        },
        labels::Map,
        ObjectMeta, OwnerReference, PodTemplateSpec, ResourceExt, Selector,
    },
    AppService, Routed, WorkloadService,
};
use kubert::index::IndexNamespacedResource;
use maplit::btreemap;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

const NS: &str = "bookinfo";
const SIDECAR: &str = "sidecar.istio.io/status";

#[tokio::test(flavor = "current_thread")]
async fn lists_workloads_with_istio_references() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    cluster.istio.lock().push(IstioObject {
        kind: IstioKind::AuthorizationPolicy,
        name: "reviews-viewer".to_string(),
        namespace: NS.to_string(),
        spec: serde_json::json!({ "selector": { "matchLabels": { "app": "reviews" } } }),
    });
    let svc = workload_service(&cluster, Config::default());

    let list = svc.get_workload_list(NS, true).await.expect("list must succeed");
    assert_eq!(list.namespace.name, NS);
    let names = list
        .workloads
        .iter()
        .map(|w| (w.name.as_str(), w.kind.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            ("debug", ControllerKind::Pod),
            ("ratings", ControllerKind::StatefulSet),
            ("reviews-v1", ControllerKind::Deployment),
            ("reviews-v2", ControllerKind::Deployment),
        ]
    );

    let reviews = &list.workloads[2];
    assert!(reviews.app_label);
    assert!(reviews.version_label);
    assert_eq!(reviews.pod_count, 1);
    assert_eq!(reviews.istio_references.len(), 1);
    assert_eq!(reviews.istio_references[0].name, "reviews-viewer");
    assert!(list.workloads[1].istio_references.is_empty());

    assert_eq!(cluster.calls_to("istio_objects"), IstioKind::WORKLOAD_SELECTING.len());
}

#[tokio::test(flavor = "current_thread")]
async fn istio_objects_are_only_fetched_when_linking() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());

    svc.get_workload_list(NS, false).await.expect("list must succeed");
    assert_eq!(cluster.calls_to("istio_objects"), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_workloads_are_not_found() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());

    let error = svc
        .get_workload(NS, "details-v1", None, false)
        .await
        .expect_err("details-v1 does not exist");
    assert!(error.is_not_found(), "{error}");
}

#[tokio::test(flavor = "current_thread")]
async fn fetch_errors_fail_the_resolution() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    *cluster.failing.lock() = Some("stateful_sets");
    let svc = workload_service(&cluster, Config::default());

    let error = svc
        .get_workload_list(NS, false)
        .await
        .expect_err("a failed fetch must fail the list");
    assert!(!error.is_not_found());
    assert!(error.to_string().contains("stateful_sets"), "{error}");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn a_failed_fetch_abandons_its_siblings() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    *cluster.delay.lock() = Some(Duration::from_secs(10));
    *cluster.failing.lock() = Some("stateful_sets");
    let svc = workload_service(&cluster, Config::default());

    let start = tokio::time::Instant::now();
    let error = svc
        .get_workload_list(NS, false)
        .await
        .expect_err("a failed fetch must fail the list");
    assert!(error.to_string().contains("stateful_sets"), "{error}");
    assert_eq!(tokio::time::Instant::now(), start, "siblings must not be awaited");
    assert_eq!(cluster.calls_to("pods"), 1, "siblings are started concurrently");
    assert!(cluster.completed.lock().is_empty(), "{:?}", cluster.completed.lock());
}

#[tokio::test(flavor = "current_thread")]
async fn inaccessible_namespaces_issue_no_fetches() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let config = Config {
        accessible_namespaces: Some(namespace_patterns(&["bookinfo"]).unwrap()),
        ..Default::default()
    };
    let svc = workload_service(&cluster, config);

    let error = svc
        .get_workload_list("kube-system", false)
        .await
        .expect_err("kube-system is not accessible");
    assert!(matches!(error, Error::NamespaceNotAccessible(ref ns) if ns == "kube-system"));
    assert!(cluster.calls.lock().is_empty(), "{:?}", cluster.calls.lock());
}

#[tokio::test(flavor = "current_thread")]
async fn excluded_kinds_are_not_fetched() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let config = Config {
        excluded_workloads: [ControllerKind::StatefulSet, ControllerKind::ReplicaSet]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let svc = workload_service(&cluster, config);

    let list = svc.get_workload_list(NS, false).await.expect("list must succeed");
    assert_eq!(cluster.calls_to("stateful_sets"), 0);
    assert_eq!(cluster.calls_to("replica_sets"), 1, "ReplicaSets can't be excluded");
    assert_eq!(cluster.calls_to("deployment_configs"), 0, "not an OpenShift cluster");

    // The ratings pod still names its StatefulSet, which wasn't fetched.
    let names = list
        .workloads
        .iter()
        .map(|w| w.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["debug", "reviews-v1", "reviews-v2"]);
}

#[tokio::test(flavor = "current_thread")]
async fn kind_hints_narrow_the_fetches() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());

    let ratings = svc
        .get_workload(NS, "ratings", Some(&ControllerKind::StatefulSet), false)
        .await
        .expect("ratings must resolve");
    assert_eq!(ratings.kind, ControllerKind::StatefulSet);
    assert_eq!(cluster.calls_to("stateful_set"), 1);
    assert_eq!(cluster.calls_to("deployment"), 0);
    assert_eq!(cluster.calls_to("replica_sets"), 0);
    assert_eq!(cluster.calls_to("jobs"), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn cron_job_hints_resolve_through_jobs() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let batch = btreemap! { "app".to_string() => "nightly".to_string() };
    cluster.pods.lock().push(mk_pod(
        "nightly-28391-x1",
        batch.clone(),
        Some(("Job", "nightly-28391")),
        false,
    ));
    cluster.jobs.lock().push(mk_job("nightly-28391", batch.clone(), "nightly"));
    cluster.cron_jobs.lock().push(mk_cron_job("nightly", batch));
    let svc = workload_service(&cluster, Config::default());

    let nightly = svc
        .get_workload(NS, "nightly", Some(&ControllerKind::CronJob), false)
        .await
        .expect("nightly must resolve");
    assert_eq!(nightly.kind, ControllerKind::CronJob);
    assert_eq!(nightly.pods.len(), 1);
    assert_eq!(nightly.pods[0].name, "nightly-28391-x1");
    assert_eq!(cluster.calls_to("jobs"), 1);
    assert_eq!(cluster.calls_to("cron_jobs"), 1);

    // Between runs no Job exists, but the CronJob is still found.
    cluster.jobs.lock().clear();
    cluster.pods.lock().retain(|p| p.name_any() != "nightly-28391-x1");
    let idle = svc
        .get_workload(NS, "nightly", Some(&ControllerKind::CronJob), false)
        .await
        .expect("an idle CronJob must resolve");
    assert_eq!(idle.kind, ControllerKind::CronJob);
    assert!(idle.pods.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn deployment_hints_resolve_without_replica_sets() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());

    let reviews = svc
        .get_workload(NS, "reviews-v1", Some(&ControllerKind::Deployment), false)
        .await
        .expect("reviews-v1 must resolve");
    assert_eq!(reviews.kind, ControllerKind::Deployment);
    assert_eq!(reviews.pods.len(), 1);
    assert_eq!(cluster.calls_to("replica_sets"), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn describes_workloads_with_services_and_proxy_status() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());

    let reviews = svc
        .get_workload(NS, "reviews-v1", None, true)
        .await
        .expect("reviews-v1 must resolve");
    assert_eq!(reviews.kind, ControllerKind::Deployment);
    assert!(reviews.istio_sidecar);
    let services = reviews
        .services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(services, vec!["reviews"], "selector-less services select nothing");

    let pod = &reviews.pods[0];
    let status = pod.proxy_status.as_ref().expect("sidecar must have a status");
    assert_eq!(status.cds, SYNCED);
}

#[tokio::test(flavor = "current_thread")]
async fn updates_patch_every_kind_with_the_name() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());
    let patch = serde_json::json!({ "metadata": { "labels": { "version": "v3" } } });

    svc.update_workload(NS, "reviews-v1", None, &patch)
        .await
        .expect("kinds without the object are ignored");
    assert_eq!(*cluster.patched.lock(), vec![ControllerKind::Deployment]);
    // Every patchable kind but DeploymentConfig, as the cluster isn't OpenShift.
    assert_eq!(
        cluster.calls_to("patch_workload"),
        ControllerKind::PATCHABLE.len() - 1
    );
}

#[tokio::test(flavor = "current_thread")]
async fn updates_with_a_kind_patch_only_that_kind() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());
    let patch = serde_json::json!({ "spec": { "replicas": 3 } });

    svc.update_workload(NS, "ratings", Some(&ControllerKind::StatefulSet), &patch)
        .await
        .expect("ratings must be patched");
    assert_eq!(cluster.calls_to("patch_workload"), 1);
    assert_eq!(*cluster.patched.lock(), vec![ControllerKind::StatefulSet]);

    // An unknown kind falls back to every kind.
    svc.update_workload(NS, "ratings", Some(&"Rollout".into()), &patch)
        .await
        .expect("ratings must be patched");
    assert_eq!(cluster.calls_to("patch_workload"), ControllerKind::PATCHABLE.len());
}

#[tokio::test(flavor = "current_thread")]
async fn update_failures_are_reported() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    *cluster.failing.lock() = Some("patch_workload");
    let svc = workload_service(&cluster, Config::default());

    let error = svc
        .update_workload(NS, "reviews-v1", None, &serde_json::json!({}))
        .await
        .expect_err("patch failures must fail the update");
    assert!(!error.is_not_found());
}

#[tokio::test(flavor = "current_thread")]
async fn pods_and_app_names() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let svc = workload_service(&cluster, Config::default());

    let pods = svc
        .get_pods(NS, Some("app=reviews"))
        .await
        .expect("pods must be listed");
    let names = pods.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["reviews-v1-abc-1", "reviews-v2-def-1"]);
    assert!(pods[0].has_istio_sidecar());

    let pod = svc.get_pod(NS, "ratings-0").await.expect("pod must exist");
    assert_eq!(pod.created_by[0].kind, "StatefulSet");
    assert!(svc.get_pod(NS, "nope").await.unwrap_err().is_not_found());

    let app = svc
        .get_workload_app_name(NS, "reviews-v2")
        .await
        .expect("reviews-v2 must resolve");
    assert_eq!(app.as_deref(), Some("reviews"));
    let app = svc
        .get_workload_app_name(NS, "debug")
        .await
        .expect("debug must resolve");
    assert_eq!(app, None);
}

#[tokio::test(flavor = "current_thread")]
async fn lists_apps() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    cluster.istio.lock().push(IstioObject {
        kind: IstioKind::VirtualService,
        name: "reviews-route".to_string(),
        namespace: NS.to_string(),
        spec: serde_json::json!({
            "hosts": ["reviews"],
            "http": [{ "route": [{ "destination": { "host": "reviews.bookinfo.svc.cluster.local" } }] }],
        }),
    });
    cluster.istio.lock().push(IstioObject {
        kind: IstioKind::Sidecar,
        name: "reviews-egress".to_string(),
        namespace: NS.to_string(),
        spec: serde_json::json!({ "workloadSelector": { "labels": { "app": "reviews" } } }),
    });
    let apps = AppService::new(workload_service(&cluster, Config::default()));

    let list = apps.get_app_list(NS, true).await.expect("apps must be listed");
    let names = list.apps.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["ratings", "reviews"]);
    assert_eq!(cluster.calls_to("istio_objects"), 8);

    let reviews = &list.apps[1];
    assert!(reviews.istio_sidecar);
    assert_eq!(reviews.labels["version"], "v1,v2");
    let refs = reviews
        .istio_references
        .iter()
        .map(|r| (r.object_type.as_str(), r.name.as_str()))
        .collect::<Vec<_>>();
    // The Sidecar selects both versions but is only referenced once.
    assert_eq!(
        refs,
        vec![
            ("VirtualService", "reviews-route"),
            ("Sidecar", "reviews-egress")
        ]
    );

    let ratings = &list.apps[0];
    assert!(!ratings.istio_sidecar);
    assert!(ratings.istio_references.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn describes_apps() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let apps = AppService::new(workload_service(&cluster, Config::default()));

    let reviews = apps.get_app(NS, "reviews").await.expect("reviews must exist");
    let workloads = reviews
        .workloads
        .iter()
        .map(|w| w.workload_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(workloads, vec!["reviews-v1", "reviews-v2"]);
    assert_eq!(reviews.service_names, vec!["reviews"]);
    assert_eq!(
        cluster.pod_selectors.lock().last().cloned().flatten().as_deref(),
        Some("app=reviews")
    );

    let error = apps
        .get_app(NS, "productpage")
        .await
        .expect_err("productpage does not exist");
    assert!(error.is_not_found());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn slow_fetches_time_out() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    *cluster.delay.lock() = Some(Duration::from_secs(60));
    let config = Config {
        fetch_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let svc = workload_service(&cluster, config);

    let error = svc
        .get_workload_list(NS, false)
        .await
        .expect_err("the fetch must time out");
    assert!(matches!(error, Error::Timeout(t) if t == Duration::from_secs(1)));
}

#[test]
fn routed_reads_prefer_synced_caches() {
    let _tracing = init_tracing();
    let cluster = Arc::new(bookinfo());
    let (reader, cache) = NamespaceCache::shared(namespace_patterns(&[NS]).unwrap());
    let reader: Arc<dyn Cache> = Arc::new(reader);
    let routed = Routed::new(cluster.clone(), Some(reader));

    // Until every kind is synced, reads go to the API server.
    let deployments = tokio_test::block_on(routed.deployments(NS)).unwrap();
    assert_eq!(deployments.len(), 2);
    assert_eq!(cluster.calls_to("deployments"), 1);

    {
        let mut cache = cache.write();
        let pods = cluster.pods.lock().clone();
        cache.reset(pods, Default::default());
        let deployments = cluster.deployments.lock().clone();
        cache.reset(deployments[..1].to_vec(), Default::default());
        IndexNamespacedResource::<k8s::ReplicaSet>::reset(&mut *cache, vec![], Default::default());
        IndexNamespacedResource::<k8s::StatefulSet>::reset(&mut *cache, vec![], Default::default());
        IndexNamespacedResource::<k8s::DaemonSet>::reset(&mut *cache, vec![], Default::default());
        IndexNamespacedResource::<k8s::Service>::reset(&mut *cache, vec![], Default::default());
    }

    let deployments = tokio_test::block_on(routed.deployments(NS)).unwrap();
    assert_eq!(deployments.len(), 1, "served from the cache");
    assert_eq!(cluster.calls_to("deployments"), 1);

    let reviews = tokio_test::block_on(routed.pods(NS, Some("app=reviews"))).unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(cluster.calls_to("pods"), 0);
    assert!(tokio_test::block_on(routed.pods(NS, Some("app in (reviews"))).is_err());

    let deployment = tokio_test::block_on(routed.deployment(NS, "reviews-v2")).unwrap();
    assert!(deployment.is_none(), "reviews-v2 was never cached");

    // Other namespaces and uncached kinds are always read live.
    tokio_test::block_on(routed.deployments("default")).unwrap();
    tokio_test::block_on(routed.jobs(NS)).unwrap();
    assert_eq!(cluster.calls_to("deployments"), 2);
    assert_eq!(cluster.calls_to("jobs"), 1);
}

// === helpers ===

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

fn workload_service(cluster: &Arc<FakeCluster>, config: Config) -> WorkloadService {
    let config = Arc::new(config);
    cluster.config.lock().clone_from(&config);
    WorkloadService::new(cluster.clone(), cluster.clone(), cluster.clone(), config)
}

/// An in-memory cluster that records every request made to it.
#[derive(Default)]
struct FakeCluster {
    config: Mutex<Arc<Config>>,

    pods: Mutex<Vec<k8s::Pod>>,
    deployments: Mutex<Vec<k8s::Deployment>>,
    replica_sets: Mutex<Vec<k8s::ReplicaSet>>,
    stateful_sets: Mutex<Vec<k8s::StatefulSet>>,
    jobs: Mutex<Vec<k8s::Job>>,
    cron_jobs: Mutex<Vec<k8s::CronJob>>,
    services: Mutex<Vec<k8s::Service>>,
    istio: Mutex<Vec<IstioObject>>,

    calls: Mutex<Vec<&'static str>>,
    completed: Mutex<Vec<&'static str>>,
    pod_selectors: Mutex<Vec<Option<String>>>,
    patched: Mutex<Vec<ControllerKind>>,

    /// Requests of this name fail immediately.
    failing: Mutex<Option<&'static str>>,
    /// Every request waits this long before completing.
    delay: Mutex<Option<Duration>>,
}

impl FakeCluster {
    fn calls_to(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    async fn request(&self, call: &'static str) -> Result<()> {
        self.calls.lock().push(call);
        if *self.failing.lock() == Some(call) {
            return Err(anyhow::anyhow!("{call} failed").into());
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().push(call);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Namespaces for FakeCluster {
    async fn get_namespace(&self, name: &str) -> Result<NamespaceInfo> {
        if !self.config.lock().is_namespace_accessible(name) {
            return Err(Error::NamespaceNotAccessible(name.to_string()));
        }
        Ok(NamespaceInfo {
            name: name.to_string(),
            ..Default::default()
        })
    }
}

#[async_trait::async_trait]
impl Resources for FakeCluster {
    async fn pods(&self, _namespace: &str, selector: Option<&str>) -> Result<Vec<k8s::Pod>> {
        self.request("pods").await?;
        self.pod_selectors.lock().push(selector.map(str::to_string));
        let selector = selector
            .unwrap_or_default()
            .parse::<Selector>()
            .map_err(anyhow::Error::from)?;
        Ok(self
            .pods
            .lock()
            .iter()
            .filter(|p| selector.matches_map(p.metadata.labels.as_ref().unwrap_or(&Map::new())))
            .cloned()
            .collect())
    }

    async fn pod(&self, _namespace: &str, name: &str) -> Result<Option<k8s::Pod>> {
        self.request("pod").await?;
        Ok(named(&self.pods.lock(), name))
    }

    async fn deployments(&self, _namespace: &str) -> Result<Vec<k8s::Deployment>> {
        self.request("deployments").await?;
        Ok(self.deployments.lock().clone())
    }

    async fn deployment(&self, _namespace: &str, name: &str) -> Result<Option<k8s::Deployment>> {
        self.request("deployment").await?;
        Ok(named(&self.deployments.lock(), name))
    }

    async fn replica_sets(&self, _namespace: &str) -> Result<Vec<k8s::ReplicaSet>> {
        self.request("replica_sets").await?;
        Ok(self.replica_sets.lock().clone())
    }

    async fn replication_controllers(
        &self,
        _namespace: &str,
    ) -> Result<Vec<k8s::ReplicationController>> {
        self.request("replication_controllers").await?;
        Ok(vec![])
    }

    async fn deployment_configs(&self, _namespace: &str) -> Result<Vec<k8s::DeploymentConfig>> {
        self.request("deployment_configs").await?;
        Ok(vec![])
    }

    async fn deployment_config(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<k8s::DeploymentConfig>> {
        self.request("deployment_config").await?;
        Ok(None)
    }

    async fn stateful_sets(&self, _namespace: &str) -> Result<Vec<k8s::StatefulSet>> {
        self.request("stateful_sets").await?;
        Ok(self.stateful_sets.lock().clone())
    }

    async fn stateful_set(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<k8s::StatefulSet>> {
        self.request("stateful_set").await?;
        Ok(named(&self.stateful_sets.lock(), name))
    }

    async fn daemon_sets(&self, _namespace: &str) -> Result<Vec<k8s::DaemonSet>> {
        self.request("daemon_sets").await?;
        Ok(vec![])
    }

    async fn daemon_set(&self, _namespace: &str, _name: &str) -> Result<Option<k8s::DaemonSet>> {
        self.request("daemon_set").await?;
        Ok(None)
    }

    async fn jobs(&self, _namespace: &str) -> Result<Vec<k8s::Job>> {
        self.request("jobs").await?;
        Ok(self.jobs.lock().clone())
    }

    async fn cron_jobs(&self, _namespace: &str) -> Result<Vec<k8s::CronJob>> {
        self.request("cron_jobs").await?;
        Ok(self.cron_jobs.lock().clone())
    }

    async fn services(&self, _namespace: &str) -> Result<Vec<k8s::Service>> {
        self.request("services").await?;
        Ok(self.services.lock().clone())
    }

    async fn istio_objects(&self, _namespace: &str, kind: IstioKind) -> Result<Vec<IstioObject>> {
        self.request("istio_objects").await?;
        Ok(self
            .istio
            .lock()
            .iter()
            .filter(|o| o.kind == kind)
            .cloned()
            .collect())
    }

    async fn patch_workload(
        &self,
        _namespace: &str,
        name: &str,
        kind: &ControllerKind,
        _patch: &serde_json::Value,
    ) -> Result<()> {
        self.request("patch_workload").await?;
        let exists = match kind {
            ControllerKind::Deployment => named(&self.deployments.lock(), name).is_some(),
            ControllerKind::StatefulSet => named(&self.stateful_sets.lock(), name).is_some(),
            _ => false,
        };
        if !exists {
            return Err(Error::not_found(kind, name));
        }
        self.patched.lock().push(kind.clone());
        Ok(())
    }

    fn is_openshift(&self) -> bool {
        false
    }
}

#[async_trait::async_trait]
impl ProxyStatuses for FakeCluster {
    async fn get_pod_proxy_status(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<SyncStatus>> {
        Ok(Some(SyncStatus {
            proxy_id: format!("{pod}.{namespace}"),
            cluster_sent: "1".to_string(),
            cluster_acked: "1".to_string(),
            ..Default::default()
        }))
    }
}

fn named<T: ResourceExt + Clone>(objects: &[T], name: &str) -> Option<T> {
    objects.iter().find(|o| o.name_any() == name).cloned()
}

/// Two versions of a Deployment, a StatefulSet with an unmeshed pod, a bare
/// pod and two services, one of which has no selector.
fn bookinfo() -> FakeCluster {
    let reviews = |version: &str| {
        btreemap! {
            "app".to_string() => "reviews".to_string(),
            "version".to_string() => version.to_string(),
        }
    };
    let ratings = btreemap! { "app".to_string() => "ratings".to_string() };

    let mut cluster = FakeCluster::default();
    *cluster.pods.get_mut() = vec![
        mk_pod("debug", Map::new(), None, false),
        mk_pod(
            "ratings-0",
            ratings.clone(),
            Some(("StatefulSet", "ratings")),
            false,
        ),
        mk_pod(
            "reviews-v1-abc-1",
            reviews("v1"),
            Some(("ReplicaSet", "reviews-v1-abc")),
            true,
        ),
        mk_pod(
            "reviews-v2-def-1",
            reviews("v2"),
            Some(("ReplicaSet", "reviews-v2-def")),
            true,
        ),
    ];
    *cluster.deployments.get_mut() = vec![
        mk_deployment("reviews-v1", reviews("v1")),
        mk_deployment("reviews-v2", reviews("v2")),
    ];
    *cluster.replica_sets.get_mut() = vec![
        mk_replica_set("reviews-v1-abc", reviews("v1"), "reviews-v1"),
        mk_replica_set("reviews-v2-def", reviews("v2"), "reviews-v2"),
    ];
    *cluster.stateful_sets.get_mut() = vec![mk_stateful_set("ratings", ratings)];
    *cluster.services.get_mut() = vec![
        mk_service(
            "reviews",
            btreemap! { "app".to_string() => "reviews".to_string() },
        ),
        mk_service("external", Map::new()),
    ];
    cluster
}

fn meta(name: &str, labels: Map, owner: Option<(&str, &str)>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NS.to_string()),
        labels: Some(labels),
        owner_references: owner.map(|(kind, name)| {
            vec![OwnerReference {
                kind: kind.to_string(),
                name: name.to_string(),
                controller: Some(true),
                ..Default::default()
            }]
        }),
        ..Default::default()
    }
}

fn template(labels: Map) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_pod(name: &str, labels: Map, owner: Option<(&str, &str)>, sidecar: bool) -> k8s::Pod {
    let mut metadata = meta(name, labels, owner);
    if sidecar {
        metadata.annotations = Some(btreemap! {
            SIDECAR.to_string() => r#"{"containers":["istio-proxy"]}"#.to_string(),
        });
    }
    k8s::Pod {
        metadata,
        ..Default::default()
    }
}

fn mk_deployment(name: &str, labels: Map) -> k8s::Deployment {
    k8s::Deployment {
        metadata: meta(name, labels.clone(), None),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            template: template(labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_replica_set(name: &str, labels: Map, deployment: &str) -> k8s::ReplicaSet {
    k8s::ReplicaSet {
        metadata: meta(name, labels.clone(), Some(("Deployment", deployment))),
        spec: Some(ReplicaSetSpec {
            replicas: Some(1),
            template: Some(template(labels)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_stateful_set(name: &str, labels: Map) -> k8s::StatefulSet {
    k8s::StatefulSet {
        metadata: meta(name, labels.clone(), None),
        spec: Some(StatefulSetSpec {
            template: template(labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_service(name: &str, selector: Map) -> k8s::Service {
    k8s::Service {
        metadata: meta(name, selector.clone(), None),
        spec: Some(ServiceSpec {
            selector: (!selector.is_empty()).then_some(selector),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_job(name: &str, labels: Map, cron_job: &str) -> k8s::Job {
    k8s::Job {
        metadata: meta(name, labels.clone(), Some(("CronJob", cron_job))),
        spec: Some(JobSpec {
            template: template(labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_cron_job(name: &str, labels: Map) -> k8s::CronJob {
    k8s::CronJob {
        metadata: meta(name, labels.clone(), None),
        spec: Some(CronJobSpec {
            schedule: "0 0 * * *".to_string(),
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    template: template(labels),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

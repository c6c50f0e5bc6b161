use crate::{
    istio::IstioReference,
    pod::{any_istio_sidecar, Pod},
    ControllerKind, NamespaceInfo,
};
use serde::Serialize;
use workload_resolver_k8s_api::{self as k8s, Labels, ResourceExt, Time};

/// A controller, or a bare pod, and the pods it manages.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub name: String,
    pub kind: ControllerKind,
    pub created_at: Option<Time>,
    pub resource_version: Option<String>,
    pub labels: Labels,
    pub istio_sidecar: bool,
    #[serde(flatten)]
    pub replicas: Replicas,
    pub pods: Vec<Pod>,
    pub services: Vec<ServiceOverview>,
    pub runtimes: Vec<Runtime>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Replicas {
    #[serde(rename = "desiredReplicas")]
    pub desired: i32,
    #[serde(rename = "currentReplicas")]
    pub current: i32,
    #[serde(rename = "availableReplicas")]
    pub available: i32,
}

/// A service whose selector matches a workload's labels.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOverview {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: Labels,
    pub selector: Labels,
    pub ip: Option<String>,
    pub created_at: Option<Time>,
    pub resource_version: Option<String>,
}

/// A runtime detected in a workload's pods. Filled in by callers; the
/// resolver never populates it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub name: String,
    pub dashboard_refs: Vec<DashboardRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardRef {
    pub template: String,
    pub title: String,
}

/// A workload as summarized in a namespace listing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadListItem {
    pub name: String,
    pub kind: ControllerKind,
    pub created_at: Option<Time>,
    pub resource_version: Option<String>,
    pub istio_sidecar: bool,
    pub labels: Labels,
    pub app_label: bool,
    pub version_label: bool,
    pub pod_count: usize,
    pub istio_references: Vec<IstioReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkloadList {
    pub namespace: NamespaceInfo,
    pub workloads: Vec<WorkloadListItem>,
}

// === impl Workload ===

impl Workload {
    /// An empty workload, populated by the caller.
    pub fn new(name: impl Into<String>, kind: ControllerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            created_at: None,
            resource_version: None,
            labels: Labels::default(),
            istio_sidecar: true,
            replicas: Replicas::default(),
            pods: Vec::new(),
            services: Vec::new(),
            runtimes: Vec::new(),
        }
    }

    /// Sets the workload's pods and recomputes the sidecar flag.
    ///
    /// Without pods there is nothing to disprove a sidecar, so the flag is
    /// set. A Deployment's pods share a template and only the first is
    /// checked.
    pub fn set_pods(&mut self, pods: Vec<Pod>) {
        self.istio_sidecar = match pods.first() {
            None => true,
            Some(pod) if self.kind == ControllerKind::Deployment => pod.has_istio_sidecar(),
            Some(_) => any_istio_sidecar(&pods),
        };
        self.pods = pods;
    }

    pub fn set_services(&mut self, services: &[k8s::Service]) {
        self.services = services.iter().map(ServiceOverview::from).collect();
    }
}

// === impl ServiceOverview ===

impl From<&k8s::Service> for ServiceOverview {
    fn from(svc: &k8s::Service) -> Self {
        let spec = svc.spec.as_ref();
        Self {
            name: svc.name_any(),
            namespace: svc.namespace(),
            labels: svc.metadata.labels.clone().into(),
            selector: spec.and_then(|s| s.selector.clone()).into(),
            ip: spec.and_then(|s| s.cluster_ip.clone()),
            created_at: svc.metadata.creation_timestamp.clone(),
            resource_version: svc.resource_version(),
        }
    }
}

// === impl WorkloadListItem ===

impl WorkloadListItem {
    pub fn from_workload(workload: &Workload, app_label: &str, version_label: &str) -> Self {
        Self {
            name: workload.name.clone(),
            kind: workload.kind.clone(),
            created_at: workload.created_at.clone(),
            resource_version: workload.resource_version.clone(),
            istio_sidecar: workload.istio_sidecar,
            labels: workload.labels.clone(),
            app_label: workload.labels.get(app_label).is_some(),
            version_label: workload.labels.get(version_label).is_some(),
            pod_count: workload.pods.len(),
            istio_references: Vec::new(),
        }
    }
}

use crate::{istio::IstioReference, workload::Runtime, NamespaceInfo};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The services and workloads that share a value of the app label.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub namespace: NamespaceInfo,
    pub name: String,
    pub workloads: Vec<WorkloadItem>,
    pub service_names: Vec<String>,
    pub runtimes: Vec<Runtime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadItem {
    pub workload_name: String,
    pub istio_sidecar: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppList {
    pub namespace: NamespaceInfo,
    pub apps: Vec<AppListItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppListItem {
    pub name: String,
    pub istio_sidecar: bool,
    /// Every label seen on the app's services and workloads. Keys with more
    /// than one value map to the sorted values joined with commas.
    pub labels: BTreeMap<String, String>,
    pub istio_references: Vec<IstioReference>,
}

/// Accumulates the distinct values of each label key.
#[derive(Clone, Debug, Default)]
pub struct JoinedLabels(BTreeMap<String, BTreeSet<String>>);

// === impl JoinedLabels ===

impl JoinedLabels {
    pub fn join<'l>(&mut self, labels: impl IntoIterator<Item = (&'l String, &'l String)>) {
        for (k, v) in labels {
            self.0.entry(k.clone()).or_default().insert(v.clone());
        }
    }

    pub fn build(self) -> BTreeMap<String, String> {
        self.0
            .into_iter()
            .map(|(k, vs)| (k, vs.into_iter().collect::<Vec<_>>().join(",")))
            .collect()
    }
}

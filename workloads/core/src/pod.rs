use crate::proxy::ProxyStatus;
use serde::{Deserialize, Serialize};
use workload_resolver_k8s_api::{self as k8s, Container, Labels, ResourceExt, Time};

/// A pod as it appears in a workload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub name: String,
    pub labels: Labels,
    pub created_at: Option<Time>,
    pub created_by: Vec<Reference>,
    pub istio_containers: Vec<ContainerInfo>,
    pub istio_init_containers: Vec<ContainerInfo>,
    pub status: Option<String>,
    pub proxy_status: Option<ProxyStatus>,
}

/// Names the object that created a pod.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub name: String,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
}

/// The payload of the sidecar injection annotation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarStatus {
    #[serde(default)]
    containers: Vec<String>,
    #[serde(default)]
    init_containers: Vec<String>,
}

// === impl Pod ===

impl Pod {
    /// Reads a pod, looking for injected sidecar containers in the annotation
    /// named by `sidecar_annotation`.
    pub fn parse(pod: &k8s::Pod, sidecar_annotation: &str) -> Self {
        let created_by = pod
            .owner_references()
            .iter()
            .map(|r| Reference {
                name: r.name.clone(),
                kind: r.kind.clone(),
            })
            .collect();

        let sidecar = pod
            .annotations()
            .get(sidecar_annotation)
            .and_then(|json| match serde_json::from_str::<SidecarStatus>(json) {
                Ok(status) => Some(status),
                Err(error) => {
                    tracing::debug!(pod = %pod.name_any(), %error, "Invalid sidecar annotation");
                    None
                }
            })
            .unwrap_or_default();

        let spec = pod.spec.as_ref();
        let containers = spec.map(|s| s.containers.as_slice()).unwrap_or_default();
        let init_containers = spec
            .and_then(|s| s.init_containers.as_deref())
            .unwrap_or_default();

        Self {
            name: pod.name_any(),
            labels: pod.metadata.labels.clone().into(),
            created_at: pod.metadata.creation_timestamp.clone(),
            created_by,
            istio_containers: container_infos(sidecar.containers, containers),
            istio_init_containers: container_infos(sidecar.init_containers, init_containers),
            status: pod.status.as_ref().and_then(|s| s.phase.clone()),
            proxy_status: None,
        }
    }

    pub fn has_istio_sidecar(&self) -> bool {
        !self.istio_containers.is_empty()
    }
}

fn container_infos(names: Vec<String>, containers: &[Container]) -> Vec<ContainerInfo> {
    names
        .into_iter()
        .map(|name| {
            let image = containers
                .iter()
                .find(|c| c.name == name)
                .and_then(|c| c.image.clone())
                .unwrap_or_default();
            ContainerInfo { name, image }
        })
        .collect()
}

/// Whether any of the pods runs a sidecar.
pub fn any_istio_sidecar(pods: &[Pod]) -> bool {
    pods.iter().any(Pod::has_istio_sidecar)
}

use workload_resolver_core::{proxy::ProxyStatus, workload::Workload, ProxyStatuses};

/// Attaches the sidecar sync status to each of the workload's pods that runs
/// a sidecar.
///
/// Lookups are issued one pod at a time. A failed lookup leaves the pod
/// without a status.
pub async fn attach_proxy_status(
    workload: &mut Workload,
    namespace: &str,
    statuses: &dyn ProxyStatuses,
) {
    for pod in workload.pods.iter_mut().filter(|p| p.has_istio_sidecar()) {
        pod.proxy_status = match statuses.get_pod_proxy_status(namespace, &pod.name).await {
            Ok(status) => status.as_ref().map(ProxyStatus::from),
            Err(error) => {
                tracing::warn!(%namespace, pod = %pod.name, %error, "Failed to get proxy status");
                None
            }
        };
    }
}

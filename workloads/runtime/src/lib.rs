#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use workload_resolver_core as core;
pub use workload_resolver_k8s_api as k8s;
pub use workload_resolver_k8s_index as index;

mod apps;
mod args;
mod fetch;
mod istiod;
mod kube_api;
mod routed;
mod workloads;

#[cfg(test)]
mod tests;

pub use self::{
    apps::AppService,
    args::Args,
    fetch::Fetcher,
    istiod::IstiodProxyStatuses,
    kube_api::{KubeNamespaces, KubeResources},
    routed::Routed,
    workloads::WorkloadService,
};

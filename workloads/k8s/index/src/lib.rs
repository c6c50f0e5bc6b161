//! Workload resolution
//!
//! Reconstructs the workloads of a namespace from the objects fetched from it.
//! Pods name their controllers through owner references; controllers may in
//! turn be owned by other controllers:
//!
//! ```text
//! [ Deployment ]       <- [ ReplicaSet ]            <- [ Pod ]
//! [ DeploymentConfig ] <- [ ReplicationController ] <- [ Pod ]
//! [ CronJob ]          <- [ Job ]                   <- [ Pod ]
//! [ StatefulSet | DaemonSet | custom ]              <- [ Pod ]
//! ```
//!
//! Resolution builds an index of controller names to kinds from the pods,
//! replaces children with their parents, adds controllers that own no pods,
//! and finally materializes each indexed controller into a workload with the
//! pods its template selects.
//!
//! The crate also provides a watch-driven cache of the most frequently read
//! kinds, instrumented with Prometheus metrics.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cache;
mod config;
mod materialize;
pub mod metrics;
mod proxy;
mod resolve;


pub use self::{
    config::{namespace_patterns, Config},
    materialize::Materializer,
    proxy::attach_proxy_status,
    resolve::{
        complete_orphans, index_pods, resolve, resolve_parents, ControllerIndex,
        NamespaceResources,
    },
};
use workload_resolver_core::{workload::Workload, ControllerKind};

/// Resolves every workload in the fetched namespace, ordered by name.
pub fn workloads(
    resources: &NamespaceResources,
    selector: Option<&str>,
    sidecar_annotation: &str,
) -> Vec<Workload> {
    let index = resolve(resources, selector);
    Materializer::new(resources, sidecar_annotation).workloads(&index)
}

/// Resolves a single workload by name.
///
/// When the caller names a kind that differs from the kind the workload
/// resolved to, the caller's kind is used to build it. A hinted controller
/// that resolution didn't reach (e.g. a CronJob with no running Jobs) is still
/// found when an object of that kind and name was fetched.
pub fn workload(
    resources: &NamespaceResources,
    name: &str,
    kind_hint: Option<&ControllerKind>,
    sidecar_annotation: &str,
) -> Option<Workload> {
    let index = resolve(resources, None);
    let resolved = match (index.get(name), kind_hint) {
        (Some(kind), _) => kind,
        (None, Some(hint)) if resources.contains(hint, name) => hint,
        (None, _) => return None,
    };
    let dispatch = kind_hint.unwrap_or(resolved);
    Materializer::new(resources, sidecar_annotation).workload(name, dispatch, resolved)
}

//! Resolves the set of top-level controllers in a namespace from the pods'
//! owner references.
//!
//! Pods usually point at an intermediate controller (a ReplicaSet, a
//! ReplicationController or a Job) rather than the object a user manages. The
//! index is first populated from the pods, then walked one hop up to replace
//! these children with their parents, and finally completed with controllers
//! that own no pods.

use std::collections::BTreeMap;
use workload_resolver_core::{controller_priority, ControllerKind};
use workload_resolver_k8s_api::{
    self as k8s, controller_refs, find_by_name, has_owner_references, Controller, Resource,
    ResourceExt, Selector,
};

/// The objects fetched from a single namespace for one resolution.
///
/// Kinds that were not fetched are left empty.
#[derive(Clone, Debug, Default)]
pub struct NamespaceResources {
    pub pods: Vec<k8s::Pod>,
    pub deployments: Vec<k8s::Deployment>,
    pub replica_sets: Vec<k8s::ReplicaSet>,
    pub replication_controllers: Vec<k8s::ReplicationController>,
    pub deployment_configs: Vec<k8s::DeploymentConfig>,
    pub stateful_sets: Vec<k8s::StatefulSet>,
    pub daemon_sets: Vec<k8s::DaemonSet>,
    pub jobs: Vec<k8s::Job>,
    pub cron_jobs: Vec<k8s::CronJob>,
}

// === impl NamespaceResources ===

impl NamespaceResources {
    /// Whether an object of the given kind and name was fetched.
    pub fn contains(&self, kind: &ControllerKind, name: &str) -> bool {
        match kind {
            ControllerKind::Deployment => find_by_name(&self.deployments, name).is_some(),
            ControllerKind::DeploymentConfig => {
                find_by_name(&self.deployment_configs, name).is_some()
            }
            ControllerKind::ReplicaSet => find_by_name(&self.replica_sets, name).is_some(),
            ControllerKind::ReplicationController => {
                find_by_name(&self.replication_controllers, name).is_some()
            }
            ControllerKind::StatefulSet => find_by_name(&self.stateful_sets, name).is_some(),
            ControllerKind::DaemonSet => find_by_name(&self.daemon_sets, name).is_some(),
            ControllerKind::Job => find_by_name(&self.jobs, name).is_some(),
            ControllerKind::CronJob => find_by_name(&self.cron_jobs, name).is_some(),
            ControllerKind::Pod => find_by_name(&self.pods, name).is_some(),
            ControllerKind::Custom(_) => false,
        }
    }
}

/// Maps each controller name to the single kind it resolved to. Ordered by
/// name, which is the order workloads are reported in.
pub type ControllerIndex = BTreeMap<String, ControllerKind>;

/// Builds the controller index for a namespace.
///
/// When a label selector is supplied, controllers that own no pods are only
/// added if their pod template matches it.
pub fn resolve(resources: &NamespaceResources, selector: Option<&str>) -> ControllerIndex {
    let mut index = index_pods(&resources.pods);
    resolve_parents(&mut index, resources);
    complete_orphans(&mut index, resources, selector);
    index
}

/// Records the controller of each pod. Pods without any owner are their own
/// controller.
pub fn index_pods(pods: &[k8s::Pod]) -> ControllerIndex {
    let mut index = ControllerIndex::new();
    for pod in pods {
        if has_owner_references(pod) {
            for owner in controller_refs(pod) {
                merge(&mut index, &owner.name, owner.kind.as_str().into());
            }
        } else {
            index
                .entry(pod.name_any())
                .or_insert(ControllerKind::Pod);
        }
    }
    index
}

/// Replaces child controllers with the controllers that own them.
///
/// Changes are computed against the index as it stands and applied afterwards:
/// children are removed first, then parents are merged in. A Job whose owning
/// CronJob no longer exists is kept, since nothing else will claim its pods.
pub fn resolve_parents(index: &mut ControllerIndex, resources: &NamespaceResources) {
    let mut removals = Vec::new();
    let mut parents = Vec::new();

    for (name, kind) in index.iter() {
        let owners = match kind {
            ControllerKind::ReplicaSet => owners_of(&resources.replica_sets, name),
            ControllerKind::ReplicationController => {
                owners_of(&resources.replication_controllers, name)
            }
            ControllerKind::Job => owners_of(&resources.jobs, name),
            _ => continue,
        };

        for (parent, parent_kind) in owners {
            let orphaned_job = *kind == ControllerKind::Job
                && parent_kind == ControllerKind::CronJob
                && find_by_name(&resources.cron_jobs, &parent).is_none();
            if orphaned_job {
                tracing::debug!(job = %name, cron_job = %parent, "CronJob no longer exists");
            } else {
                removals.push(name.clone());
            }
            parents.push((parent, parent_kind));
        }
    }

    for name in removals {
        index.remove(&name);
    }
    for (name, kind) in parents {
        merge(index, &name, kind);
    }
}

/// Adds controllers that currently own no pods, so that scaled-down
/// controllers are still reported.
///
/// ReplicaSets and ReplicationControllers are only added when nothing owns
/// them. A selector that can't be parsed is ignored.
pub fn complete_orphans(
    index: &mut ControllerIndex,
    resources: &NamespaceResources,
    selector: Option<&str>,
) {
    let selector = selector.filter(|s| !s.is_empty()).and_then(|s| {
        s.parse::<Selector>()
            .map_err(|error| tracing::error!(%error, selector = %s, "Invalid label selector"))
            .ok()
    });
    let selected = |controller: &dyn ControllerLabels| {
        selector
            .as_ref()
            .map_or(true, |sel| sel.matches(&controller.labels()))
    };

    let mut add = |name: String, kind: ControllerKind| {
        index.entry(name).or_insert(kind);
    };

    for d in resources.deployments.iter().filter(|d| selected(*d)) {
        add(d.name_any(), ControllerKind::Deployment);
    }
    for rs in resources.replica_sets.iter() {
        if !has_owner_references(rs) && selected(rs) {
            add(rs.name_any(), ControllerKind::ReplicaSet);
        }
    }
    for dc in resources.deployment_configs.iter().filter(|dc| selected(*dc)) {
        add(dc.name_any(), ControllerKind::DeploymentConfig);
    }
    for rc in resources.replication_controllers.iter() {
        if !has_owner_references(rc) && selected(rc) {
            add(rc.name_any(), ControllerKind::ReplicationController);
        }
    }
    for sts in resources.stateful_sets.iter().filter(|sts| selected(*sts)) {
        add(sts.name_any(), ControllerKind::StatefulSet);
    }
    for ds in resources.daemon_sets.iter().filter(|ds| selected(*ds)) {
        add(ds.name_any(), ControllerKind::DaemonSet);
    }
}

/// Inserts a controller, resolving a conflicting kind by priority.
fn merge(index: &mut ControllerIndex, name: &str, kind: ControllerKind) {
    match index.get_mut(name) {
        None => {
            index.insert(name.to_string(), kind);
        }
        Some(existing) if *existing != kind => {
            let winner = controller_priority(existing, &kind).clone();
            *existing = winner;
        }
        Some(_) => {}
    }
}

/// The controlling owners of the named object, if it was fetched.
fn owners_of<T: Resource>(objects: &[T], name: &str) -> Vec<(String, ControllerKind)>
where
    T: ResourceExt,
{
    find_by_name(objects, name)
        .into_iter()
        .flat_map(controller_refs)
        .map(|owner| (owner.name.clone(), owner.kind.as_str().into()))
        .collect()
}

/// Object-safe access to a controller's pod template labels.
trait ControllerLabels {
    fn labels(&self) -> k8s::Labels;
}

impl<C: Controller> ControllerLabels for C {
    fn labels(&self) -> k8s::Labels {
        self.template_labels()
    }
}

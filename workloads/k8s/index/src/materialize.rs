use crate::resolve::{ControllerIndex, NamespaceResources};
use workload_resolver_core::{
    pod::Pod,
    workload::{Replicas, Workload},
    ControllerKind,
};
use workload_resolver_k8s_api::{
    self as k8s, controller_refs, find_by_name, labels::Map, Controller, ResourceExt, Selector,
};

/// Builds workloads from resolved controllers and the objects they were
/// resolved from.
#[derive(Clone, Copy, Debug)]
pub struct Materializer<'r> {
    resources: &'r NamespaceResources,
    sidecar_annotation: &'r str,
}

impl<'r> Materializer<'r> {
    pub fn new(resources: &'r NamespaceResources, sidecar_annotation: &'r str) -> Self {
        Self {
            resources,
            sidecar_annotation,
        }
    }

    /// Materializes every entry of the index, in name order. Controllers whose
    /// object can't be found are left out.
    pub fn workloads(&self, index: &ControllerIndex) -> Vec<Workload> {
        index
            .iter()
            .filter_map(|(name, kind)| self.workload(name, kind, kind))
            .collect()
    }

    /// Materializes a single workload.
    ///
    /// `dispatch` selects how the workload is built and `resolved` is the kind
    /// found through pod ownership. They only differ when a caller asks for a
    /// workload by a kind other than the one it resolved to: the caller's kind
    /// wins, while a custom controller is still matched by its resolved kind.
    pub fn workload(
        &self,
        name: &str,
        dispatch: &ControllerKind,
        resolved: &ControllerKind,
    ) -> Option<Workload> {
        let res = self.resources;
        let workload = match dispatch {
            ControllerKind::Deployment => {
                self.controller(name, dispatch, &res.deployments, deployment_replicas)
            }
            ControllerKind::ReplicaSet => {
                self.controller(name, dispatch, &res.replica_sets, replica_set_replicas)
            }
            ControllerKind::ReplicationController => self.controller(
                name,
                dispatch,
                &res.replication_controllers,
                replication_controller_replicas,
            ),
            ControllerKind::DeploymentConfig => self.controller(
                name,
                dispatch,
                &res.deployment_configs,
                deployment_config_replicas,
            ),
            ControllerKind::StatefulSet => {
                self.controller(name, dispatch, &res.stateful_sets, stateful_set_replicas)
            }
            ControllerKind::DaemonSet => {
                self.controller(name, dispatch, &res.daemon_sets, daemon_set_replicas)
            }
            ControllerKind::Job => self.controller(name, dispatch, &res.jobs, job_replicas),
            ControllerKind::CronJob => {
                self.controller(name, dispatch, &res.cron_jobs, cron_job_replicas)
            }
            ControllerKind::Pod => self.pod(name),
            ControllerKind::Custom(_) => Some(self.custom(name, resolved)),
        };

        if workload.is_none() {
            if *dispatch == ControllerKind::CronJob {
                tracing::warn!(%name, "CronJob not found; its Jobs may have outlived it");
            } else {
                tracing::error!(%name, kind = %dispatch, "Workload not found");
            }
        }
        workload
    }

    /// Builds a workload from a controller, selecting pods by its pod template
    /// labels.
    fn controller<C: Controller>(
        &self,
        name: &str,
        kind: &ControllerKind,
        objects: &[C],
        replicas: fn(&C) -> Replicas,
    ) -> Option<Workload> {
        let object = find_by_name(objects, name)?;
        let labels = object.template_labels();
        let selector = Selector::from(&labels);

        let mut workload = Workload::new(name, kind.clone());
        workload.set_pods(self.select_pods(|pod| selector.matches_map(pod_labels(pod))));
        workload.labels = labels;
        workload.created_at = object.creation_timestamp();
        workload.resource_version = object.resource_version();
        workload.replicas = replicas(object);
        Some(workload)
    }

    fn pod(&self, name: &str) -> Option<Workload> {
        let pod = find_by_name(&self.resources.pods, name)?;
        let mut workload = Workload::new(name, ControllerKind::Pod);
        workload.set_pods(vec![Pod::parse(pod, self.sidecar_annotation)]);
        workload.labels = pod.metadata.labels.clone().into();
        workload.created_at = pod.metadata.creation_timestamp.clone();
        workload.resource_version = pod.resource_version();
        workload.replicas = Replicas {
            desired: 1,
            current: 1,
            available: 1,
        };
        Some(workload)
    }

    /// Builds a workload for a controller kind that isn't natively understood,
    /// e.g. a third-party rollout controller.
    ///
    /// Such controllers are expected to manage pods through ReplicaSets named
    /// after them. Pods are matched by owner reference, and the first matching
    /// ReplicaSet lends its metadata to the workload.
    fn custom(&self, name: &str, kind: &ControllerKind) -> Workload {
        let child_kind = if kind.is_ranked() {
            kind.as_str()
        } else {
            "ReplicaSet"
        };
        let pods = self.select_pods(|pod| {
            controller_refs(pod).any(|owner| {
                (owner.kind == child_kind && owner.name.starts_with(name))
                    || (owner.kind == kind.as_str() && owner.name == name)
            })
        });

        let mut workload = Workload::new(name, kind.clone());
        workload.set_pods(pods);

        match self
            .resources
            .replica_sets
            .iter()
            .find(|rs| rs.name_any().starts_with(name))
        {
            Some(rs) => {
                workload.labels = rs.template_labels();
                workload.created_at = rs.metadata.creation_timestamp.clone();
                workload.resource_version = rs.resource_version();
                workload.replicas = replica_set_replicas(rs);
            }
            None => {
                tracing::warn!(%name, %kind, "Workload has no ReplicaSet child; only its pods are reported");
            }
        }
        workload
    }

    fn select_pods(&self, matches: impl Fn(&k8s::Pod) -> bool) -> Vec<Pod> {
        self.resources
            .pods
            .iter()
            .filter(|&p| matches(p))
            .map(|p| Pod::parse(p, self.sidecar_annotation))
            .collect()
    }
}

fn pod_labels(pod: &k8s::Pod) -> &Map {
    static EMPTY: Map = Map::new();
    pod.metadata.labels.as_ref().unwrap_or(&EMPTY)
}

fn replicas(desired: Option<i32>, current: Option<i32>, available: Option<i32>) -> Replicas {
    Replicas {
        desired: desired.unwrap_or_default(),
        current: current.unwrap_or_default(),
        available: available.unwrap_or_default(),
    }
}

fn deployment_replicas(d: &k8s::Deployment) -> Replicas {
    let status = d.status.as_ref();
    replicas(
        d.spec.as_ref().and_then(|s| s.replicas),
        status.and_then(|s| s.replicas),
        status.and_then(|s| s.available_replicas),
    )
}

fn replica_set_replicas(rs: &k8s::ReplicaSet) -> Replicas {
    let status = rs.status.as_ref();
    replicas(
        rs.spec.as_ref().and_then(|s| s.replicas),
        status.map(|s| s.replicas),
        status.and_then(|s| s.available_replicas),
    )
}

fn replication_controller_replicas(rc: &k8s::ReplicationController) -> Replicas {
    let status = rc.status.as_ref();
    replicas(
        rc.spec.as_ref().and_then(|s| s.replicas),
        status.map(|s| s.replicas),
        status.and_then(|s| s.available_replicas),
    )
}

fn deployment_config_replicas(dc: &k8s::DeploymentConfig) -> Replicas {
    let status = dc.status.as_ref();
    replicas(
        dc.spec.replicas,
        status.and_then(|s| s.replicas),
        status.and_then(|s| s.available_replicas),
    )
}

fn stateful_set_replicas(sts: &k8s::StatefulSet) -> Replicas {
    let status = sts.status.as_ref();
    replicas(
        sts.spec.as_ref().and_then(|s| s.replicas),
        status.map(|s| s.replicas),
        status.and_then(|s| s.ready_replicas),
    )
}

fn daemon_set_replicas(ds: &k8s::DaemonSet) -> Replicas {
    let status = ds.status.as_ref();
    replicas(
        status.map(|s| s.desired_number_scheduled),
        status.map(|s| s.current_number_scheduled),
        status.and_then(|s| s.number_available),
    )
}

fn job_replicas(job: &k8s::Job) -> Replicas {
    let status = job.status.as_ref();
    replicas(
        job.spec.as_ref().and_then(|s| s.parallelism),
        status.and_then(|s| s.active),
        status.and_then(|s| s.succeeded),
    )
}

fn cron_job_replicas(cj: &k8s::CronJob) -> Replicas {
    let active = cj
        .status
        .as_ref()
        .and_then(|s| s.active.as_ref())
        .map(|a| a.len() as i32);
    replicas(active, active, active)
}

use crate::{
    api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        batch::v1::{CronJob, Job},
        core::v1::{PodTemplateSpec, ReplicationController},
    },
    DeploymentConfig, Labels, OwnerReference,
};
use kube::{Resource, ResourceExt};

/// A resource that manages pods stamped from a pod template.
pub trait Controller: Resource<DynamicType = ()> + ResourceExt {
    /// The pod template's labels. Pods created by the controller carry these
    /// labels, so they also act as the controller's pod selector.
    fn template_labels(&self) -> Labels;
}

/// Iterates over the owner references that mark their target as the managing
/// controller.
pub fn controller_refs<T: Resource>(resource: &T) -> impl Iterator<Item = &OwnerReference> {
    resource
        .meta()
        .owner_references
        .iter()
        .flatten()
        .filter(|owner| owner.controller == Some(true))
}

pub fn has_owner_references<T: Resource>(resource: &T) -> bool {
    resource
        .meta()
        .owner_references
        .as_ref()
        .is_some_and(|refs| !refs.is_empty())
}

/// Finds a resource by its exact name.
pub fn find_by_name<'r, T: ResourceExt>(resources: &'r [T], name: &str) -> Option<&'r T> {
    resources
        .iter()
        .find(|r| r.meta().name.as_deref() == Some(name))
}

fn labels_of(template: Option<&PodTemplateSpec>) -> Labels {
    template
        .and_then(|t| t.metadata.as_ref())
        .and_then(|m| m.labels.clone())
        .into()
}

impl Controller for Deployment {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.as_ref().map(|s| &s.template))
    }
}

impl Controller for ReplicaSet {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.as_ref().and_then(|s| s.template.as_ref()))
    }
}

impl Controller for ReplicationController {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.as_ref().and_then(|s| s.template.as_ref()))
    }
}

impl Controller for DeploymentConfig {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.template.as_ref())
    }
}

impl Controller for StatefulSet {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.as_ref().map(|s| &s.template))
    }
}

impl Controller for DaemonSet {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.as_ref().map(|s| &s.template))
    }
}

impl Controller for Job {
    fn template_labels(&self) -> Labels {
        labels_of(self.spec.as_ref().map(|s| &s.template))
    }
}

impl Controller for CronJob {
    fn template_labels(&self) -> Labels {
        labels_of(
            self.spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .map(|s| &s.template),
        )
    }
}

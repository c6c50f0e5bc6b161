#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod controller;
pub mod deployment_config;
pub mod labels;

pub use self::{
    controller::{controller_refs, find_by_name, has_owner_references, Controller},
    deployment_config::{DeploymentConfig, DeploymentConfigSpec, DeploymentConfigStatus},
    labels::{Labels, Selector},
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        batch::v1::{CronJob, Job},
        core::v1::{
            Container, Namespace, Pod, PodSpec, PodStatus, PodTemplateSpec,
            ReplicationController, Service,
        },
    },
    apimachinery::pkg::apis::meta::v1::{OwnerReference, Time},
};
pub use kube::{
    api::{ObjectMeta, Patch, PatchParams, ResourceExt},
    Client, Resource,
};

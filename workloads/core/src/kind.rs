use std::{fmt, str::FromStr};

/// The kind of object that owns a workload's pods.
///
/// Kinds the resolver does not know how to materialize are carried verbatim
/// as [`ControllerKind::Custom`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Deployment,
    DeploymentConfig,
    ReplicaSet,
    ReplicationController,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    Pod,
    Custom(String),
}

/// Picks the kind that wins when two controllers claim the same name.
///
/// The higher ranked kind wins; on equal rank the first argument is kept. Kinds
/// without a rank lose to every ranked kind.
pub fn controller_priority<'k>(
    first: &'k ControllerKind,
    second: &'k ControllerKind,
) -> &'k ControllerKind {
    let r1 = first.rank();
    if r1.is_none() {
        tracing::warn!(kind = %first, "Controller kind is not ranked");
    }
    let r2 = second.rank();
    if r2.is_none() {
        tracing::warn!(kind = %second, "Controller kind is not ranked");
    }

    // `None` orders below every `Some`.
    if r1 >= r2 {
        first
    } else {
        second
    }
}

// === impl ControllerKind ===

impl ControllerKind {
    /// Every kind a workload may be patched through.
    pub const PATCHABLE: [Self; 9] = [
        Self::Deployment,
        Self::ReplicaSet,
        Self::ReplicationController,
        Self::DeploymentConfig,
        Self::StatefulSet,
        Self::Job,
        Self::CronJob,
        Self::Pod,
        Self::DaemonSet,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Deployment => "Deployment",
            Self::DeploymentConfig => "DeploymentConfig",
            Self::ReplicaSet => "ReplicaSet",
            Self::ReplicationController => "ReplicationController",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Pod => "Pod",
            Self::Custom(kind) => kind,
        }
    }

    /// The tie-break rank of the kind, if it has one.
    pub fn rank(&self) -> Option<i32> {
        match self {
            Self::Deployment => Some(6),
            Self::DeploymentConfig => Some(5),
            Self::ReplicaSet => Some(4),
            Self::ReplicationController => Some(3),
            Self::StatefulSet => Some(2),
            Self::Job => Some(1),
            Self::DaemonSet => Some(0),
            Self::Pod => Some(-1),
            Self::CronJob | Self::Custom(_) => None,
        }
    }

    pub fn is_ranked(&self) -> bool {
        self.rank().is_some()
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<&str> for ControllerKind {
    fn from(kind: &str) -> Self {
        match kind {
            "Deployment" => Self::Deployment,
            "DeploymentConfig" => Self::DeploymentConfig,
            "ReplicaSet" => Self::ReplicaSet,
            "ReplicationController" => Self::ReplicationController,
            "StatefulSet" => Self::StatefulSet,
            "DaemonSet" => Self::DaemonSet,
            "Job" => Self::Job,
            "CronJob" => Self::CronJob,
            "Pod" => Self::Pod,
            kind => Self::Custom(kind.to_string()),
        }
    }
}

impl FromStr for ControllerKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for ControllerKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

use ahash::AHashSet as HashSet;
use regex::Regex;
use std::time::Duration;
use workload_resolver_core::ControllerKind;

/// Holds the settings that shape resolution. Passed explicitly to every
/// component that needs it.
#[derive(Clone, Debug)]
pub struct Config {
    /// Controller kinds that are never fetched.
    ///
    /// Deployments, ReplicaSets and Pods are always fetched, since ownership
    /// can't be resolved without them.
    pub excluded_workloads: HashSet<ControllerKind>,

    /// Namespaces that may be read at all. Unrestricted when unset.
    pub accessible_namespaces: Option<Vec<Regex>>,

    /// Namespaces that are served from the watch cache once it is synced.
    pub cached_namespaces: Vec<Regex>,

    /// E.g. "app"
    pub app_label: String,

    /// E.g. "version"
    pub version_label: String,

    /// The pod annotation that lists injected sidecar containers.
    pub sidecar_annotation: String,

    /// Upper bound on a single batch of fetches.
    pub fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            excluded_workloads: HashSet::default(),
            accessible_namespaces: None,
            cached_namespaces: Vec::new(),
            app_label: "app".to_string(),
            version_label: "version".to_string(),
            sidecar_annotation: "sidecar.istio.io/status".to_string(),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn is_workload_included(&self, kind: &ControllerKind) -> bool {
        match kind {
            ControllerKind::Deployment | ControllerKind::ReplicaSet | ControllerKind::Pod => true,
            kind => !self.excluded_workloads.contains(kind),
        }
    }

    pub fn is_namespace_accessible(&self, namespace: &str) -> bool {
        match self.accessible_namespaces.as_ref() {
            None => true,
            Some(patterns) => patterns.iter().any(|re| re.is_match(namespace)),
        }
    }
}

/// Compiles namespace patterns so that each must match a whole namespace name.
/// `**` is accepted as a shorthand for every namespace.
pub fn namespace_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| match p.as_ref() {
            "**" => Regex::new(".*"),
            p => Regex::new(&format!("^(?:{p})$")),
        })
        .collect()
}

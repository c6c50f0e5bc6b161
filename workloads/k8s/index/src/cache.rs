//! A watch-driven cache of the objects resolution reads most often.
//!
//! Each cached kind is fed by its own kubert watch. A namespace is only served
//! from the cache once it matches a configured pattern and every cached kind
//! has completed its initial listing; until then reads go to the API server.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use workload_resolver_core::Cache;
use workload_resolver_k8s_api::{self as k8s, labels::Map, ResourceExt, Selector};

pub type SharedCache = Arc<RwLock<NamespaceCache>>;

/// The number of kinds that must be synced before any namespace is served.
const CACHED_KINDS: usize = 6;

#[derive(Debug)]
pub struct NamespaceCache {
    patterns: Vec<Regex>,
    namespaces: HashMap<String, Namespace>,

    /// Kinds whose watch has completed at least one full listing.
    synced: HashSet<&'static str>,
}

/// Reads from a [`SharedCache`].
#[derive(Clone, Debug)]
pub struct Reader(SharedCache);

/// The objects cached for a single namespace.
#[derive(Debug, Default)]
pub struct Namespace {
    pods: HashMap<String, k8s::Pod>,
    deployments: HashMap<String, k8s::Deployment>,
    replica_sets: HashMap<String, k8s::ReplicaSet>,
    stateful_sets: HashMap<String, k8s::StatefulSet>,
    daemon_sets: HashMap<String, k8s::DaemonSet>,
    services: HashMap<String, k8s::Service>,
}

/// A resource kind held by the cache.
pub trait Cached: ResourceExt + Clone + Sized {
    const KIND: &'static str;

    fn store(ns: &mut Namespace) -> &mut HashMap<String, Self>;

    fn view(ns: &Namespace) -> &HashMap<String, Self>;
}

// === impl NamespaceCache ===

impl NamespaceCache {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self {
            patterns,
            namespaces: HashMap::default(),
            synced: HashSet::default(),
        }
    }

    pub fn shared(patterns: Vec<Regex>) -> (Reader, SharedCache) {
        let cache = Arc::new(RwLock::new(Self::new(patterns)));
        (Reader(cache.clone()), cache)
    }

    pub fn is_namespace_cached(&self, namespace: &str) -> bool {
        self.synced.len() == CACHED_KINDS && self.patterns.iter().any(|p| p.is_match(namespace))
    }

    /// The namespaces currently served from the cache, in name order.
    pub fn cached_namespaces(&self) -> Vec<String> {
        let mut names = self
            .namespaces
            .keys()
            .filter(|ns| self.is_namespace_cached(ns))
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// The number of objects of kind `R` held for the namespace.
    pub fn len<R: Cached>(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |ns| R::view(ns).len())
    }

    fn list<R: Cached>(&self, namespace: &str) -> Vec<R> {
        let mut objects = self
            .namespaces
            .get(namespace)
            .map(|ns| R::view(ns).values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        objects.sort_by_key(|o| o.name_any());
        objects
    }
}

impl<R: Cached> IndexNamespacedResource<R> for NamespaceCache {
    fn apply(&mut self, resource: R) {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        R::store(self.namespaces.entry(namespace).or_default()).insert(name, resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        if let Some(ns) = self.namespaces.get_mut(&namespace) {
            R::store(ns).remove(&name);
        }
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        for (namespace, names) in removed {
            for name in names {
                <Self as IndexNamespacedResource<R>>::delete(self, namespace.clone(), name);
            }
        }
        for resource in resources {
            <Self as IndexNamespacedResource<R>>::apply(self, resource);
        }
        if self.synced.insert(R::KIND) {
            tracing::debug!(kind = R::KIND, "Cache synced");
        }
    }
}

// === impl Reader ===

impl Cache for Reader {
    fn is_namespace_cached(&self, namespace: &str) -> bool {
        self.0.read().is_namespace_cached(namespace)
    }

    fn pods(&self, namespace: &str, selector: &Selector) -> Vec<k8s::Pod> {
        let mut pods = self.0.read().list::<k8s::Pod>(namespace);
        // The API server omits empty label maps.
        let unlabeled = Map::new();
        pods.retain(|p| selector.matches_map(p.metadata.labels.as_ref().unwrap_or(&unlabeled)));
        pods
    }

    fn deployments(&self, namespace: &str) -> Vec<k8s::Deployment> {
        self.0.read().list(namespace)
    }

    fn replica_sets(&self, namespace: &str) -> Vec<k8s::ReplicaSet> {
        self.0.read().list(namespace)
    }

    fn stateful_sets(&self, namespace: &str) -> Vec<k8s::StatefulSet> {
        self.0.read().list(namespace)
    }

    fn daemon_sets(&self, namespace: &str) -> Vec<k8s::DaemonSet> {
        self.0.read().list(namespace)
    }

    fn services(&self, namespace: &str) -> Vec<k8s::Service> {
        self.0.read().list(namespace)
    }
}

// === impl Cached ===

macro_rules! cached {
    ($ty:ty, $field:ident, $kind:literal) => {
        impl Cached for $ty {
            const KIND: &'static str = $kind;

            fn store(ns: &mut Namespace) -> &mut HashMap<String, Self> {
                &mut ns.$field
            }

            fn view(ns: &Namespace) -> &HashMap<String, Self> {
                &ns.$field
            }
        }
    };
}

cached!(k8s::Pod, pods, "Pod");
cached!(k8s::Deployment, deployments, "Deployment");
cached!(k8s::ReplicaSet, replica_sets, "ReplicaSet");
cached!(k8s::StatefulSet, stateful_sets, "StatefulSet");
cached!(k8s::DaemonSet, daemon_sets, "DaemonSet");
cached!(k8s::Service, services, "Service");

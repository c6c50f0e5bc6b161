use crate::cache::{Cached, NamespaceCache};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;

/// Records updates to the shared cache as they are applied.
pub struct CacheMetrics {
    cache: Arc<RwLock<NamespaceCache>>,

    objects: Family<NamespacedLabels, Gauge>,
    applies: Family<NamespacedLabels, Counter>,
    deletes: Family<NamespacedLabels, Counter>,
    resets: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NamespacedLabels {
    namespace: String,
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

// === impl CacheMetrics ===

impl CacheMetrics {
    pub fn register(cache: Arc<RwLock<NamespaceCache>>, prom: &mut Registry) -> Self {
        let objects = Family::default();
        prom.register(
            "cache_objects",
            "Gauge of the number of objects held in the cache",
            objects.clone(),
        );

        let applies = Family::default();
        prom.register(
            "cache_applies",
            "Count of objects applied to the cache",
            applies.clone(),
        );

        let deletes = Family::default();
        prom.register(
            "cache_deletes",
            "Count of objects deleted from the cache",
            deletes.clone(),
        );

        let resets = Family::default();
        prom.register(
            "cache_resets",
            "Count of full relistings applied to the cache",
            resets.clone(),
        );

        Self {
            cache,
            objects,
            applies,
            deletes,
            resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn labels<R: Cached>(namespace: String) -> NamespacedLabels {
        NamespacedLabels {
            namespace,
            kind: R::KIND.to_string(),
        }
    }

    fn observe_size<R: Cached>(&self, namespace: String) {
        let size = self.cache.read().len::<R>(&namespace);
        self.objects
            .get_or_create(&Self::labels::<R>(namespace))
            .set(size as i64);
    }
}

impl<R: Cached> IndexNamespacedResource<R> for CacheMetrics {
    fn apply(&mut self, resource: R) {
        let namespace = resource.namespace().unwrap_or_default();
        self.applies
            .get_or_create(&Self::labels::<R>(namespace.clone()))
            .inc();
        self.cache.write().apply(resource);
        self.observe_size::<R>(namespace);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.deletes
            .get_or_create(&Self::labels::<R>(namespace.clone()))
            .inc();
        <NamespaceCache as IndexNamespacedResource<R>>::delete(
            &mut self.cache.write(),
            namespace.clone(),
            name,
        );
        self.observe_size::<R>(namespace);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        let mut namespaces = resources
            .iter()
            .flat_map(|r| r.namespace())
            .chain(removed.keys().cloned())
            .collect::<Vec<_>>();
        namespaces.sort();
        namespaces.dedup();

        self.resets
            .get_or_create(&KindLabels {
                kind: R::KIND.to_string(),
            })
            .inc();
        self.cache.write().reset(resources, removed);
        for ns in namespaces {
            self.observe_size::<R>(ns);
        }
    }
}

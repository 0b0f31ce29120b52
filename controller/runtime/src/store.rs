//! In-memory caches of cluster resources, maintained by resource watches.

use crate::{
    config_secret::SecretApi,
    k8s::{
        self,
        configuration::{
            KongClusterPlugin, KongConsumer, KongIngress, KongPlugin, TCPIngress, UDPIngress,
        },
        Endpoints, Ingress, NamespacedName, ResourceExt, Secret, Service,
    },
};
use ahash::AHashMap as HashMap;
use kubert::index::{IndexClusterResource, IndexNamespacedResource};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedCache<K> = Arc<RwLock<Cache<K>>>;

/// Holds the latest observed state of every resource of one kind, keyed by
/// namespace and name. Cluster-scoped resources are kept under the empty
/// namespace.
#[derive(Debug)]
pub struct Cache<K> {
    namespaces: HashMap<String, HashMap<String, Arc<K>>>,
}

/// Read access to secrets.
#[async_trait::async_trait]
pub trait SecretLookup: Send + Sync {
    /// Returns `None` if the secret does not exist.
    async fn secret(&self, id: &NamespacedName) -> Result<Option<Arc<Secret>>, k8s::Error>;
}

/// Reads secrets from the cache, falling back to the API server for secrets
/// the cache has not observed.
///
/// The cache stays empty when the secret controller is disabled and is
/// incomplete until its watch has synced.
#[derive(Clone, Debug)]
pub struct SecretReader<A> {
    cache: SharedCache<Secret>,
    api: A,
}

/// The caches fed by the installed controllers.
///
/// Caches for controllers that are not installed simply stay empty. Admission
/// only reads `secrets`; the other caches hold the state that reconcilers
/// translate into proxy configuration.
#[derive(Clone, Debug, Default)]
pub struct Store {
    pub secrets: SharedCache<Secret>,
    pub services: SharedCache<Service>,
    pub endpoints: SharedCache<Endpoints>,
    pub ingresses: SharedCache<Ingress>,
    pub plugins: SharedCache<KongPlugin>,
    pub cluster_plugins: SharedCache<KongClusterPlugin>,
    pub consumers: SharedCache<KongConsumer>,
    pub kong_ingresses: SharedCache<KongIngress>,
    pub tcp_ingresses: SharedCache<TCPIngress>,
    pub udp_ingresses: SharedCache<UDPIngress>,
}

// === impl Cache ===

impl<K> Default for Cache<K> {
    fn default() -> Self {
        Self {
            namespaces: HashMap::default(),
        }
    }
}

impl<K> Cache<K> {
    pub fn shared() -> SharedCache<K> {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.namespaces.get(namespace)?.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, namespace: String, name: String, resource: K) {
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(name, Arc::new(resource));
    }

    fn remove(&mut self, namespace: &str, name: &str) {
        if let Some(resources) = self.namespaces.get_mut(namespace) {
            resources.remove(name);
            if resources.is_empty() {
                self.namespaces.remove(namespace);
            }
        }
    }
}

impl<K: ResourceExt> IndexNamespacedResource<K> for Cache<K> {
    fn apply(&mut self, resource: K) {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_unchecked();
        tracing::trace!(%namespace, %name, "Updating cache");
        self.insert(namespace, name, resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        tracing::trace!(%namespace, %name, "Removing from cache");
        self.remove(&namespace, &name);
    }
}

impl<K: ResourceExt> IndexClusterResource<K> for Cache<K> {
    fn apply(&mut self, resource: K) {
        let name = resource.name_unchecked();
        tracing::trace!(%name, "Updating cache");
        self.insert(String::new(), name, resource);
    }

    fn delete(&mut self, name: String) {
        tracing::trace!(%name, "Removing from cache");
        self.remove("", &name);
    }
}

// === impl Store ===

#[async_trait::async_trait]
impl SecretLookup for Store {
    async fn secret(&self, id: &NamespacedName) -> Result<Option<Arc<Secret>>, k8s::Error> {
        Ok(self.secrets.read().get(&id.namespace, &id.name))
    }
}

// === impl SecretReader ===

impl<A> SecretReader<A> {
    pub fn new(cache: SharedCache<Secret>, api: A) -> Self {
        Self { cache, api }
    }
}

#[async_trait::async_trait]
impl<A: SecretApi> SecretLookup for SecretReader<A> {
    async fn secret(&self, id: &NamespacedName) -> Result<Option<Arc<Secret>>, k8s::Error> {
        let cached = self.cache.read().get(&id.namespace, &id.name);
        if let Some(secret) = cached {
            return Ok(Some(secret));
        }

        tracing::debug!(secret = %id, "Secret not cached, reading from API");
        match self.api.get(id).await {
            Ok(secret) => Ok(Some(Arc::new(secret))),
            Err(error) if k8s::is_not_found(&error) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{ErrorResponse, ObjectMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn secret(ns: &str, name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn cached(store: &Store, ns: &str, name: &str) -> Option<Arc<Secret>> {
        store.secrets.read().get(ns, name)
    }

    fn api_error(code: u16) -> k8s::Error {
        k8s::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "secret lookup failed".to_string(),
            reason: "Failure".to_string(),
            code,
        })
    }

    /// Serves a single secret and counts reads.
    #[derive(Default)]
    struct FakeApi {
        secret: Option<Secret>,
        status: Option<u16>,
        reads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SecretApi for FakeApi {
        async fn get(&self, id: &NamespacedName) -> Result<Secret, k8s::Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.status {
                return Err(api_error(code));
            }
            self.secret
                .clone()
                .filter(|s| s.name_unchecked() == id.name)
                .ok_or_else(|| api_error(404))
        }

        async fn create(&self, _: &Secret) -> Result<Secret, k8s::Error> {
            unimplemented!("secrets are never created by lookups")
        }
    }

    #[test]
    fn namespaced_apply_and_delete() {
        let store = Store::default();
        {
            let mut secrets = store.secrets.write();
            IndexNamespacedResource::apply(&mut *secrets, secret("ns-0", "a"));
            IndexNamespacedResource::apply(&mut *secrets, secret("ns-1", "a"));
        }
        assert!(cached(&store, "ns-0", "a").is_some());
        assert!(cached(&store, "ns-1", "a").is_some());
        assert!(cached(&store, "ns-0", "b").is_none());
        assert_eq!(store.secrets.read().len(), 2);

        IndexNamespacedResource::<Secret>::delete(
            &mut *store.secrets.write(),
            "ns-0".to_string(),
            "a".to_string(),
        );
        assert!(cached(&store, "ns-0", "a").is_none());
        assert!(cached(&store, "ns-1", "a").is_some());
        assert_eq!(store.secrets.read().len(), 1);
    }

    #[test]
    fn cluster_resources() {
        let cache = Cache::<KongClusterPlugin>::shared();
        let plugin = KongClusterPlugin {
            metadata: ObjectMeta {
                name: Some("global-rl".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        IndexClusterResource::apply(&mut *cache.write(), plugin.clone());
        assert_eq!(cache.read().get("", "global-rl").as_deref(), Some(&plugin));

        IndexClusterResource::<KongClusterPlugin>::delete(
            &mut *cache.write(),
            "global-rl".to_string(),
        );
        assert!(cache.read().is_empty());
    }

    #[tokio::test]
    async fn store_reads_only_the_cache() {
        let store = Store::default();
        let id = NamespacedName::new("default", "rl-conf");
        assert!(store.secret(&id).await.unwrap().is_none());

        IndexNamespacedResource::apply(&mut *store.secrets.write(), secret("default", "rl-conf"));
        assert!(store.secret(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reader_prefers_the_cache() {
        let cache = Cache::<Secret>::shared();
        IndexNamespacedResource::apply(&mut *cache.write(), secret("default", "rl-conf"));
        let reader = SecretReader::new(cache, FakeApi::default());

        let found = reader
            .secret(&NamespacedName::new("default", "rl-conf"))
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(reader.api.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reader_falls_back_to_the_api() {
        // An empty cache, as when the secret controller is disabled.
        let reader = SecretReader::new(
            Cache::shared(),
            FakeApi {
                secret: Some(secret("default", "rl-conf")),
                ..Default::default()
            },
        );

        let found = reader
            .secret(&NamespacedName::new("default", "rl-conf"))
            .await
            .unwrap();
        assert_eq!(found.map(|s| s.name_unchecked()).as_deref(), Some("rl-conf"));

        let missing = reader
            .secret(&NamespacedName::new("default", "other"))
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(reader.api.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reader_returns_api_failures() {
        let reader = SecretReader::new(
            Cache::shared(),
            FakeApi {
                status: Some(403),
                ..Default::default()
            },
        );
        let err = reader
            .secret(&NamespacedName::new("default", "rl-conf"))
            .await
            .unwrap_err();
        assert!(k8s::is_status(&err, 403), "{err}");
    }
}

//! Index building and caching.
//!
//! [`IndexService::build_or_get_index`] is the entry point the query layer
//! calls. The flow:
//!
//! 1. Compute the cache key `<registry id>:fuse`.
//! 2. On a fresh hit, return the cached artifact.
//! 3. On a miss, take the per-key build lock, re-check the cache, then
//!    partition the registry's pages, build one index per bucket and
//!    store the result.
//!
//! Cached values are stored as `{ content_digest, config_fingerprint,
//! artifact }`. A hit is stale, and rebuilt under the same key, when either
//! the registry's page digest or the service's configuration fingerprint
//! (resolvers, index options, namespacing) has changed since it was built.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::fuse::{FuseIndexer, FuseOptions, IndexBackend};
use crate::models::ProjectedDocument;
use crate::partition::partition;
use crate::registry::SearchIndexNode;
use crate::resolver::{ResolverSet, DEFAULT_NAMESPACE};
use crate::store::ContentGraph;

/// Documents and the index built over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBucket {
    /// Projected documents in registry page order.
    pub documents: Vec<ProjectedDocument>,
    /// Serialized index produced by the [`IndexBackend`].
    pub index: Value,
}

/// The value served to clients.
///
/// Serializes as `{ documents, index }` without namespaces, or as
/// `{ <namespace>: { documents, index } }` with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexArtifact {
    Single(IndexBucket),
    Namespaced(BTreeMap<String, IndexBucket>),
}

impl IndexArtifact {
    /// Look up a bucket. Without namespaces only [`DEFAULT_NAMESPACE`] exists.
    pub fn bucket(&self, namespace: &str) -> Option<&IndexBucket> {
        match self {
            IndexArtifact::Single(bucket) => (namespace == DEFAULT_NAMESPACE).then_some(bucket),
            IndexArtifact::Namespaced(buckets) => buckets.get(namespace),
        }
    }

    /// `(namespace, document count)` for every bucket.
    pub fn summary(&self) -> Vec<(String, usize)> {
        match self {
            IndexArtifact::Single(bucket) => {
                vec![(DEFAULT_NAMESPACE.to_string(), bucket.documents.len())]
            }
            IndexArtifact::Namespaced(buckets) => buckets
                .iter()
                .map(|(ns, b)| (ns.clone(), b.documents.len()))
                .collect(),
        }
    }

    /// Documents across all buckets.
    pub fn document_count(&self) -> usize {
        self.summary().iter().map(|(_, n)| n).sum()
    }
}

#[derive(Serialize, Deserialize)]
struct CachedArtifact {
    content_digest: String,
    config_fingerprint: String,
    artifact: IndexArtifact,
}

/// Builds search indexes on demand and memoizes them in a [`Cache`].
pub struct IndexService {
    /// Source of the page nodes named by the registry.
    graph: Arc<dyn ContentGraph>,
    /// Built artifacts, keyed by `<registry id>:fuse`.
    cache: Arc<dyn Cache>,
    resolvers: ResolverSet,
    options: FuseOptions,
    /// Emit one bucket per namespace instead of a single flat bucket.
    use_namespaces: bool,
    backend: Arc<dyn IndexBackend>,
    /// SHA-256 over everything besides the pages that shapes the artifact.
    config_fingerprint: String,
    /// One lock per cache key so concurrent misses build once.
    build_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexService {
    /// Create a service using the Fuse-compatible index backend.
    ///
    /// Fails when the resolver shapes do not match `use_namespaces`.
    pub fn new(
        graph: Arc<dyn ContentGraph>,
        cache: Arc<dyn Cache>,
        resolvers: ResolverSet,
        options: FuseOptions,
        use_namespaces: bool,
    ) -> Result<Self> {
        resolvers.validate(use_namespaces)?;
        let config_fingerprint = config_fingerprint(&resolvers, &options, use_namespaces);
        Ok(Self {
            graph,
            cache,
            resolvers,
            options,
            use_namespaces,
            backend: Arc::new(FuseIndexer),
            config_fingerprint,
            build_locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Replace the index backend. Artifacts cached by another backend
    /// under the same configuration are still served.
    pub fn with_backend(mut self, backend: Arc<dyn IndexBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Graph the page nodes are read from.
    pub fn graph(&self) -> &Arc<dyn ContentGraph> {
        &self.graph
    }

    pub fn resolvers(&self) -> &ResolverSet {
        &self.resolvers
    }

    /// Fingerprint stored with every artifact this service caches.
    pub fn config_fingerprint(&self) -> &str {
        &self.config_fingerprint
    }

    /// Return the cached artifact for `registry`, building it on a miss.
    pub async fn build_or_get_index(&self, registry: &SearchIndexNode) -> Result<IndexArtifact> {
        let key = registry.cache_key();
        if let Some(artifact) = self.read_cached(&key, registry).await? {
            return Ok(artifact);
        }

        let lock = self.build_lock(&key);
        let _guard = lock.lock().await;

        // Another caller may have finished the build while we waited
        if let Some(artifact) = self.read_cached(&key, registry).await? {
            return Ok(artifact);
        }

        let artifact = self.build_index(registry)?;
        let entry = CachedArtifact {
            content_digest: registry.content_digest.clone(),
            config_fingerprint: self.config_fingerprint.clone(),
            artifact,
        };
        self.cache
            .set(&key, serde_json::to_value(&entry)?)
            .await
            .with_context(|| format!("Failed to store index under '{}'", key))?;
        Ok(entry.artifact)
    }

    /// Build the artifact without consulting the cache.
    pub fn build_index(&self, registry: &SearchIndexNode) -> Result<IndexArtifact> {
        if !self.options.has_keys() {
            error!("Fuse index requires keys to be set in fuse_options");
        }

        let mut parts = partition(&registry.pages, &self.resolvers, self.graph.lookup());
        let artifact = if self.use_namespaces {
            let mut buckets = BTreeMap::new();
            for (namespace, documents) in parts.into_buckets() {
                let bucket = self.build_bucket(&namespace, documents)?;
                buckets.insert(namespace, bucket);
            }
            IndexArtifact::Namespaced(buckets)
        } else {
            let documents = parts.take(DEFAULT_NAMESPACE).unwrap_or_default();
            IndexArtifact::Single(self.build_bucket(DEFAULT_NAMESPACE, documents)?)
        };

        info!(
            id = %registry.id,
            pages = registry.pages.len(),
            documents = artifact.document_count(),
            digest = %registry.content_digest,
            "Built search index"
        );
        Ok(artifact)
    }

    fn build_bucket(&self, namespace: &str, documents: Vec<ProjectedDocument>) -> Result<IndexBucket> {
        let index = self
            .backend
            .create_index(&self.options.keys, &documents, &self.options)
            .with_context(|| format!("Failed to build index for namespace '{}'", namespace))?;
        debug!(namespace, documents = documents.len(), "Built bucket index");
        Ok(IndexBucket { documents, index })
    }

    async fn read_cached(&self, key: &str, registry: &SearchIndexNode) -> Result<Option<IndexArtifact>> {
        let Some(value) = self.cache.get(key).await? else {
            return Ok(None);
        };
        let entry: CachedArtifact = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Unreadable cached index, rebuilding");
                return Ok(None);
            }
        };
        if entry.content_digest != registry.content_digest {
            debug!(key, cached = %entry.content_digest, current = %registry.content_digest, "Cached index is stale");
            return Ok(None);
        }
        if entry.config_fingerprint != self.config_fingerprint {
            info!(key, "Index configuration changed, rebuilding cached index");
            return Ok(None);
        }
        debug!(key, "Using cached index");
        Ok(Some(entry.artifact))
    }

    fn build_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// Hash of the resolver shape, index options and namespacing mode.
fn config_fingerprint(resolvers: &ResolverSet, options: &FuseOptions, use_namespaces: bool) -> String {
    let described = json!({
        "resolvers": resolvers.describe(),
        "options": options,
        "use_namespaces": use_namespaces,
    });
    let mut hasher = Sha256::new();
    hasher.update(described.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

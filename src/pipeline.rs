//! End-to-end build pipeline.
//!
//! Wires a [`Config`] into the collaborators the index build needs: an
//! in-memory content graph, the eligibility filter, the resolver set, the
//! configured cache and the query layer. The CLI and the integration tests
//! both drive builds through [`Pipeline`].
//!
//! ```text
//! nodes ──▶ create_node ──▶ on_node_created ──▶ registry
//!                                                   │
//!            snapshot ◀── query layer ◀── index service (cache)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::{Cache, FileCache, InMemoryCache};
use crate::config::Config;
use crate::index::{IndexArtifact, IndexService};
use crate::ingest::{filter_from_config, touch_owned_nodes, IngestOutcome, Ingestor};
use crate::models::SourceNode;
use crate::registry::SearchIndexNode;
use crate::resolver::ResolverSet;
use crate::serve::{write_snapshot, QueryLayer};
use crate::store::memory::InMemoryGraph;
use crate::store::ContentGraph;

/// Counts from one ingestion pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Nodes stored in the graph.
    pub seen: usize,
    /// Nodes appended to the registry.
    pub appended: usize,
    /// Nodes whose type has no resolvers.
    pub unsupported: usize,
    /// Nodes rejected by the filter.
    pub filtered: usize,
}

/// Result of a completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Registry aggregate the artifact was built from; `None` when no page
    /// was ever ingested.
    pub registry: Option<SearchIndexNode>,
    /// Built (or cached) artifact; `None` together with `registry`.
    pub artifact: Option<IndexArtifact>,
    /// Snapshot file written, if one is configured and the write succeeded.
    pub snapshot: Option<PathBuf>,
}

impl BuildReport {
    /// Registry length, `0` when there is no registry.
    pub fn pages(&self) -> usize {
        self.registry.as_ref().map_or(0, SearchIndexNode::len)
    }
}

/// Graph, ingestor and query layer for one configuration.
pub struct Pipeline {
    config: Config,
    graph: Arc<InMemoryGraph>,
    ingestor: Ingestor,
    query: Arc<QueryLayer>,
}

impl Pipeline {
    /// Build the collaborators for `config`. Resolvers come from the
    /// `[resolvers]` tables.
    pub fn new(config: &Config) -> Result<Self> {
        let resolvers =
            ResolverSet::from_specs(&config.resolvers, config.index.use_resolver_namespaces)?;
        Self::with_resolvers(config, resolvers)
    }

    /// Like [`Pipeline::new`] with resolvers registered in code.
    pub fn with_resolvers(config: &Config, resolvers: ResolverSet) -> Result<Self> {
        let graph = Arc::new(InMemoryGraph::new());
        let cache: Arc<dyn Cache> = match &config.cache.dir {
            Some(dir) => Arc::new(FileCache::new(dir.clone())),
            None => Arc::new(InMemoryCache::new()),
        };

        let ingestor = Ingestor::new(graph.clone(), &resolvers, config.index.id.clone())
            .with_filter(filter_from_config(&config.filter));
        let service = IndexService::new(
            graph.clone(),
            cache,
            resolvers,
            config.fuse_options.clone(),
            config.index.use_resolver_namespaces,
        )
        .context("Invalid resolver configuration")?;
        let query = Arc::new(QueryLayer::new(Arc::new(service), config.index.id.clone()));

        Ok(Self {
            config: config.clone(),
            graph,
            ingestor,
            query,
        })
    }

    /// Graph holding every ingested node.
    pub fn graph(&self) -> &Arc<InMemoryGraph> {
        &self.graph
    }

    /// Query layer shared with the HTTP server.
    pub fn query(&self) -> Arc<QueryLayer> {
        self.query.clone()
    }

    /// Store every node in the graph and offer it to the registry.
    pub async fn ingest(&self, nodes: Vec<SourceNode>) -> Result<IngestStats> {
        touch_owned_nodes(&*self.graph, self.ingestor.index_id()).await?;

        let mut stats = IngestStats::default();
        for node in nodes {
            stats.seen += 1;
            self.graph.create_node(node.clone()).await?;
            match self.ingestor.on_node_created(&node).await? {
                IngestOutcome::Appended { .. } => stats.appended += 1,
                IngestOutcome::UnsupportedType => stats.unsupported += 1,
                IngestOutcome::Filtered => stats.filtered += 1,
            }
        }

        info!(
            seen = stats.seen,
            appended = stats.appended,
            unsupported = stats.unsupported,
            filtered = stats.filtered,
            "Ingestion complete"
        );
        Ok(stats)
    }

    /// Build (or fetch from cache) the index for the current registry.
    pub async fn build(&self) -> Result<(Option<SearchIndexNode>, Option<IndexArtifact>)> {
        let registry = self.graph.get_search_index(self.ingestor.index_id()).await?;
        let artifact = match &registry {
            Some(node) => Some(self.query.resolve_fuse(node).await?.into_artifact()),
            None => None,
        };
        Ok((registry, artifact))
    }

    /// Build the index and write the snapshot file if one is configured.
    pub async fn build_and_snapshot(&self) -> Result<BuildReport> {
        let (registry, artifact) = self.build().await?;
        let snapshot = write_snapshot(&self.query, &self.config.index).await;
        Ok(BuildReport {
            registry,
            artifact,
            snapshot,
        })
    }
}

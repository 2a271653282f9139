//! Node ingestion: the eligibility filter and registry appends.
//!
//! The host calls [`Ingestor::on_node_created`] once per discovered node.
//! Eligible nodes are appended to the registry node, which is persisted
//! back to the content graph. Nothing is projected here; projection waits
//! until the index is requested.
//!
//! The read → append → upsert sequence runs under an async mutex, so
//! concurrent calls never lose appends.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::models::SourceNode;
use crate::registry::SearchIndexNode;
use crate::resolver::ResolverSet;
use crate::store::{ContentGraph, NodeLookup, UpsertOutcome};

/// Optional eligibility predicate: `(node, lookup) -> keep?`.
pub type NodeFilter = Arc<dyn Fn(&SourceNode, &dyn NodeLookup) -> bool + Send + Sync>;

/// What happened to a node offered for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended; carries the registry length after the append.
    Appended { pages: usize },
    /// No resolvers are configured for the node's type.
    UnsupportedType,
    /// The filter predicate returned `false`.
    Filtered,
}

/// Decides which created nodes join the registry and appends them.
///
/// Appends are serialized so concurrent ingests never lose a page.
pub struct Ingestor {
    graph: Arc<dyn ContentGraph>,
    /// Registry node id, `SearchIndex < Site` unless configured.
    index_id: String,
    /// Types with registered resolvers.
    types: BTreeSet<String>,
    filter: Option<NodeFilter>,
    /// Held across the read, append and upsert of the registry.
    append_lock: Mutex<()>,
}

impl Ingestor {
    /// Accept every type `resolvers` knows about, with no filter.
    pub fn new(graph: Arc<dyn ContentGraph>, resolvers: &ResolverSet, index_id: impl Into<String>) -> Self {
        Self {
            graph,
            index_id: index_id.into(),
            types: resolvers.types().map(str::to_string).collect(),
            filter: None,
            append_lock: Mutex::new(()),
        }
    }

    /// Install (or clear) the eligibility predicate, checked after the type.
    pub fn with_filter(mut self, filter: Option<NodeFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    /// Offer a newly discovered node to the registry.
    pub async fn on_node_created(&self, node: &SourceNode) -> Result<IngestOutcome> {
        if !self.types.contains(&node.node_type) {
            debug!(id = %node.id, node_type = %node.node_type, "Node type not indexed");
            return Ok(IngestOutcome::UnsupportedType);
        }

        if let Some(filter) = &self.filter {
            if !filter(node, self.graph.lookup()) {
                debug!(id = %node.id, "Node rejected by filter");
                return Ok(IngestOutcome::Filtered);
            }
        }

        let _guard = self.append_lock.lock().await;
        let current = self
            .graph
            .get_search_index(&self.index_id)
            .await?
            .unwrap_or_else(|| SearchIndexNode::with_id(self.index_id.clone()));
        let next = current.append(&node.id);
        let outcome = self.graph.upsert_search_index(&next).await?;
        if outcome == UpsertOutcome::Created {
            info!(id = %self.index_id, "Created search index node");
        }
        debug!(id = %node.id, pages = next.len(), "Appended page to search index");

        Ok(IngestOutcome::Appended { pages: next.len() })
    }
}

/// Keep the existing registry node alive for this build.
///
/// Returns `false` when no registry node exists yet.
pub async fn touch_owned_nodes(graph: &dyn ContentGraph, index_id: &str) -> Result<bool> {
    let touched = graph.touch_node(index_id).await?;
    if touched {
        debug!(id = index_id, "Touched existing search index node");
    }
    Ok(touched)
}

/// Build a [`NodeFilter`] from the declarative `[filter]` section.
///
/// Returns `None` when the section imposes no constraints.
pub fn filter_from_config(config: &FilterConfig) -> Option<NodeFilter> {
    if config.is_empty() {
        return None;
    }
    let required = config.require_fields.clone();
    let exclude_drafts = config.exclude_drafts;
    Some(Arc::new(move |node: &SourceNode, _: &dyn NodeLookup| {
        if exclude_drafts && node.field("draft") == Some(&Value::Bool(true)) {
            return false;
        }
        if required.is_empty() {
            return true;
        }
        let rendered = node.to_value();
        required
            .iter()
            .all(|p| rendered.pointer(p).is_some_and(|v| !v.is_null()))
    }))
}

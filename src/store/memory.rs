//! In-memory [`ContentGraph`] implementation for the CLI and tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Creation order is
//! tracked separately so by-type and all-node lookups are deterministic.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::models::SourceNode;
use crate::registry::SearchIndexNode;

use super::{ContentGraph, NodeLookup, UpsertOutcome};

/// In-memory content graph.
pub struct InMemoryGraph {
    nodes: RwLock<HashMap<String, SourceNode>>,
    order: RwLock<Vec<String>>,
    indexes: RwLock<HashMap<String, SearchIndexNode>>,
    touched: RwLock<HashSet<String>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            indexes: RwLock::new(HashMap::new()),
            touched: RwLock::new(HashSet::new()),
        }
    }

    /// Build a graph pre-populated with `nodes`.
    pub fn from_nodes(nodes: impl IntoIterator<Item = SourceNode>) -> Self {
        let graph = Self::new();
        for node in nodes {
            graph.insert(node);
        }
        graph
    }

    /// Whether [`ContentGraph::touch_node`] was called for `id`.
    pub fn was_touched(&self, id: &str) -> bool {
        self.touched
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn insert(&self, node: SourceNode) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if !nodes.contains_key(&node.id) {
            self.order
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(node.id.clone());
        }
        nodes.insert(node.id.clone(), node);
    }

    fn collect(&self, keep: impl Fn(&SourceNode) -> bool) -> Vec<SourceNode> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let order = self.order.read().unwrap_or_else(PoisonError::into_inner);
        order
            .iter()
            .filter_map(|id| nodes.get(id))
            .filter(|n| keep(n))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeLookup for InMemoryGraph {
    fn get_node(&self, id: &str) -> Option<SourceNode> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn get_nodes_by_type(&self, node_type: &str) -> Vec<SourceNode> {
        self.collect(|n| n.node_type == node_type)
    }

    fn get_nodes(&self) -> Vec<SourceNode> {
        self.collect(|_| true)
    }
}

#[async_trait]
impl ContentGraph for InMemoryGraph {
    fn lookup(&self) -> &dyn NodeLookup {
        self
    }

    async fn create_node(&self, node: SourceNode) -> Result<()> {
        self.insert(node);
        Ok(())
    }

    async fn get_search_index(&self, id: &str) -> Result<Option<SearchIndexNode>> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(indexes.get(id).cloned())
    }

    async fn upsert_search_index(&self, node: &SearchIndexNode) -> Result<UpsertOutcome> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let outcome = match indexes.get(&node.id) {
            None => UpsertOutcome::Created,
            Some(prev) if prev.content_digest == node.content_digest => {
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Changed,
        };
        indexes.insert(node.id.clone(), node.clone());
        debug!(id = %node.id, pages = node.pages.len(), digest = %node.content_digest, ?outcome, "Stored search index node");
        Ok(outcome)
    }

    async fn touch_node(&self, id: &str) -> Result<bool> {
        let exists = self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
            || self
                .nodes
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(id);
        if exists {
            self.touched
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.to_string());
        }
        Ok(exists)
    }
}

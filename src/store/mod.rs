//! Content graph abstraction.
//!
//! The host system owns every page node and the registry node. The pipeline
//! talks to it through two traits:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`NodeLookup`] | Synchronous reads handed to resolvers and filters |
//! | [`ContentGraph`] | Async node creation, registry persistence, touching |
//!
//! [`memory::InMemoryGraph`] implements both and backs the CLI and tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SourceNode;
use crate::registry::SearchIndexNode;

/// Read-only node lookups available to field resolvers and filters.
///
/// Mirrors the single-node, by-type and all-nodes lookups of the host.
pub trait NodeLookup: Send + Sync {
    /// Fetch one node by ID.
    fn get_node(&self, id: &str) -> Option<SourceNode>;

    /// All nodes with the given type tag, in creation order.
    fn get_nodes_by_type(&self, node_type: &str) -> Vec<SourceNode>;

    /// Every node, in creation order.
    fn get_nodes(&self) -> Vec<SourceNode>;
}

/// Result of persisting the registry node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No registry existed under this ID before.
    Created,
    /// The stored content digest differed and was replaced.
    Changed,
    /// The stored content digest matched; nothing was written.
    Unchanged,
}

/// Mutable side of the host content graph.
#[async_trait]
pub trait ContentGraph: NodeLookup {
    /// This graph as the read-only view handed to resolvers and filters.
    fn lookup(&self) -> &dyn NodeLookup;

    /// Insert or replace a page node.
    async fn create_node(&self, node: SourceNode) -> Result<()>;

    /// Load the registry node stored under `id`.
    async fn get_search_index(&self, id: &str) -> Result<Option<SearchIndexNode>>;

    /// Persist the registry node, comparing content digests with the
    /// previously stored version.
    async fn upsert_search_index(&self, node: &SearchIndexNode) -> Result<UpsertOutcome>;

    /// Mark a node as still in use for this build. Returns `false` when no
    /// node exists under `id`.
    async fn touch_node(&self, id: &str) -> Result<bool>;
}

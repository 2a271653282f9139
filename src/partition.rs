//! Namespace partitioning of projected documents.
//!
//! A single pass over the registry's pages fetches each node, projects it
//! through the [`ResolverSet`] and routes every resulting document into
//! its namespace bucket. Buckets are created on first use; within a bucket
//! documents keep page order.

use std::collections::BTreeMap;

use tracing::warn;

use crate::models::ProjectedDocument;
use crate::resolver::ResolverSet;
use crate::store::NodeLookup;

/// Projected documents grouped by namespace.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Partitions {
    /// Namespace to documents, in page order.
    buckets: BTreeMap<String, Vec<ProjectedDocument>>,
}

impl Partitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `doc` to its namespace, creating the bucket if needed.
    pub fn push(&mut self, namespace: String, doc: ProjectedDocument) {
        self.buckets.entry(namespace).or_default().push(doc);
    }

    /// Documents in one bucket, `None` if nothing was routed there.
    pub fn get(&self, namespace: &str) -> Option<&[ProjectedDocument]> {
        self.buckets.get(namespace).map(Vec::as_slice)
    }

    /// Remove and return one bucket.
    pub fn take(&mut self, namespace: &str) -> Option<Vec<ProjectedDocument>> {
        self.buckets.remove(namespace)
    }

    /// Namespaces with at least one document, sorted.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn into_buckets(self) -> BTreeMap<String, Vec<ProjectedDocument>> {
        self.buckets
    }
}

/// Project every page and group the documents by namespace.
///
/// Pages that no longer resolve to a node are skipped with a warning.
pub fn partition(pages: &[String], resolvers: &ResolverSet, lookup: &dyn NodeLookup) -> Partitions {
    let mut partitions = Partitions::new();
    for page_id in pages {
        let Some(node) = lookup.get_node(page_id) else {
            warn!(id = %page_id, "Indexed page no longer exists, skipping");
            continue;
        };
        for (namespace, doc) in resolvers.project(&node, lookup) {
            partitions.push(namespace, doc);
        }
    }
    partitions
}

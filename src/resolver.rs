//! Field projection: turning source nodes into search documents.
//!
//! A [`ResolverSet`] maps a node type tag to the field resolvers that apply
//! to it. Each type is either *flat* (one `field → resolver` table) or
//! *namespaced* (`namespace → field → resolver`). Projection runs every
//! resolver against the node and emits one [`ProjectedDocument`] per
//! namespace; flat types emit a single document under
//! [`DEFAULT_NAMESPACE`].
//!
//! # Example
//!
//! ```rust
//! use serde_json::Value;
//! use site_search_index::models::SourceNode;
//! use site_search_index::resolver::{FieldResolvers, ResolverSet};
//! use site_search_index::store::NodeLookup;
//! use site_search_index::store::memory::InMemoryGraph;
//!
//! let resolvers = ResolverSet::new().with_fields(
//!     "BlogPost",
//!     FieldResolvers::new().field("title", |node: &SourceNode, _: &dyn NodeLookup| {
//!         node.field("title").cloned().unwrap_or(Value::Null)
//!     }),
//! );
//!
//! let node = SourceNode::new("p1", "BlogPost").with_field("title", "Hello");
//! let graph = InMemoryGraph::new();
//! let docs = resolvers.project(&node, &graph);
//! assert_eq!(docs.len(), 1);
//! assert_eq!(docs[0].1.get("title").unwrap(), "Hello");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::ResolverSpec;
use crate::models::{ProjectedDocument, SourceNode};
use crate::store::NodeLookup;

/// Bucket name used when namespacing is disabled.
pub const DEFAULT_NAMESPACE: &str = "__defaultNamespace";

/// Extracts one field value from a node.
///
/// Implemented for any `Fn(&SourceNode, &dyn NodeLookup) -> Value`, so
/// closures can be registered directly.
pub trait FieldResolver: Send + Sync {
    /// Compute the field value for `node`.
    fn resolve(&self, node: &SourceNode, lookup: &dyn NodeLookup) -> Value;

    /// Stable description of what this resolver reads, if it has one.
    ///
    /// Part of the configuration fingerprint stored with cached indexes.
    /// Closures have no description and are identified by field name only.
    fn describe(&self) -> Option<String> {
        None
    }
}

impl<F> FieldResolver for F
where
    F: Fn(&SourceNode, &dyn NodeLookup) -> Value + Send + Sync,
{
    fn resolve(&self, node: &SourceNode, lookup: &dyn NodeLookup) -> Value {
        self(node, lookup)
    }
}

/// Reads a value out of the node with a JSON pointer (`/frontmatter/title`).
///
/// The pointer is evaluated against the node rendered as one object, so
/// `/id`, `/type` and `/date` work as well. Missing paths yield `null`.
#[derive(Debug, Clone)]
pub struct PointerResolver {
    pointer: String,
}

impl PointerResolver {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

impl FieldResolver for PointerResolver {
    fn resolve(&self, node: &SourceNode, _lookup: &dyn NodeLookup) -> Value {
        node.to_value()
            .pointer(&self.pointer)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn describe(&self) -> Option<String> {
        Some(self.pointer.clone())
    }
}

/// Ordered `field name → resolver` table.
#[derive(Clone, Default)]
pub struct FieldResolvers {
    fields: Vec<(String, Arc<dyn FieldResolver>)>,
}

impl FieldResolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver. A later resolver with the same name replaces the
    /// earlier one.
    pub fn field(mut self, name: impl Into<String>, resolver: impl FieldResolver + 'static) -> Self {
        let name = name.into();
        self.fields.retain(|(n, _)| *n != name);
        self.fields.push((name, Arc::new(resolver)));
        self
    }

    /// Field names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `[[name, description], ...]` in registration order.
    pub fn describe(&self) -> Value {
        Value::Array(
            self.fields
                .iter()
                .map(|(name, resolver)| json!([name, resolver.describe()]))
                .collect(),
        )
    }

    /// Produce `{ id, date, <fields...> }` for one node.
    pub fn project(&self, node: &SourceNode, lookup: &dyn NodeLookup) -> ProjectedDocument {
        let mut doc = ProjectedDocument::new(&node.id, node.date.as_ref());
        for (name, resolver) in &self.fields {
            doc.insert(name.clone(), resolver.resolve(node, lookup));
        }
        doc
    }
}

#[derive(Clone)]
enum TypeResolvers {
    Flat(FieldResolvers),
    Namespaced(Vec<(String, FieldResolvers)>),
}

/// Resolver configuration for every indexable node type.
///
/// Immutable once handed to the index service.
#[derive(Clone, Default)]
pub struct ResolverSet {
    types: BTreeMap<String, TypeResolvers>,
}

impl ResolverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flat resolver table for `node_type`.
    pub fn with_fields(mut self, node_type: impl Into<String>, fields: FieldResolvers) -> Self {
        self.types
            .insert(node_type.into(), TypeResolvers::Flat(fields));
        self
    }

    /// Register a resolver table for one namespace of `node_type`.
    pub fn with_namespace(
        mut self,
        node_type: impl Into<String>,
        namespace: impl Into<String>,
        fields: FieldResolvers,
    ) -> Self {
        let namespace = namespace.into();
        let entry = self
            .types
            .entry(node_type.into())
            .or_insert_with(|| TypeResolvers::Namespaced(Vec::new()));
        if matches!(entry, TypeResolvers::Flat(_)) {
            *entry = TypeResolvers::Namespaced(Vec::new());
        }
        if let TypeResolvers::Namespaced(spaces) = entry {
            spaces.retain(|(n, _)| *n != namespace);
            spaces.push((namespace, fields));
        }
        self
    }

    /// Build a resolver set from declarative pointer specs.
    pub fn from_specs(
        specs: &BTreeMap<String, BTreeMap<String, ResolverSpec>>,
        namespaced: bool,
    ) -> Result<Self> {
        let mut set = Self::new();
        for (node_type, entries) in specs {
            if namespaced {
                // A type with no namespaces is still eligible for ingestion
                set.types
                    .entry(node_type.clone())
                    .or_insert_with(|| TypeResolvers::Namespaced(Vec::new()));
                for (namespace, spec) in entries {
                    let ResolverSpec::Namespace(fields) = spec else {
                        bail!(
                            "resolvers.{}.{} must be a table of fields when namespaces are enabled",
                            node_type,
                            namespace
                        );
                    };
                    let table = fields.iter().fold(FieldResolvers::new(), |acc, (f, p)| {
                        acc.field(f.clone(), PointerResolver::new(p.clone()))
                    });
                    set = set.with_namespace(node_type.clone(), namespace.clone(), table);
                }
            } else {
                let mut table = FieldResolvers::new();
                for (field, spec) in entries {
                    let ResolverSpec::Pointer(pointer) = spec else {
                        bail!(
                            "resolvers.{}.{} must be a JSON pointer string when namespaces are disabled",
                            node_type,
                            field
                        );
                    };
                    table = table.field(field.clone(), PointerResolver::new(pointer.clone()));
                }
                set = set.with_fields(node_type.clone(), table);
            }
        }
        Ok(set)
    }

    /// Type tags with a registered resolver entry.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// `true` when nodes of `node_type` are eligible for ingestion.
    pub fn handles(&self, node_type: &str) -> bool {
        self.types.contains_key(node_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Types, namespaces, field names and what each field reads.
    ///
    /// Closures that differ only in their body describe the same.
    pub fn describe(&self) -> Value {
        let mut out = Map::new();
        for (node_type, entry) in &self.types {
            let shape = match entry {
                TypeResolvers::Flat(fields) => json!({ "flat": fields.describe() }),
                TypeResolvers::Namespaced(spaces) => {
                    let spaces: Map<String, Value> = spaces
                        .iter()
                        .map(|(ns, fields)| (ns.clone(), fields.describe()))
                        .collect();
                    json!({ "namespaces": spaces })
                }
            };
            out.insert(node_type.clone(), shape);
        }
        Value::Object(out)
    }

    /// Check that every type entry matches the requested namespacing mode.
    pub fn validate(&self, use_namespaces: bool) -> Result<()> {
        for (node_type, entry) in &self.types {
            match (entry, use_namespaces) {
                (TypeResolvers::Flat(_), true) => bail!(
                    "resolvers for '{}' are flat but resolver namespaces are enabled",
                    node_type
                ),
                (TypeResolvers::Namespaced(_), false) => bail!(
                    "resolvers for '{}' are namespaced but resolver namespaces are disabled",
                    node_type
                ),
                _ => {}
            }
        }
        Ok(())
    }

    /// Project a node into `(namespace, document)` pairs.
    ///
    /// Nodes whose type has no entry produce nothing.
    pub fn project(
        &self,
        node: &SourceNode,
        lookup: &dyn NodeLookup,
    ) -> Vec<(String, ProjectedDocument)> {
        match self.types.get(&node.node_type) {
            None => {
                debug!(id = %node.id, node_type = %node.node_type, "No resolvers for node type, skipping");
                Vec::new()
            }
            Some(TypeResolvers::Flat(fields)) => {
                vec![(DEFAULT_NAMESPACE.to_string(), fields.project(node, lookup))]
            }
            Some(TypeResolvers::Namespaced(spaces)) => spaces
                .iter()
                .map(|(ns, fields)| (ns.clone(), fields.project(node, lookup)))
                .collect(),
        }
    }
}

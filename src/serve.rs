//! Serving adapter between the index service and the query layer.
//!
//! The built artifact is exposed as [`SearchIndexScalar`], an output-only
//! value: it serializes to JSON but can never be parsed back from client
//! input. [`QueryLayer`] resolves the `fuse` field of the registry node,
//! and [`write_snapshot`] copies the full query result to disk after a
//! build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::config::IndexConfig;
use crate::index::{IndexArtifact, IndexService};
use crate::registry::{SearchIndexNode, SEARCH_INDEX_TYPE};

/// GraphQL-style name of the scalar type.
pub const SCALAR_NAME: &str = "SiteSearchIndex_Fuse";

/// Description published with [`SCALAR_NAME`].
pub const SCALAR_DESCRIPTION: &str = "Serialized fusejs search index and documents";

/// Errors from the scalar's input side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScalarError {
    /// The scalar is computed server-side and never accepted as input.
    #[error("Not supported")]
    NotSupported,
}

/// Output-only wrapper around the built artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexScalar(IndexArtifact);

impl SearchIndexScalar {
    pub fn new(artifact: IndexArtifact) -> Self {
        Self(artifact)
    }

    pub fn artifact(&self) -> &IndexArtifact {
        &self.0
    }

    pub fn into_artifact(self) -> IndexArtifact {
        self.0
    }

    /// Serialize for the wire. The artifact passes through unchanged.
    pub fn serialize_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }

    /// Parsing a client-supplied variable value always fails.
    pub fn parse_value(_value: &Value) -> Result<Self, ScalarError> {
        Err(ScalarError::NotSupported)
    }

    /// Parsing an inline query literal always fails.
    pub fn parse_literal(_literal: &str) -> Result<Self, ScalarError> {
        Err(ScalarError::NotSupported)
    }
}

impl Serialize for SearchIndexScalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SearchIndexScalar {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
        Err(D::Error::custom(ScalarError::NotSupported))
    }
}

/// Resolves the single `fuse` field exposed on the registry node.
pub struct QueryLayer {
    service: Arc<IndexService>,
    index_id: String,
}

impl QueryLayer {
    pub fn new(service: Arc<IndexService>, index_id: impl Into<String>) -> Self {
        Self {
            service,
            index_id: index_id.into(),
        }
    }

    /// Only the registry node type carries the `fuse` field.
    pub fn exposes_field(type_name: &str) -> bool {
        type_name == SEARCH_INDEX_TYPE
    }

    /// Resolve `fuse` for a registry node, building the index on a miss.
    pub async fn resolve_fuse(&self, node: &SearchIndexNode) -> Result<SearchIndexScalar> {
        let artifact = self.service.build_or_get_index(node).await?;
        Ok(SearchIndexScalar::new(artifact))
    }

    /// Equivalent of querying `siteSearchIndex { fuse }`.
    ///
    /// Returns `{ "fuse": <artifact> }`, or `{ "fuse": null }` when no page
    /// was ever ingested.
    pub async fn query_site_search_index(&self) -> Result<Value> {
        let node = self
            .service
            .graph()
            .get_search_index(&self.index_id)
            .await
            .with_context(|| format!("Failed to load search index node '{}'", self.index_id))?;
        let fuse = match node {
            Some(node) => self.resolve_fuse(&node).await?.serialize_value()?,
            None => Value::Null,
        };
        Ok(json!({ "fuse": fuse }))
    }
}

/// Destination of the post-build snapshot, if one is configured.
///
/// Only the file name of `copy_serialization_to_file` is used; a trailing
/// `.json` is not doubled.
pub fn snapshot_path(config: &IndexConfig) -> Option<PathBuf> {
    let requested = config.copy_serialization_to_file.as_deref()?;
    let file_name = Path::new(requested).file_name()?.to_str()?;
    let stem = file_name.strip_suffix(".json").unwrap_or(file_name);
    if stem.is_empty() {
        return None;
    }
    Some(config.output_dir.join(format!("{}.json", stem)))
}

/// Write the full query result to the snapshot file.
///
/// Failures are reported and swallowed; the build itself has already
/// succeeded. Returns the written path.
pub async fn write_snapshot(query: &QueryLayer, config: &IndexConfig) -> Option<PathBuf> {
    let path = snapshot_path(config)?;
    match try_write_snapshot(query, &path).await {
        Ok(()) => Some(path),
        Err(e) => {
            let message = format!("{:#}", e);
            error!(path = %path.display(), error = %message, "Writing of fuse index to file failed");
            None
        }
    }
}

async fn try_write_snapshot(query: &QueryLayer, path: &Path) -> Result<()> {
    let result = query.query_site_search_index().await?;
    let json = serde_json::to_string(&result)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(path = %path.display(), "Writing fuse index and documents to file");
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

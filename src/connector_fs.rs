//! Filesystem connector: load page nodes from JSON files.
//!
//! Walks `[source].root`, keeps files matching the include globs and not
//! matching the exclude globs, and parses each one as either a single node
//! object or an array of nodes. Files are visited in sorted relative-path
//! order so ingestion order is deterministic.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::models::SourceNode;

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeFile {
    Many(Vec<SourceNode>),
    One(SourceNode),
}

/// Load nodes from `[source].root`. Fails when no root is configured.
pub fn load_nodes(source: &SourceConfig) -> Result<Vec<SourceNode>> {
    let root = source
        .root
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("source.root is not configured"))?;
    load_nodes_from(root, source)
}

/// Like [`load_nodes`], with an explicit root overriding `source.root`.
pub fn load_nodes_from(root: &Path, source: &SourceConfig) -> Result<Vec<SourceNode>> {
    if !root.exists() {
        bail!("Source root does not exist: {}", root.display());
    }

    let include_set = build_globset(&source.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(source.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut nodes = Vec::new();
    for (rel, path) in files {
        let parsed = read_node_file(&path).with_context(|| format!("Invalid node file: {}", rel))?;
        debug!(file = %rel, nodes = parsed.len(), "Loaded node file");
        nodes.extend(parsed);
    }
    Ok(nodes)
}

fn read_node_file(path: &Path) -> Result<Vec<SourceNode>> {
    let content = std::fs::read_to_string(path)?;
    let parsed: NodeFile = serde_json::from_str(&content)?;
    Ok(match parsed {
        NodeFile::Many(nodes) => nodes,
        NodeFile::One(node) => vec![node],
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

//! TOML configuration parsing and validation.
//!
//! ```toml
//! log_level = "info"
//!
//! [index]
//! use_resolver_namespaces = false
//! copy_serialization_to_file = "search-index.json"
//! output_dir = "public"
//!
//! [fuse_options]
//! keys = ["title", { name = "body", weight = 0.5 }]
//! threshold = 0.4
//!
//! [resolvers.BlogPost]
//! title = "/frontmatter/title"
//! body = "/body"
//!
//! [filter]
//! exclude_drafts = true
//!
//! [source]
//! root = "content"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fuse::FuseOptions;
use crate::registry::SEARCH_INDEX_ID;

/// Top-level configuration loaded from `ssi.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    /// Options passed to the index backend and served to clients.
    #[serde(default)]
    pub fuse_options: FuseOptions,
    /// `type → field → pointer`, or `type → namespace → field → pointer`.
    #[serde(default)]
    pub resolvers: BTreeMap<String, BTreeMap<String, ResolverSpec>>,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[index]`: registry identity, namespacing and the snapshot file.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Registry node id; also the cache key prefix.
    #[serde(default = "default_index_id")]
    pub id: String,
    /// Resolvers are grouped into namespaces, one index per namespace.
    #[serde(default)]
    pub use_resolver_namespaces: bool,
    /// Snapshot file name written under `output_dir` after a build.
    #[serde(default)]
    pub copy_serialization_to_file: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            id: default_index_id(),
            use_resolver_namespaces: false,
            copy_serialization_to_file: None,
            output_dir: default_output_dir(),
        }
    }
}

fn default_index_id() -> String {
    SEARCH_INDEX_ID.to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("public")
}

/// One entry under `[resolvers.<Type>]`.
///
/// A string is a JSON pointer for a flat field; a table maps field names
/// to pointers for one namespace.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ResolverSpec {
    Pointer(String),
    Namespace(BTreeMap<String, String>),
}

/// `[filter]`: declarative eligibility predicate.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    /// JSON pointers that must resolve to a non-null value.
    #[serde(default)]
    pub require_fields: Vec<String>,
    /// Skip nodes whose `draft` field is `true`.
    #[serde(default)]
    pub exclude_drafts: bool,
}

impl FilterConfig {
    /// `true` when no condition is set and every node passes.
    pub fn is_empty(&self) -> bool {
        self.require_fields.is_empty() && !self.exclude_drafts
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Directory for the file-backed cache. In-memory when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen address for `ssi serve`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7332".to_string()
}

/// `[source]`: where node JSON files are read from.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Directory to walk. `--input` overrides it.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Globs relative to `root`; defaults to `**/*.json`.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Added to the built-in excludes.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

/// Read, parse and validate a config file.
///
/// Relative `output_dir`, `cache.dir` and `source.root` are resolved
/// against the file's directory.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;

    // Relative paths resolve against the config file's directory
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Check key names and weights, the resolver shape against
    /// `use_resolver_namespaces`, and every JSON pointer.
    pub fn validate(&self) -> Result<()> {
        if self.index.id.trim().is_empty() {
            bail!("index.id must not be empty");
        }

        for key in &self.fuse_options.keys {
            if key.name().trim().is_empty() {
                bail!("fuse_options.keys entries must have a name");
            }
            let weight = key.weight();
            if !weight.is_finite() || weight <= 0.0 {
                bail!("fuse_options.keys weight for '{}' must be a finite number > 0", key.name());
            }
        }

        let namespaced = self.index.use_resolver_namespaces;
        for (node_type, entries) in &self.resolvers {
            for (name, spec) in entries {
                match (spec, namespaced) {
                    (ResolverSpec::Pointer(pointer), false) => {
                        check_pointer(pointer, &format!("resolvers.{}.{}", node_type, name))?;
                    }
                    (ResolverSpec::Namespace(fields), true) => {
                        for (field, pointer) in fields {
                            check_pointer(
                                pointer,
                                &format!("resolvers.{}.{}.{}", node_type, name, field),
                            )?;
                        }
                    }
                    (ResolverSpec::Pointer(_), true) => bail!(
                        "resolvers.{}.{} must be a namespace table when index.use_resolver_namespaces = true",
                        node_type,
                        name
                    ),
                    (ResolverSpec::Namespace(_), false) => bail!(
                        "resolvers.{}.{} must be a pointer string when index.use_resolver_namespaces = false",
                        node_type,
                        name
                    ),
                }
            }
        }

        for pointer in &self.filter.require_fields {
            check_pointer(pointer, "filter.require_fields")?;
        }

        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };
        self.index.output_dir = join(&self.index.output_dir);
        self.cache.dir = self.cache.dir.as_deref().map(join);
        self.source.root = self.source.root.as_deref().map(join);
    }
}

fn check_pointer(pointer: &str, location: &str) -> Result<()> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        bail!(
            "{}: '{}' is not a JSON pointer (must be empty or start with '/')",
            location,
            pointer
        );
    }
    Ok(())
}

//! Fuzzy index construction.
//!
//! [`IndexBackend`] is the seam between the pipeline and the matching
//! library. [`FuseIndexer`] produces the serialized index shape consumed by
//! Fuse.js clients (`Fuse.parseIndex`), so the browser can search without
//! rebuilding:
//!
//! ```text
//! {
//!   "keys":    [{ "path": ["title"], "id": "title", "weight": 1.0, "src": "title", "getFn": null }],
//!   "records": [{ "i": 0, "$": { "0": { "v": "Hello world", "n": 0.707 } } }]
//! }
//! ```
//!
//! Field norms follow `n = round3(1 / tokens^(0.5 × field_norm_weight))`,
//! where tokens are runs of non-space characters.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::ProjectedDocument;

/// A searchable key: a dotted path, optionally weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Name(String),
    Weighted {
        name: String,
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

fn default_weight() -> f64 {
    1.0
}

impl KeySpec {
    pub fn name(&self) -> &str {
        match self {
            KeySpec::Name(name) | KeySpec::Weighted { name, .. } => name,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            KeySpec::Name(_) => 1.0,
            KeySpec::Weighted { weight, .. } => *weight,
        }
    }

    pub fn path(&self) -> Vec<&str> {
        self.name().split('.').collect()
    }
}

impl From<&str> for KeySpec {
    fn from(name: &str) -> Self {
        KeySpec::Name(name.to_string())
    }
}

/// Index and matching options.
///
/// Anything besides `keys` and `field_norm_weight` is carried verbatim in
/// `match_options` for the client (`threshold`, `ignoreLocation`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuseOptions {
    /// Fields to index. Building without keys is reported, not fatal.
    #[serde(default)]
    pub keys: Vec<KeySpec>,
    /// Exponent applied to field-length norms.
    #[serde(default = "default_weight")]
    pub field_norm_weight: f64,
    /// Client-side matching options, passed through untouched.
    #[serde(flatten)]
    pub match_options: Map<String, Value>,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            field_norm_weight: default_weight(),
            match_options: Map::new(),
        }
    }
}

impl FuseOptions {
    /// Default options indexing `keys`.
    pub fn with_keys<K: Into<KeySpec>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// `true` when at least one key is configured.
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }
}

/// Builds an opaque, serializable index artifact for one bucket.
pub trait IndexBackend: Send + Sync {
    fn create_index(
        &self,
        keys: &[KeySpec],
        documents: &[ProjectedDocument],
        options: &FuseOptions,
    ) -> Result<Value>;
}

/// Fuse.js-compatible index builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuseIndexer;

impl IndexBackend for FuseIndexer {
    fn create_index(
        &self,
        keys: &[KeySpec],
        documents: &[ProjectedDocument],
        options: &FuseOptions,
    ) -> Result<Value> {
        let mut total_weight = 0.0;
        for key in keys {
            if key.name().is_empty() {
                bail!("index key must have a name");
            }
            let weight = key.weight();
            if weight.is_nan() || weight <= 0.0 {
                bail!("index key '{}' must have a positive weight", key.name());
            }
            total_weight += weight;
        }

        let key_values: Vec<Value> = keys
            .iter()
            .map(|key| {
                json!({
                    "path": key.path(),
                    "id": key.name(),
                    "weight": key.weight() / total_weight,
                    "src": key,
                    "getFn": null,
                })
            })
            .collect();

        let records: Vec<Value> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let mut fields = Map::new();
                for (key_index, key) in keys.iter().enumerate() {
                    if let Some(entry) = index_field(doc, key, options.field_norm_weight) {
                        fields.insert(key_index.to_string(), entry);
                    }
                }
                json!({ "i": i, "$": fields })
            })
            .collect();

        Ok(json!({ "keys": key_values, "records": records }))
    }
}

fn index_field(doc: &ProjectedDocument, key: &KeySpec, norm_weight: f64) -> Option<Value> {
    let path = key.path();
    let (first, rest) = path.split_first()?;
    let value = doc.get(first)?;

    let mut list = false;
    let mut texts = Vec::new();
    collect_texts(value, rest, &mut texts, &mut list);

    if list {
        let entries: Vec<Value> = texts
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !is_blank(v))
            .map(|(i, v)| json!({ "v": v, "i": i, "n": field_norm(&v, norm_weight) }))
            .collect();
        Some(Value::Array(entries))
    } else {
        let v = texts.into_iter().next()?;
        if is_blank(&v) {
            return None;
        }
        let n = field_norm(&v, norm_weight);
        Some(json!({ "v": v, "n": n }))
    }
}

/// Walk `path` from `value`, flattening arrays along the way.
fn collect_texts(value: &Value, path: &[&str], out: &mut Vec<String>, list: &mut bool) {
    match (value, path.split_first()) {
        (Value::Array(items), _) => {
            *list = true;
            for item in items {
                collect_texts(item, path, out, list);
            }
        }
        (Value::Object(map), Some((head, tail))) => {
            if let Some(next) = map.get(*head) {
                collect_texts(next, tail, out, list);
            }
        }
        (Value::String(s), None) => out.push(s.clone()),
        (Value::Number(n), None) => out.push(n.to_string()),
        (Value::Bool(b), None) => out.push(b.to_string()),
        _ => {}
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn field_norm(value: &str, weight: f64) -> f64 {
    let tokens = value.split(' ').filter(|t| !t.is_empty()).count().max(1) as f64;
    let norm = 1.0 / tokens.powf(0.5 * weight);
    (norm * 1000.0).round() / 1000.0
}

//! Core data models used throughout the index pipeline.
//!
//! [`SourceNode`] is the externally owned page as the content graph hands it
//! to us. [`ProjectedDocument`] is the flattened record that ends up in a
//! search index bucket.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A page node owned by the host content graph.
///
/// Only `id`, `type` and `date` have meaning to the pipeline; every other
/// key is kept in `fields` for resolvers to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    /// Unique node identifier; registry pages refer to it.
    pub id: String,
    /// Type tag used to select projection rules (e.g. `"BlogPost"`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Copied into every projected document when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SourceNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            date: None,
            fields: Map::new(),
        }
    }

    pub fn with_date(mut self, date: impl Into<Value>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a top-level field, or `None` when absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Render the node as a single JSON object (`id`, `type`, `date`, fields).
    pub fn to_value(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert("id".to_string(), Value::String(self.id.clone()));
        obj.insert("type".to_string(), Value::String(self.node_type.clone()));
        if let Some(date) = &self.date {
            obj.insert("date".to_string(), date.clone());
        }
        Value::Object(obj)
    }
}

/// Search-ready record: `{ id, date, <resolved fields...> }`.
///
/// Stored as a plain JSON object. Resolved fields are written after `id`
/// and `date`, so a resolver named `date` replaces the passthrough value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectedDocument(Map<String, Value>);

impl ProjectedDocument {
    pub fn new(id: &str, date: Option<&Value>) -> Self {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(id.to_string()));
        if let Some(date) = date {
            map.insert("date".to_string(), date.clone());
        }
        Self(map)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Names of all fields, including `id` and `date`.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_node_roundtrips_extra_fields() {
        let raw = json!({
            "id": "p1",
            "type": "BlogPost",
            "date": "2020-01-01",
            "title": "Hello",
            "frontmatter": { "tags": ["a", "b"] }
        });
        let node: SourceNode = serde_json::from_value(raw).unwrap();
        assert_eq!(node.id, "p1");
        assert_eq!(node.node_type, "BlogPost");
        assert_eq!(node.date, Some(json!("2020-01-01")));
        assert_eq!(node.field("title"), Some(&json!("Hello")));
        assert!(node.field("id").is_none());
    }

    #[test]
    fn test_source_node_without_date() {
        let node: SourceNode = serde_json::from_value(json!({"id": "x", "type": "Page"})).unwrap();
        assert!(node.date.is_none());
        assert!(node.fields.is_empty());
    }

    #[test]
    fn test_projected_document_omits_missing_date() {
        let doc = ProjectedDocument::new("p1", None);
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({ "id": "p1" }));
    }

    #[test]
    fn test_projected_document_resolver_overrides_passthrough() {
        let mut doc = ProjectedDocument::new("p1", Some(&json!("2020-01-01")));
        doc.insert("date", json!("Jan 1"));
        assert_eq!(doc.get("date"), Some(&json!("Jan 1")));
        assert_eq!(doc.id(), Some("p1"));
    }
}

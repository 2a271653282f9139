//! The search index registry: an append-only log of indexed page IDs.
//!
//! A single [`SearchIndexNode`] exists per build. Its `id` never changes;
//! every append produces a new value with a recomputed `content_digest`,
//! which the content graph uses for change detection and the index
//! service uses to detect stale cache entries.
//!
//! ```rust
//! use site_search_index::registry::SearchIndexNode;
//!
//! let empty = SearchIndexNode::create_empty();
//! let next = empty.append("p1");
//! assert!(empty.pages.is_empty());
//! assert_eq!(next.pages, vec!["p1".to_string()]);
//! assert_eq!(next.id, empty.id);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Well-known identity of the registry node.
pub const SEARCH_INDEX_ID: &str = "SearchIndex < Site";

/// Type tag the registry node is stored under in the content graph.
pub const SEARCH_INDEX_TYPE: &str = "SiteSearchIndex";

/// Purpose suffix appended to the registry id to form the cache key.
pub const CACHE_KEY_SUFFIX: &str = "fuse";

/// Registry aggregate tracking which pages are indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexNode {
    /// Well-known registry id, see [`SEARCH_INDEX_ID`].
    pub id: String,
    /// Page IDs in insertion order. Duplicates are kept.
    pub pages: Vec<String>,
    /// SHA-256 hex over `pages`; recomputed on every append.
    pub content_digest: String,
}

impl SearchIndexNode {
    /// A fresh registry under the well-known [`SEARCH_INDEX_ID`].
    pub fn create_empty() -> Self {
        Self::with_id(SEARCH_INDEX_ID)
    }

    /// A fresh registry under a custom identity.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pages: Vec::new(),
            content_digest: digest_pages(&[]),
        }
    }

    /// Return a new registry with `page_id` appended. `self` is untouched.
    pub fn append(&self, page_id: &str) -> Self {
        let mut pages = Vec::with_capacity(self.pages.len() + 1);
        pages.extend_from_slice(&self.pages);
        pages.push(page_id.to_string());
        let content_digest = digest_pages(&pages);
        Self {
            id: self.id.clone(),
            pages,
            content_digest,
        }
    }

    /// Cache key for the built index: `<id>:fuse`.
    ///
    /// The digest is deliberately not part of the key; freshness is checked
    /// against the digest stored alongside the cached artifact.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.id, CACHE_KEY_SUFFIX)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}

/// SHA-256 hex digest of the JSON-serialized page list.
pub fn digest_pages(pages: &[String]) -> String {
    let content = Value::from(pages.to_vec()).to_string();
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

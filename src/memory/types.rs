//! Core memory type definitions.
//!
//! Defines [`SparseVector`] (the bag-of-hashed-terms representation),
//! [`Document`] (a stored record with explicit optional fields), and the search
//! result types [`SearchHit`] and [`MatchType`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::DocumentError;

/// Sparse term representation: parallel `indices`, `values` and `terms`.
///
/// `indices` are hash buckets in `[0, VOCAB_SIZE)`; distinct terms may collide.
/// `terms` is diagnostic only and may be absent in documents written elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub terms: Vec<String>,
}

impl SparseVector {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn index_set(&self) -> HashSet<u32> {
        self.indices.iter().copied().collect()
    }
}

/// How a search hit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Bucket overlap with the document's sparse vector.
    Sparse,
    /// Substring hit on the rendered document, discounted.
    MetadataRegex,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sparse => "sparse",
            Self::MetadataRegex => "metadata_regex",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record, read leniently from whatever JSON a writer left behind.
///
/// Only the fields the core consumes are lifted out; `raw` keeps the full
/// mapping for the substring fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Option<String>,
    /// `content`, else `text`, else `metadata.content` (strings only).
    pub content: Option<String>,
    /// Present only when the stored `sparse` field decodes and has indices.
    pub sparse: Option<SparseVector>,
    pub metadata: Option<Map<String, Value>>,
    pub created_at: Option<DateTime<Utc>>,
    pub raw: Map<String, Value>,
}

impl Document {
    /// Parse a stored payload. A top-level array is wrapped as `{"items": [...]}`.
    pub fn from_json(raw: &str) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DocumentError::Unparseable(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let raw = match value {
            Value::Object(map) => map,
            Value::Array(items) => {
                let mut map = Map::new();
                map.insert("items".into(), Value::Array(items));
                map
            }
            _ => return Err(DocumentError::NotAMapping),
        };

        let metadata = raw.get("metadata").and_then(Value::as_object).cloned();
        let content = string_field(&raw, "content")
            .or_else(|| string_field(&raw, "text"))
            .or_else(|| metadata.as_ref().and_then(|m| string_field(m, "content")));
        let sparse = raw
            .get("sparse")
            .and_then(|v| serde_json::from_value::<SparseVector>(v.clone()).ok())
            .filter(|s| !s.is_empty());
        let created_at = ["created_at", "ts"]
            .iter()
            .filter_map(|field| raw.get(*field).and_then(Value::as_str))
            .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            id: string_field(&raw, "id"),
            content,
            sparse,
            metadata,
            created_at,
            raw,
        })
    }

    pub fn has_sparse(&self) -> bool {
        self.sparse.is_some()
    }

    /// First `max_chars` characters of the display content, or empty.
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.content
            .as_deref()
            .map(|c| c.chars().take(max_chars).collect())
            .unwrap_or_default()
    }
}

fn string_field(map: &Map<String, Value>, field: &str) -> Option<String> {
    map.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub key: String,
    pub score: f64,
    pub match_type: MatchType,
    pub content: String,
    pub has_sparse: bool,
}

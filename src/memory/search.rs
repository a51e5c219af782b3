use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::StoreResult;
use crate::memory::render::to_python_json;
use crate::memory::sparse::{bucket_index, query_terms};
use crate::memory::types::{Document, MatchType, SearchHit};
use crate::store::{scan_all, KvStore};

// ── Public types ──────────────────────────────────────────────────────────────

/// Query-side features, computed once per search.
#[derive(Debug, Clone, Default)]
pub struct QuerySignature {
    pub indices: HashSet<u32>,
    pub terms: BTreeSet<String>,
}

impl QuerySignature {
    pub fn new(query: &str) -> Self {
        let terms = query_terms(query);
        let indices = terms.iter().map(|t| bucket_index(t)).collect();
        Self { indices, terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Search knobs.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub excerpt_chars: usize,
    pub fallback_discount: f64,
    pub scan_count: usize,
}

impl SearchOptions {
    pub fn from_config(config: &SearchConfig, scan_count: usize) -> Self {
        Self {
            top_k: config.top_k,
            excerpt_chars: config.excerpt_chars,
            fallback_discount: config.fallback_discount,
            scan_count,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), 500)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Score one document against a query.
///
/// The sparse pass wins whenever it finds any bucket overlap. Only a zero
/// sparse score falls through to counting query terms as substrings of the
/// lowercased rendered document, discounted by `fallback_discount`.
pub fn score_document(
    query: &QuerySignature,
    doc: &Document,
    fallback_discount: f64,
) -> Option<(f64, MatchType)> {
    if let Some(sparse) = &doc.sparse {
        let doc_indices = sparse.index_set();
        let overlap = query.indices.intersection(&doc_indices).count();
        if overlap > 0 {
            let score = overlap as f64 / query.indices.len().max(1) as f64;
            return Some((score, MatchType::Sparse));
        }
    }

    if query.terms.is_empty() {
        return None;
    }
    let haystack = to_python_json(&Value::Object(doc.raw.clone())).to_lowercase();
    let matches = query
        .terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count();
    if matches == 0 {
        return None;
    }
    let score = matches as f64 / query.terms.len() as f64 * fallback_discount;
    Some((score, MatchType::MetadataRegex))
}

/// Hybrid sparse/substring search over every key matching `patterns`.
///
/// Key enumeration failures propagate: "store unreachable" must not look like
/// "no matches". A single document that cannot be loaded or parsed is skipped.
/// Keys matched by more than one pattern are scored once.
pub async fn hybrid_search(
    store: &dyn KvStore,
    query: &str,
    patterns: &[String],
    options: &SearchOptions,
) -> StoreResult<Vec<SearchHit>> {
    let signature = QuerySignature::new(query);
    let mut seen: HashSet<String> = HashSet::new();
    let mut hits: Vec<SearchHit> = Vec::new();

    for pattern in patterns {
        let keys = scan_all(store, pattern, options.scan_count).await?;
        debug!(pattern = %pattern, keys = keys.len(), "scanned namespace");

        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            let raw = match store.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    debug!(key = %key, "document expired before read");
                    continue;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unreadable document");
                    continue;
                }
            };
            let doc = match Document::from_json(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    debug!(key = %key, error = %e, "skipping malformed document");
                    continue;
                }
            };

            if let Some((score, match_type)) =
                score_document(&signature, &doc, options.fallback_discount)
            {
                hits.push(SearchHit {
                    content: doc.excerpt(options.excerpt_chars),
                    has_sparse: doc.has_sparse(),
                    key,
                    score,
                    match_type,
                });
            }
        }
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(options.top_k);
    Ok(hits)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

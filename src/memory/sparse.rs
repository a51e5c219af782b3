//! Hashed bag-of-words extraction.
//!
//! Terms are alphabetic runs of three or more letters, lowercased. Each term
//! maps to a bucket via the first 32 bits of its MD5 digest, so indices agree
//! with every other writer of the shared namespaces.

use md5::{Digest, Md5};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use super::types::SparseVector;

/// Number of hash buckets.
pub const VOCAB_SIZE: u32 = 30_000;
/// Most terms kept per document.
pub const MAX_TERMS: usize = 100;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("static token pattern"));

/// Lowercase `text` and return its terms in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Distinct terms of a query; repeats don't change scoring.
pub fn query_terms(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Bucket for a term: big-endian u32 of the digest's first four bytes, mod [`VOCAB_SIZE`].
pub fn bucket_index(term: &str) -> u32 {
    let digest = Md5::digest(term.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % VOCAB_SIZE
}

/// Build the sparse vector for `text`.
///
/// Keeps the [`MAX_TERMS`] most frequent terms; terms with equal counts keep
/// the order in which they first appeared. Values are raw counts.
pub fn extract_sparse(text: &str) -> SparseVector {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for term in tokenize(text) {
        let count = counts.entry(term.clone()).or_insert(0);
        if *count == 0 {
            order.push(term);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, u32)> = order
        .into_iter()
        .map(|term| {
            let n = counts.get(&term).copied().unwrap_or(0);
            (term, n)
        })
        .collect();
    // stable: ties keep first-seen order
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(MAX_TERMS);

    let mut vector = SparseVector::default();
    for (term, count) in ranked {
        vector.indices.push(bucket_index(&term));
        vector.values.push(f64::from(count));
        vector.terms.push(term);
    }
    vector
}

//! Sparse-index maintenance: backfill vectors for documents written without
//! one, and report per-namespace coverage.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::memory::render::to_python_json;
use crate::memory::sparse::extract_sparse;
use crate::memory::types::{Document, SparseVector};
use crate::store::{scan_all, KvStore};

/// Fields read as text, in order.
const TEXT_FIELDS: &[&str] = &[
    "content",
    "text",
    "message",
    "chat",
    "topic",
    "intent",
    "now_topic",
    "description",
];

/// Fields whose mappings are flattened to `key:value` pairs.
const FEELING_FIELDS: &[&str] = &["felt", "qualia"];

#[derive(Debug, Default, Clone, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub fixed: usize,
    pub already_ok: usize,
    pub no_content: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStats {
    pub pattern: String,
    pub total: usize,
    pub missing_sparse: usize,
}

enum Outcome {
    Fixed,
    AlreadyOk,
    NoContent,
}

/// Flatten any JSON value into searchable text.
pub fn extract_text_from_any(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(_) | Value::Bool(_) => scalar_text(value),
        Value::Array(items) => items
            .iter()
            .map(extract_text_from_any)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => mapping_text(map),
        Value::Null => String::new(),
    }
}

fn mapping_text(map: &Map<String, Value>) -> String {
    let mut parts: Vec<String> = TEXT_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .filter(|v| is_truthy(v))
        .map(scalar_text)
        .collect();

    for field in FEELING_FIELDS {
        if let Some(Value::Object(feelings)) = map.get(*field) {
            let pairs: Vec<String> = feelings
                .iter()
                .map(|(k, v)| format!("{k}:{}", scalar_text(v)))
                .collect();
            parts.push(pairs.join(" "));
        }
    }

    if let Some(metadata) = map.get("metadata") {
        parts.push(extract_text_from_any(metadata));
    }
    parts.join(" ")
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Null => "None".into(),
        Value::Number(n) => n.to_string(),
        other => to_python_json(other),
    }
}

fn has_usable_sparse(map: &Map<String, Value>) -> bool {
    map.get("sparse")
        .and_then(|v| serde_json::from_value::<SparseVector>(v.clone()).ok())
        .is_some_and(|s| !s.is_empty())
}

fn attach_sparse(map: &mut Map<String, Value>, sparse: &SparseVector) {
    map.insert(
        "sparse".into(),
        serde_json::to_value(sparse).unwrap_or(Value::Null),
    );
    map.insert("has_sparse".into(), Value::Bool(true));
}

async fn fix_document(store: &dyn KvStore, key: &str) -> StoreResult<Option<Outcome>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    let Ok(value) = serde_json::from_str::<Value>(&raw) else {
        return Ok(None);
    };

    let updated = match value {
        Value::Object(mut map) => {
            if has_usable_sparse(&map) {
                return Ok(Some(Outcome::AlreadyOk));
            }
            let sparse = extract_sparse(&mapping_text(&map));
            if sparse.is_empty() {
                return Ok(Some(Outcome::NoContent));
            }
            attach_sparse(&mut map, &sparse);
            Value::Object(map)
        }
        Value::Array(mut items) => {
            // the vector lives on the first item; without a mapping there, nowhere to put it
            let Some(Value::Object(first)) = items.first() else {
                return Ok(Some(Outcome::NoContent));
            };
            if has_usable_sparse(first) {
                return Ok(Some(Outcome::AlreadyOk));
            }
            let sparse = extract_sparse(&extract_text_from_any(&Value::Array(items.clone())));
            if sparse.is_empty() {
                return Ok(Some(Outcome::NoContent));
            }
            if let Some(Value::Object(first)) = items.first_mut() {
                attach_sparse(first, &sparse);
            }
            Value::Array(items)
        }
        _ => return Ok(None),
    };

    store.set_keep_ttl(key, &updated.to_string()).await?;
    Ok(Some(Outcome::Fixed))
}

/// Give every document under `patterns` a sparse vector.
///
/// Enumeration failure aborts the run; a failure on one document is counted
/// in `errors` and the run continues. Rewritten documents keep whatever
/// expiry they had, so persistent records stay persistent.
pub async fn backfill_sparse(
    store: &dyn KvStore,
    patterns: &[String],
    scan_count: usize,
) -> StoreResult<BackfillReport> {
    let mut report = BackfillReport::default();

    for pattern in patterns {
        let keys = scan_all(store, pattern, scan_count).await?;
        info!(pattern = %pattern, keys = keys.len(), "backfilling namespace");

        for key in keys {
            report.scanned += 1;
            match fix_document(store, &key).await {
                Ok(Some(Outcome::Fixed)) => {
                    debug!(key = %key, "sparse vector written");
                    report.fixed += 1;
                }
                Ok(Some(Outcome::AlreadyOk)) => report.already_ok += 1,
                Ok(Some(Outcome::NoContent)) => report.no_content += 1,
                Ok(None) => {
                    report.errors += 1;
                    report.failed_keys.push(key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "backfill failed for document");
                    report.errors += 1;
                    report.failed_keys.push(key);
                }
            }
        }
    }

    info!(
        scanned = report.scanned,
        fixed = report.fixed,
        errors = report.errors,
        "backfill complete"
    );
    Ok(report)
}

/// Count documents and those still lacking a sparse vector, per pattern.
pub async fn namespace_stats(
    store: &dyn KvStore,
    patterns: &[String],
    scan_count: usize,
) -> StoreResult<Vec<NamespaceStats>> {
    let mut out = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let keys = scan_all(store, pattern, scan_count).await?;
        let mut missing_sparse = 0;
        for key in &keys {
            let indexed = match store.get(key).await {
                Ok(Some(raw)) => Document::from_json(&raw).is_ok_and(|d| d.has_sparse()),
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "could not read document for stats");
                    false
                }
            };
            if !indexed {
                missing_sparse += 1;
            }
        }
        out.push(NamespaceStats {
            pattern: pattern.clone(),
            total: keys.len(),
            missing_sparse,
        });
    }
    Ok(out)
}

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::analysis::TextAnalyzer;
use crate::config::PersistConfig;
use crate::error::StoreResult;
use crate::memory::sparse::extract_sparse;
use crate::store::{set_json, KvStore};

/// Longest content copy kept inside `metadata`.
const METADATA_CONTENT_CHARS: usize = 500;

/// What a successful write produced.
#[derive(Debug, Clone, Serialize)]
pub struct PersistReceipt {
    pub key: String,
    pub id: String,
    pub terms: usize,
    pub has_dense: bool,
}

/// Store key for a document: `ada:{namespace}:{id}`.
pub fn document_key(namespace: &str, id: &str) -> String {
    format!("ada:{namespace}:{id}")
}

/// Write `content` as a searchable document under `namespace`.
///
/// The sparse vector is always computed locally. A dense vector is added when
/// `analyzer` answers within `persist.analyzer_timeout_secs`; any analyzer
/// failure is logged and the document is written without one. The store write
/// itself must succeed.
pub async fn persist_document(
    store: &dyn KvStore,
    analyzer: Option<&dyn TextAnalyzer>,
    namespace: &str,
    id: Option<String>,
    content: &str,
    metadata: Option<Map<String, Value>>,
    config: &PersistConfig,
) -> StoreResult<PersistReceipt> {
    let id = id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let key = document_key(namespace, &id);
    let sparse = extract_sparse(content);

    let dense: Vec<f32> = match analyzer {
        Some(analyzer) => {
            match tokio::time::timeout(config.analyzer_timeout(), analyzer.analyze(content, None))
                .await
            {
                Ok(Ok(analysis)) => analysis.embedding.into_iter().take(config.dense_dims).collect(),
                Ok(Err(e)) => {
                    warn!(key = %key, error = %e, "analyzer failed, storing without dense vector");
                    Vec::new()
                }
                Err(_) => {
                    warn!(key = %key, "analyzer timed out, storing without dense vector");
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    let ts = Utc::now().to_rfc3339();
    let mut meta = metadata.unwrap_or_default();
    meta.entry("content").or_insert_with(|| {
        Value::String(content.chars().take(METADATA_CONTENT_CHARS).collect())
    });
    meta.entry("ts").or_insert_with(|| Value::String(ts.clone()));

    let doc = json!({
        "id": id,
        "namespace": namespace,
        "content": content,
        "sparse": sparse,
        "has_sparse": !sparse.is_empty(),
        "dense": dense,
        "metadata": meta,
        "ts": ts,
    });

    set_json(store, &key, &doc, Some(config.document_ttl())).await?;
    debug!(key = %key, terms = sparse.len(), dense = dense.len(), "document written");
    info!(key = %key, "persisted document");

    Ok(PersistReceipt {
        key,
        id,
        terms: sparse.len(),
        has_dense: !dense.is_empty(),
    })
}

mod helpers;

use ada_recall::config::SearchConfig;
use ada_recall::memory::hygiene::{backfill_sparse, namespace_stats};
use ada_recall::memory::search::{hybrid_search, SearchOptions};
use ada_recall::memory::sparse::extract_sparse;
use ada_recall::memory::types::MatchType;
use ada_recall::store::KvStore;
use helpers::{read_json, seeded_store, DownStore};
use serde_json::json;
use std::time::Duration;

fn patterns() -> Vec<String> {
    SearchConfig::default().namespaces
}

async fn mixed_store() -> ada_recall::store::memory::MemoryStore {
    let store = seeded_store(&[
        ("ada:memory:a", json!({"content": "lighthouse keeper"})),
        ("ada:memory:b", json!({"content": "harbour", "sparse": extract_sparse("harbour")})),
        ("ada:memory:c", json!({"id": "c"})),
        ("ada:memory:e", json!([1, 2])),
        ("ada:now:list", json!([{"topic": "lighthouse beam"}, {"text": "second"}])),
    ])
    .await;
    store.set("ada:memory:d", "{broken", None).await.unwrap();
    store
}

#[tokio::test]
async fn backfill_counts_every_outcome() {
    let store = mixed_store().await;

    let report = backfill_sparse(&store, &patterns(), 100)
        .await
        .unwrap();

    assert_eq!(report.scanned, 6);
    assert_eq!(report.fixed, 2);
    assert_eq!(report.already_ok, 1);
    assert_eq!(report.no_content, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.failed_keys, ["ada:memory:d"]);

    let fixed = read_json(&store, "ada:memory:a").await;
    assert_eq!(fixed["has_sparse"], json!(true));
    assert_eq!(fixed["sparse"]["terms"], json!(["lighthouse", "keeper"]));

    let list = read_json(&store, "ada:now:list").await;
    assert_eq!(list[0]["has_sparse"], json!(true));
    assert!(list[1].get("sparse").is_none());
}

#[tokio::test]
async fn second_backfill_finds_nothing_to_fix() {
    let store = mixed_store().await;
    backfill_sparse(&store, &patterns(), 100).await.unwrap();

    let again = backfill_sparse(&store, &patterns(), 100).await.unwrap();
    assert_eq!(again.fixed, 0);
    assert_eq!(again.already_ok, 3);
}

#[tokio::test]
async fn backfilled_documents_are_found_by_sparse_overlap() {
    let store = mixed_store().await;

    let before = hybrid_search(&store, "lighthouse", &patterns(), &SearchOptions::default())
        .await
        .unwrap();
    let a = before.iter().find(|h| h.key == "ada:memory:a").unwrap();
    assert_eq!(a.match_type, MatchType::MetadataRegex);

    backfill_sparse(&store, &patterns(), 100).await.unwrap();

    let after = hybrid_search(&store, "lighthouse", &patterns(), &SearchOptions::default())
        .await
        .unwrap();
    let a = after.iter().find(|h| h.key == "ada:memory:a").unwrap();
    assert_eq!(a.match_type, MatchType::Sparse);
    assert!((a.score - 1.0).abs() < 1e-12);
    assert!(a.has_sparse);
}

#[tokio::test]
async fn namespace_stats_track_coverage() {
    let store = mixed_store().await;

    let stats = namespace_stats(&store, &patterns(), 100).await.unwrap();
    let memory = stats.iter().find(|s| s.pattern == "ada:memory:*").unwrap();
    assert_eq!(memory.total, 5);
    assert_eq!(memory.missing_sparse, 4);
    let selfs = stats.iter().find(|s| s.pattern == "ada:self:*").unwrap();
    assert_eq!(selfs.total, 0);

    backfill_sparse(&store, &patterns(), 100).await.unwrap();
    let stats = namespace_stats(&store, &patterns(), 100).await.unwrap();
    let memory = stats.iter().find(|s| s.pattern == "ada:memory:*").unwrap();
    assert_eq!(memory.missing_sparse, 3);
}

#[tokio::test]
async fn backfill_keeps_each_document_expiry() {
    let store = seeded_store(&[]).await;
    store
        .set("ada:self:core", &json!({"content": "steady core identity"}).to_string(), None)
        .await
        .unwrap();
    store
        .set(
            "ada:now:moment",
            &json!({"content": "passing moment"}).to_string(),
            Some(Duration::from_millis(40)),
        )
        .await
        .unwrap();

    let report = backfill_sparse(&store, &patterns(), 100).await.unwrap();
    assert_eq!(report.fixed, 2);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let core = read_json(&store, "ada:self:core").await;
    assert_eq!(core["has_sparse"], json!(true));
    assert!(store.get("ada:now:moment").await.unwrap().is_none());
}

#[tokio::test]
async fn unreachable_store_aborts_backfill() {
    assert!(backfill_sparse(&DownStore, &patterns(), 100).await.is_err());
    assert!(namespace_stats(&DownStore, &patterns(), 100).await.is_err());
}

mod helpers;

use ada_recall::awareness::arbiter::{ArbiterDecision, Proposal};
use ada_recall::awareness::kalman::{DeltaOutcome, KalmanLite};
use ada_recall::awareness::{diff_id, AwarenessContext, SubmitOutcome};
use ada_recall::config::AdaConfig;
use ada_recall::store::memory::MemoryStore;
use ada_recall::store::KvStore;
use chrono::Utc;
use helpers::{read_json, FlakyStore};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn delta(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn context() -> (Arc<MemoryStore>, AwarenessContext) {
    let store = Arc::new(MemoryStore::new());
    let ctx = AwarenessContext::new(store.clone(), &AdaConfig::default());
    (store, ctx)
}

#[test]
fn merge_leans_toward_the_confident_domain() {
    let mut tracker = KalmanLite::with_defaults();
    let t = Utc::now();
    for name in ["now", "self"] {
        tracker.domain_mut(name).unwrap().last_update = t;
    }

    let mut deltas = BTreeMap::new();
    deltas.insert("now".to_string(), delta(json!({"x": 10.0, "mood": "restless"})));
    deltas.insert("self".to_string(), delta(json!({"x": 20.0, "mood": "calm"})));
    deltas.insert("elsewhere".to_string(), delta(json!({"x": 1000.0})));

    let merged = tracker.merge_deltas_at(t, &deltas);
    let x = merged["x"].as_f64().unwrap();
    assert!(x > 15.0 && x < 20.0, "x = {x}");
    assert_eq!(merged["mood"], json!("calm"));
}

#[test]
fn stale_base_version_conflicts() {
    let mut tracker = KalmanLite::with_defaults();
    let d = delta(json!({"topic": "rain"}));
    assert_eq!(tracker.apply_delta(0, &d), DeltaOutcome::Applied { version: 1 });
    assert_eq!(tracker.apply_delta(0, &d), DeltaOutcome::Conflict { current: 1 });
    assert_eq!(tracker.grammar_version(), 1);
}

#[tokio::test]
async fn accepted_update_writes_grammar_and_bumps_version() {
    let (store, ctx) = context();

    let outcome = ctx
        .submit(Proposal::hot(delta(json!({"topic": "harbour", "valence": 0.4})), 0))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Accepted { version: 1, .. }));
    assert_eq!(ctx.grammar_version().await, 1);

    let grammar = read_json(store.as_ref(), "ada:ug:current").await;
    assert_eq!(grammar["topic"], json!("harbour"));
    assert_eq!(grammar["grammar_version"], json!(1));
    assert!(grammar["ts"].is_string());

    let second = ctx
        .submit(Proposal::hot(delta(json!({"topic": "tide"})), 1))
        .await
        .unwrap();
    assert!(matches!(second, SubmitOutcome::Accepted { version: 2, .. }));
    let grammar = read_json(store.as_ref(), "ada:ug:current").await;
    assert_eq!(grammar["topic"], json!("tide"));
    assert_eq!(grammar["valence"], json!(0.4));
}

#[tokio::test]
async fn accepted_update_records_before_and_after() {
    let (store, ctx) = context();

    ctx.submit(Proposal::hot(delta(json!({"topic": "harbour"})), 0))
        .await
        .unwrap();
    let second = ctx
        .submit(Proposal::hot(delta(json!({"topic": "tide"})), 1))
        .await
        .unwrap();
    let SubmitOutcome::Accepted { version, diff_id: id, .. } = second else {
        panic!("expected acceptance");
    };
    assert_eq!(version, 2);
    // sha256('{"topic": "tide"}')[:12]
    assert_eq!(id, "8d3d59c9c658");
    assert_eq!(id, diff_id(&delta(json!({"topic": "tide"}))));

    let diff = read_json(store.as_ref(), &format!("ada:grammar:diff:{id}")).await;
    assert_eq!(diff["before"]["topic"], json!("harbour"));
    assert_eq!(diff["before"]["grammar_version"], json!(1));
    assert_eq!(diff["after"]["topic"], json!("tide"));
    assert_eq!(diff["after"]["grammar_version"], json!(2));
    assert_eq!(diff["after"]["ts"], diff["ts"]);
}

#[tokio::test]
async fn first_update_diff_starts_from_empty_grammar() {
    let (store, ctx) = context();

    let outcome = ctx
        .submit(Proposal::hot(delta(json!({"topic": "harbour"})), 0))
        .await
        .unwrap();
    let SubmitOutcome::Accepted { diff_id: id, .. } = outcome else {
        panic!("expected acceptance");
    };
    assert_eq!(id, "157843e39f9d");
    let diff = read_json(store.as_ref(), "ada:grammar:diff:157843e39f9d").await;
    assert_eq!(diff["before"], json!({}));
    assert_eq!(diff["after"]["topic"], json!("harbour"));
}

#[tokio::test]
async fn concurrent_submits_on_one_base_accept_exactly_one() {
    let (store, ctx) = context();

    let (a, b) = tokio::join!(
        ctx.submit(Proposal::hot(delta(json!({"topic": "harbour"})), 0)),
        ctx.submit(Proposal::hot(delta(json!({"topic": "tide"})), 0)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let accepted: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::Accepted { version: 1, .. }))
        .collect();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::Conflict { current: 1 }))
        .count();
    assert_eq!(accepted.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(ctx.grammar_version().await, 1);

    let grammar = read_json(store.as_ref(), "ada:ug:current").await;
    assert_eq!(grammar["grammar_version"], json!(1));
    assert!(grammar["topic"] == json!("harbour") || grammar["topic"] == json!("tide"));
}

#[tokio::test]
async fn merged_domain_deltas_commit_like_any_proposal() {
    let (store, ctx) = context();

    let mut deltas = BTreeMap::new();
    deltas.insert("now".to_string(), delta(json!({"x": 10.0, "topic": "rain"})));
    deltas.insert("self".to_string(), delta(json!({"x": 20.0, "mode": "steady"})));
    let merged = ctx.merge_deltas(&deltas).await;
    assert!(merged.contains_key("x"));
    assert_eq!(merged["mode"], json!("steady"));
    assert!(!merged.contains_key("topic"));

    let outcome = ctx.submit(Proposal::hot(merged, 0)).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Accepted { version: 1, .. }));
    let grammar = read_json(store.as_ref(), "ada:ug:current").await;
    assert_eq!(grammar["mode"], json!("steady"));
    assert!(grammar.get("topic").is_none());
}

#[tokio::test]
async fn stale_now_domain_defers_before_self_reference() {
    let mut config = AdaConfig::default();
    config.arbiter.max_staleness_secs = -1.0;
    let ctx = AwarenessContext::new(Arc::new(MemoryStore::new()), &config);

    let outcome = ctx
        .submit(Proposal::hot(delta(json!({"self": "self state"})), 0))
        .await
        .unwrap();
    match outcome {
        SubmitOutcome::Deferred { decision } => {
            assert_eq!(decision.reason(), "now vector too stale");
        }
        other => panic!("expected deferral, got {other:?}"),
    }
    assert_eq!(ctx.grammar_version().await, 0);
}

#[tokio::test]
async fn self_referential_update_is_rejected_and_logged() {
    let (_store, ctx) = context();

    let outcome = ctx
        .submit(Proposal::hot(delta(json!({"self": "self state"})), 0))
        .await
        .unwrap();
    let SubmitOutcome::Rejected { decision } = outcome else {
        panic!("expected rejection");
    };
    assert!(matches!(decision, ArbiterDecision::Reject { .. }));
    assert_eq!(decision.reason(), "self-reference ratio too high");

    let log = ctx.recent_rejections(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["action"], json!("reject"));
    assert_eq!(log[0]["delta"]["self"], json!("self state"));
    assert_eq!(ctx.grammar_version().await, 0);
}

#[tokio::test]
async fn cold_proposal_inside_quarantine_window_is_rejected() {
    let (_store, ctx) = context();

    let outcome = ctx
        .submit(Proposal::cold(delta(json!({"topic": "dream"})), 0, 0))
        .await
        .unwrap();
    let SubmitOutcome::Rejected { decision } = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(decision.reason(), "bframe too recent (quarantine)");
}

#[tokio::test]
async fn outdated_base_version_reports_conflict() {
    let (_store, ctx) = context();

    let outcome = ctx
        .submit(Proposal::hot(delta(json!({"topic": "rain"})), 3))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Conflict { current: 0 }));
}

#[tokio::test]
async fn contradicting_update_trips_and_leaves_grammar_alone() {
    let (store, ctx) = context();

    ctx.submit(Proposal::hot(delta(json!({"valence": 1.0})), 0))
        .await
        .unwrap();
    let outcome = ctx
        .submit(Proposal::hot(delta(json!({"valence": 2.0})), 1))
        .await
        .unwrap();
    let SubmitOutcome::Rejected { decision } = outcome else {
        panic!("expected tripwire rejection");
    };
    assert_eq!(decision.reason(), "tripwire_failed");
    assert_eq!(decision.evidence()["failures"][0]["test"], json!("contradiction"));

    assert_eq!(ctx.grammar_version().await, 1);
    let grammar = read_json(store.as_ref(), "ada:ug:current").await;
    assert_eq!(grammar["valence"], json!(1.0));

    let log = ctx.recent_rejections(5).await.unwrap();
    assert_eq!(log[0]["reason"], json!("tripwire_failed"));
}

#[tokio::test]
async fn failed_grammar_write_keeps_version() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let ctx = AwarenessContext::new(store.clone(), &AdaConfig::default());

    store.fail_writes.store(true, Ordering::SeqCst);
    let result = ctx
        .submit(Proposal::hot(delta(json!({"topic": "rain"})), 0))
        .await;
    assert!(result.is_err());
    assert_eq!(ctx.grammar_version().await, 0);
    assert_eq!(store.get("ada:ug:current").await.unwrap(), None);

    store.fail_writes.store(false, Ordering::SeqCst);
    let retry = ctx
        .submit(Proposal::hot(delta(json!({"topic": "rain"})), 0))
        .await
        .unwrap();
    assert!(matches!(retry, SubmitOutcome::Accepted { version: 1, .. }));
}

#[tokio::test]
async fn rejection_log_is_trimmed_newest_first() {
    let mut config = AdaConfig::default();
    config.arbiter.rejection_log_len = 2;
    let ctx = AwarenessContext::new(Arc::new(MemoryStore::new()), &config);

    for i in 0..3 {
        ctx.submit(Proposal::cold(delta(json!({"attempt": i})), 0, 0))
            .await
            .unwrap();
    }
    let log = ctx.recent_rejections(10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["delta"]["attempt"], json!(2));
    assert_eq!(log[1]["delta"]["attempt"], json!(1));
}

#[tokio::test]
async fn status_reports_every_domain() {
    let (_store, ctx) = context();
    ctx.observe_domain("now", Some(0.5)).await.unwrap();
    assert!(ctx.observe_domain("nowhere", None).await.is_err());

    let status = ctx.status().await;
    assert_eq!(status.grammar_version, 0);
    assert_eq!(status.weights.len(), 3);
    assert!(status.uncertainty["now"] < 1.0);
}

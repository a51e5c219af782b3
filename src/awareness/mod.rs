//! Shared awareness state: the tracker, the arbiter, and the grammar they guard.
//!
//! [`AwarenessContext`] owns the process-wide mutable pieces and is passed to
//! every caller. The tracker sits behind one async mutex, so an evaluation,
//! the version check, the grammar write and the version bump all see the same
//! state.

pub mod arbiter;
pub mod bframe;
pub mod kalman;
pub mod promotion;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AdaConfig, TrackerConfig};
use crate::error::{StoreError, StoreResult, TrackerError};
use crate::memory::render::to_python_json;
use crate::store::{get_json, set_json, KvStore};
use arbiter::{tripwire_tests, Arbiter, ArbiterDecision, Proposal};
use kalman::{DeltaOutcome, KalmanLite};

/// Which clock an event runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockDomain {
    /// Inline with a user turn.
    #[default]
    Hot,
    /// Background reflection, delivered through the delayed queue.
    Cold,
    /// Parallel streaming work.
    Stream,
}

impl ClockDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Cold => "cold",
            Self::Stream => "stream",
        }
    }
}

impl std::fmt::Display for ClockDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of submitting a proposal.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// `diff_id` names the before/after record kept for the update.
    Accepted {
        version: u64,
        diff_id: String,
        decision: ArbiterDecision,
    },
    Rejected { decision: ArbiterDecision },
    Deferred { decision: ArbiterDecision },
    /// `base_version` was stale; retry against `current`.
    Conflict { current: u64 },
}

/// Snapshot for introspection surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub grammar_version: u64,
    pub staleness: BTreeMap<String, f64>,
    pub weights: BTreeMap<String, f64>,
    pub uncertainty: BTreeMap<String, f64>,
}

/// First 12 hex chars of SHA-256 over the key-sorted rendering of `delta`.
pub fn diff_id(delta: &Map<String, Value>) -> String {
    let digest = Sha256::digest(to_python_json(&Value::Object(delta.clone())).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

pub struct AwarenessContext {
    tracker: Mutex<KalmanLite>,
    arbiter: Arbiter,
    store: Arc<dyn KvStore>,
    tracker_config: TrackerConfig,
}

impl AwarenessContext {
    pub fn new(store: Arc<dyn KvStore>, config: &AdaConfig) -> Self {
        Self {
            tracker: Mutex::new(KalmanLite::new(&config.tracker.domains)),
            arbiter: Arbiter::new(config.arbiter.clone()),
            store,
            tracker_config: config.tracker.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Record an observation on one domain.
    pub async fn observe_domain(
        &self,
        domain: &str,
        new_uncertainty: Option<f64>,
    ) -> Result<(), TrackerError> {
        self.tracker.lock().await.update(domain, new_uncertainty)
    }

    pub async fn merge_deltas(
        &self,
        deltas: &BTreeMap<String, Map<String, Value>>,
    ) -> Map<String, Value> {
        self.tracker.lock().await.merge_deltas(deltas)
    }

    /// Run the gates without mutating anything.
    pub async fn evaluate(&self, proposal: &Proposal) -> ArbiterDecision {
        let tracker = self.tracker.lock().await;
        self.arbiter.evaluate(&tracker, proposal)
    }

    pub async fn grammar_version(&self) -> u64 {
        self.tracker.lock().await.grammar_version()
    }

    /// Current grammar mapping; empty when nothing is stored yet.
    pub async fn load_grammar(&self) -> StoreResult<Map<String, Value>> {
        let key = &self.tracker_config.grammar_key;
        match get_json(self.store.as_ref(), key).await {
            Ok(Some(Value::Object(map))) => Ok(map),
            Ok(Some(_)) | Ok(None) => Ok(Map::new()),
            Err(StoreError::Malformed(e)) => {
                warn!(key = %key, error = %e, "stored grammar unreadable, rebuilding");
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Arbitrate a proposal and, if accepted, commit it.
    ///
    /// The diff record and the grammar write happen before the version bump;
    /// if either write fails the error propagates and the version is unchanged.
    pub async fn submit(&self, proposal: Proposal) -> StoreResult<SubmitOutcome> {
        let mut tracker = self.tracker.lock().await;

        let decision = self.arbiter.evaluate(&tracker, &proposal);
        match decision {
            ArbiterDecision::Accept { .. } => {}
            ArbiterDecision::Reject { .. } => {
                self.log_rejection(&decision, &proposal).await;
                return Ok(SubmitOutcome::Rejected { decision });
            }
            ArbiterDecision::Defer { .. } => {
                self.log_rejection(&decision, &proposal).await;
                return Ok(SubmitOutcome::Deferred { decision });
            }
        }

        let current = tracker.grammar_version();
        if proposal.base_version != current {
            return Ok(SubmitOutcome::Conflict { current });
        }

        let mut grammar = self.load_grammar().await?;
        let failures = tripwire_tests(&proposal.delta, &grammar);
        if !failures.is_empty() {
            let mut evidence = Map::new();
            evidence.insert("failures".into(), json!(failures));
            let decision = ArbiterDecision::Reject {
                reason: "tripwire_failed".into(),
                evidence,
            };
            self.log_rejection(&decision, &proposal).await;
            return Ok(SubmitOutcome::Rejected { decision });
        }

        let next = current + 1;
        let ts = Utc::now().to_rfc3339();
        let before = grammar.clone();
        for (key, value) in &proposal.delta {
            grammar.insert(key.clone(), value.clone());
        }
        grammar.insert("grammar_version".into(), json!(next));
        grammar.insert("ts".into(), json!(ts));
        let ttl = Some(Duration::from_secs(self.tracker_config.grammar_ttl_secs));

        let diff_id = diff_id(&proposal.delta);
        let diff = json!({"before": before, "after": grammar, "ts": ts});
        let diff_key = format!("{}{}", self.tracker_config.diff_key_prefix, diff_id);
        set_json(self.store.as_ref(), &diff_key, &diff, ttl).await?;

        set_json(
            self.store.as_ref(),
            &self.tracker_config.grammar_key,
            &Value::Object(grammar),
            ttl,
        )
        .await?;

        match tracker.apply_delta(proposal.base_version, &proposal.delta) {
            DeltaOutcome::Applied { version } => {
                info!(version, diff = %diff_id, keys = proposal.delta.len(), "grammar updated");
                Ok(SubmitOutcome::Accepted {
                    version,
                    diff_id,
                    decision,
                })
            }
            DeltaOutcome::Conflict { current } => Ok(SubmitOutcome::Conflict { current }),
        }
    }

    async fn log_rejection(&self, decision: &ArbiterDecision, proposal: &Proposal) {
        let config = self.arbiter.config();
        let entry = json!({
            "action": decision.action(),
            "reason": decision.reason(),
            "evidence": decision.evidence(),
            "delta": proposal.delta,
            "base_version": proposal.base_version,
            "origin": proposal.origin,
            "ts": Utc::now().to_rfc3339(),
        });
        let store = self.store.as_ref();
        let result = async {
            store.lpush(&config.rejection_log_key, &entry.to_string()).await?;
            let keep = config.rejection_log_len.max(1) as i64;
            store.ltrim(&config.rejection_log_key, 0, keep - 1).await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to record arbiter rejection");
        }
    }

    /// Most recent rejections first.
    pub async fn recent_rejections(&self, limit: usize) -> StoreResult<Vec<Value>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = &self.arbiter.config().rejection_log_key;
        let raw = self.store.lrange(key, 0, limit as i64 - 1).await?;
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }

    pub async fn status(&self) -> TrackerStatus {
        let tracker = self.tracker.lock().await;
        let uncertainty = tracker
            .domain_names()
            .filter_map(|name| {
                tracker
                    .get_current_uncertainty(name)
                    .ok()
                    .map(|u| (name.to_string(), u))
            })
            .collect();
        TrackerStatus {
            grammar_version: tracker.grammar_version(),
            staleness: tracker.staleness_metrics(),
            weights: tracker.weights(),
            uncertainty,
        }
    }
}

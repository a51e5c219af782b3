//! The admission gate for grammar mutations.
//!
//! Gates run in a fixed order and the first one that fires decides:
//! staleness (defer), self-reference (reject), quarantine (reject, cold path
//! only). A proposal that passes all three is accepted with an evidence
//! snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::kalman::{KalmanLite, WEIGHT_EPSILON};
use super::ClockDomain;
use crate::config::ArbiterConfig;
use crate::memory::render::to_python_json;

/// Domain whose staleness the first gate reads.
pub const NOW_DOMAIN: &str = "now";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ArbiterDecision {
    Accept {
        reason: String,
        evidence: Map<String, Value>,
    },
    Reject {
        reason: String,
        evidence: Map<String, Value>,
    },
    Defer {
        reason: String,
        evidence: Map<String, Value>,
    },
}

impl ArbiterDecision {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::Defer { .. } => "defer",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Accept { reason, .. } | Self::Reject { reason, .. } | Self::Defer { reason, .. } => {
                reason
            }
        }
    }

    pub fn evidence(&self) -> &Map<String, Value> {
        match self {
            Self::Accept { evidence, .. }
            | Self::Reject { evidence, .. }
            | Self::Defer { evidence, .. } => evidence,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// A candidate grammar mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(default)]
    pub delta: Map<String, Value>,
    /// Version the proposer read before computing `delta`.
    #[serde(default)]
    pub base_version: u64,
    #[serde(default)]
    pub origin: ClockDomain,
    /// Version the cold-path frame observed; falls back to `base_version`.
    #[serde(default)]
    pub source_version: Option<u64>,
}

impl Proposal {
    pub fn hot(delta: Map<String, Value>, base_version: u64) -> Self {
        Self {
            delta,
            base_version,
            origin: ClockDomain::Hot,
            source_version: None,
        }
    }

    pub fn cold(delta: Map<String, Value>, base_version: u64, source_version: u64) -> Self {
        Self {
            delta,
            base_version,
            origin: ClockDomain::Cold,
            source_version: Some(source_version),
        }
    }

    fn observed_version(&self) -> u64 {
        self.source_version.unwrap_or(self.base_version)
    }
}

fn evidence(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub struct Arbiter {
    config: ArbiterConfig,
}

impl Arbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Internal-keyword occurrences over whitespace-separated words (+1) in
    /// the lowercased rendering of `delta`. Keywords count as substrings, so
    /// "thinking" inside "rethinking" counts.
    pub fn self_reference_ratio(&self, delta: &Map<String, Value>) -> f64 {
        let text = to_python_json(&Value::Object(delta.clone())).to_lowercase();
        let total_words = text.split_whitespace().count();
        let internal: usize = self
            .config
            .internal_keywords
            .iter()
            .filter(|kw| !kw.is_empty())
            .map(|kw| text.matches(kw.to_lowercase().as_str()).count())
            .sum();
        internal as f64 / (total_words + 1) as f64
    }

    pub fn check_staleness(&self, tracker: &KalmanLite) -> Option<ArbiterDecision> {
        let staleness = tracker.staleness_metrics();
        let now = staleness.get(NOW_DOMAIN).copied().unwrap_or(0.0);
        if now > self.config.max_staleness_secs {
            return Some(ArbiterDecision::Defer {
                reason: "now vector too stale".into(),
                evidence: evidence(json!({
                    "staleness": staleness,
                    "max": self.config.max_staleness_secs,
                })),
            });
        }
        None
    }

    pub fn check_self_reference(&self, delta: &Map<String, Value>) -> Option<ArbiterDecision> {
        let ratio = self.self_reference_ratio(delta);
        if ratio > self.config.max_self_ref_ratio {
            return Some(ArbiterDecision::Reject {
                reason: "self-reference ratio too high".into(),
                evidence: evidence(json!({
                    "ratio": ratio,
                    "max": self.config.max_self_ref_ratio,
                })),
            });
        }
        None
    }

    /// Cold-path frames may only build on versions at or below
    /// `current - quarantine_window`.
    pub fn check_quarantine(&self, tracker: &KalmanLite, observed: u64) -> Option<ArbiterDecision> {
        let current = tracker.grammar_version();
        let ceiling = current as i64 - self.config.quarantine_window as i64;
        if observed as i64 > ceiling {
            return Some(ArbiterDecision::Reject {
                reason: "bframe too recent (quarantine)".into(),
                evidence: evidence(json!({
                    "bframe_version": observed,
                    "current": current,
                    "window": self.config.quarantine_window,
                })),
            });
        }
        None
    }

    pub fn evaluate(&self, tracker: &KalmanLite, proposal: &Proposal) -> ArbiterDecision {
        let decision = self
            .check_staleness(tracker)
            .or_else(|| self.check_self_reference(&proposal.delta))
            .or_else(|| match proposal.origin {
                ClockDomain::Cold => self.check_quarantine(tracker, proposal.observed_version()),
                _ => None,
            })
            .unwrap_or_else(|| ArbiterDecision::Accept {
                reason: "all gates passed".into(),
                evidence: evidence(json!({
                    "staleness": tracker.staleness_metrics(),
                    "self_ref_ratio": self.self_reference_ratio(&proposal.delta),
                })),
            });

        info!(
            action = decision.action(),
            reason = decision.reason(),
            origin = %proposal.origin,
            "arbiter decision"
        );
        decision
    }
}

// ── Tripwires ────────────────────────────────────────────────────────────────

/// Relative jump in a numeric key that counts as a contradiction.
pub const CONTRADICTION_RATIO: f64 = 0.5;
/// Largest euclidean distance allowed between old and new `embedding`.
pub const DRIFT_MAX: f64 = 0.15;
/// Growth factor of `self_ref_count` that trips the self-loop check.
pub const SELF_LOOP_GROWTH: f64 = 1.5;

/// One failed check against the current grammar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum TripwireFailure {
    Contradiction { key: String, old: f64, new: f64 },
    Drift { value: f64, max: f64 },
    SelfLoopDensity { value: f64 },
}

fn as_vector(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

/// Compare an accepted delta with the grammar it would land on.
///
/// Empty result means the delta may be applied.
pub fn tripwire_tests(delta: &Map<String, Value>, current: &Map<String, Value>) -> Vec<TripwireFailure> {
    let mut failures = Vec::new();

    for (key, new_value) in delta {
        let (Some(new), Some(old)) = (
            new_value.as_f64(),
            current.get(key).and_then(Value::as_f64),
        ) else {
            continue;
        };
        if (new - old).abs() / (old.abs() + WEIGHT_EPSILON) > CONTRADICTION_RATIO {
            failures.push(TripwireFailure::Contradiction {
                key: key.clone(),
                old,
                new,
            });
        }
    }

    if let (Some(new), Some(old)) = (
        delta.get("embedding").and_then(as_vector),
        current.get("embedding").and_then(as_vector),
    ) {
        if new.len() == old.len() {
            let drift = new
                .iter()
                .zip(&old)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            if drift > DRIFT_MAX {
                failures.push(TripwireFailure::Drift {
                    value: drift,
                    max: DRIFT_MAX,
                });
            }
        }
    }

    if let Some(count) = delta.get("self_ref_count").and_then(Value::as_f64) {
        let baseline = current
            .get("self_ref_count")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if count > baseline * SELF_LOOP_GROWTH {
            failures.push(TripwireFailure::SelfLoopDensity { value: count });
        }
    }

    failures
}

//! Kalman-Lite: scalar per-domain uncertainty for weighting concurrent updates.
//!
//! Each domain's uncertainty grows linearly with staleness and shrinks when an
//! observation arrives. Weights are the inverse of current uncertainty, so
//! fresh, confident domains dominate merges.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::config::DomainSeed;
use crate::error::TrackerError;

/// Added to uncertainty before inverting, so zero uncertainty has a finite weight.
pub const WEIGHT_EPSILON: f64 = 0.001;
/// Multiplier applied to uncertainty on an observation without an explicit value.
pub const OBSERVATION_SHRINK: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainState {
    pub uncertainty: f64,
    pub last_update: DateTime<Utc>,
    pub decay_rate: f64,
}

impl DomainState {
    pub fn new(uncertainty: f64, decay_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            uncertainty: uncertainty.max(0.0),
            last_update: now,
            decay_rate: decay_rate.max(0.0),
        }
    }

    pub fn staleness(&self) -> f64 {
        self.staleness_at(Utc::now())
    }

    /// Seconds since the last observation; never negative.
    pub fn staleness_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = now.signed_duration_since(self.last_update);
        (elapsed.num_microseconds().unwrap_or(i64::MAX) as f64 / 1e6).max(0.0)
    }

    pub fn current_uncertainty(&self) -> f64 {
        self.current_uncertainty_at(Utc::now())
    }

    /// `uncertainty * (1 + decay_rate * staleness)`, unbounded above.
    pub fn current_uncertainty_at(&self, now: DateTime<Utc>) -> f64 {
        self.uncertainty * (1.0 + self.decay_rate * self.staleness_at(now))
    }

    pub fn weight(&self) -> f64 {
        self.weight_at(Utc::now())
    }

    pub fn weight_at(&self, now: DateTime<Utc>) -> f64 {
        1.0 / (self.current_uncertainty_at(now) + WEIGHT_EPSILON)
    }

    pub fn update(&mut self, new_uncertainty: Option<f64>) {
        self.update_at(new_uncertainty, Utc::now());
    }

    pub fn update_at(&mut self, new_uncertainty: Option<f64>, now: DateTime<Utc>) {
        self.last_update = now;
        self.uncertainty = match new_uncertainty {
            Some(u) => u.max(0.0),
            None => self.uncertainty * OBSERVATION_SHRINK,
        };
    }
}

/// Result of an optimistic-concurrency version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeltaOutcome {
    Applied { version: u64 },
    Conflict { current: u64 },
}

impl DeltaOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// The version the tracker holds after the call.
    pub fn version(&self) -> u64 {
        match self {
            Self::Applied { version } => *version,
            Self::Conflict { current } => *current,
        }
    }
}

/// Per-domain uncertainty plus the monotonic grammar version.
#[derive(Debug, Clone)]
pub struct KalmanLite {
    domains: BTreeMap<String, DomainState>,
    grammar_version: u64,
}

impl KalmanLite {
    /// Every domain starts freshly observed.
    pub fn new(seeds: &BTreeMap<String, DomainSeed>) -> Self {
        let now = Utc::now();
        let domains = seeds
            .iter()
            .map(|(name, seed)| {
                (
                    name.clone(),
                    DomainState::new(seed.uncertainty, seed.decay_rate, now),
                )
            })
            .collect();
        Self {
            domains,
            grammar_version: 0,
        }
    }

    /// The `now` / `self` / `projected` seeds.
    pub fn with_defaults() -> Self {
        Self::new(&crate::config::TrackerConfig::default().domains)
    }

    pub fn domain(&self, name: &str) -> Option<&DomainState> {
        self.domains.get(name)
    }

    pub fn domain_mut(&mut self, name: &str) -> Option<&mut DomainState> {
        self.domains.get_mut(name)
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn grammar_version(&self) -> u64 {
        self.grammar_version
    }

    pub fn get_current_uncertainty(&self, domain: &str) -> Result<f64, TrackerError> {
        self.domains
            .get(domain)
            .map(DomainState::current_uncertainty)
            .ok_or_else(|| TrackerError::UnknownDomain(domain.to_string()))
    }

    pub fn get_weight(&self, domain: &str) -> Result<f64, TrackerError> {
        self.domains
            .get(domain)
            .map(DomainState::weight)
            .ok_or_else(|| TrackerError::UnknownDomain(domain.to_string()))
    }

    pub fn staleness_metrics(&self) -> BTreeMap<String, f64> {
        self.staleness_metrics_at(Utc::now())
    }

    pub fn staleness_metrics_at(&self, now: DateTime<Utc>) -> BTreeMap<String, f64> {
        self.domains
            .iter()
            .map(|(name, d)| (name.clone(), d.staleness_at(now)))
            .collect()
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        let now = Utc::now();
        self.domains
            .iter()
            .map(|(name, d)| (name.clone(), d.weight_at(now)))
            .collect()
    }

    /// Record an observation on `domain`.
    pub fn update(&mut self, domain: &str, new_uncertainty: Option<f64>) -> Result<(), TrackerError> {
        let state = self
            .domains
            .get_mut(domain)
            .ok_or_else(|| TrackerError::UnknownDomain(domain.to_string()))?;
        state.update(new_uncertainty);
        Ok(())
    }

    pub fn merge_deltas(&self, deltas: &BTreeMap<String, Map<String, Value>>) -> Map<String, Value> {
        self.merge_deltas_at(Utc::now(), deltas)
    }

    /// Weighted merge of partial updates from several domains.
    ///
    /// Unknown domains are ignored. A key whose every supplied value is a
    /// number gets the weight-averaged value over the domains that supplied
    /// it. Any other key comes only from the single highest-weight domain in
    /// the batch (equal weights go to the lexicographically smallest name);
    /// when that domain does not supply the key, the key is dropped.
    pub fn merge_deltas_at(
        &self,
        now: DateTime<Utc>,
        deltas: &BTreeMap<String, Map<String, Value>>,
    ) -> Map<String, Value> {
        let weights: BTreeMap<&str, f64> = deltas
            .keys()
            .filter_map(|name| {
                self.domains
                    .get(name)
                    .map(|d| (name.as_str(), d.weight_at(now)))
            })
            .collect();

        // strict > keeps the first (smallest-named) domain on ties
        let mut leader: Option<(&str, f64)> = None;
        for (&name, &w) in &weights {
            match leader {
                Some((_, best)) if w <= best => {}
                _ => leader = Some((name, w)),
            }
        }
        let leader = leader.map(|(name, _)| name);

        // key -> contributions in domain-name order
        let mut by_key: BTreeMap<&str, Vec<(&str, f64, &Value)>> = BTreeMap::new();
        for (domain, delta) in deltas {
            let Some(&w) = weights.get(domain.as_str()) else {
                continue;
            };
            for (key, value) in delta {
                by_key
                    .entry(key.as_str())
                    .or_default()
                    .push((domain.as_str(), w, value));
            }
        }

        let mut merged = Map::new();
        for (key, contributions) in by_key {
            let numeric: Option<Vec<(f64, f64)>> = contributions
                .iter()
                .map(|(_, w, v)| numeric_value(v).map(|x| (*w, x)))
                .collect();

            let value = match numeric {
                Some(pairs) => {
                    let total: f64 = pairs.iter().map(|(w, _)| w).sum();
                    let blended = if total > 0.0 {
                        pairs.iter().map(|(w, x)| w * x).sum::<f64>() / total
                    } else {
                        0.0
                    };
                    Number::from_f64(blended).map(Value::Number).unwrap_or(Value::Null)
                }
                None => {
                    let from_leader = contributions
                        .iter()
                        .find(|(domain, _, _)| Some(*domain) == leader);
                    match from_leader {
                        Some((_, _, v)) => (*v).clone(),
                        None => continue,
                    }
                }
            };
            merged.insert(key.to_string(), value);
        }
        merged
    }

    /// Bump the version if `base_version` is current.
    pub fn apply_delta(&mut self, base_version: u64, _delta: &Map<String, Value>) -> DeltaOutcome {
        if base_version != self.grammar_version {
            return DeltaOutcome::Conflict {
                current: self.grammar_version,
            };
        }
        self.grammar_version += 1;
        DeltaOutcome::Applied {
            version: self.grammar_version,
        }
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn delta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn uncertainty_grows_with_staleness() {
        let t0 = Utc::now();
        let d = DomainState::new(1.0, 0.1, t0);
        let a = d.current_uncertainty_at(t0 + Duration::seconds(5));
        let b = d.current_uncertainty_at(t0 + Duration::seconds(50));
        assert!((a - 1.5).abs() < 1e-9);
        assert!((b - 6.0).abs() < 1e-9);
        assert!(b > a);
    }

    #[test]
    fn zero_uncertainty_has_finite_weight() {
        let t0 = Utc::now();
        let d = DomainState::new(0.0, 0.1, t0);
        assert!((d.weight_at(t0) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn observation_shrinks_or_overrides() {
        let t0 = Utc::now();
        let mut d = DomainState::new(1.0, 0.1, t0);
        let t1 = t0 + Duration::seconds(10);
        d.update_at(None, t1);
        assert!((d.uncertainty - 0.8).abs() < 1e-12);
        assert_eq!(d.staleness_at(t1), 0.0);
        d.update_at(Some(0.3), t1);
        assert_eq!(d.uncertainty, 0.3);
    }

    #[test]
    fn unknown_domain_is_an_error() {
        let mut k = KalmanLite::with_defaults();
        assert_eq!(
            k.get_weight("elsewhere"),
            Err(TrackerError::UnknownDomain("elsewhere".into()))
        );
        assert!(k.update("elsewhere", None).is_err());
        assert!(k.update("now", None).is_ok());
    }

    #[test]
    fn numeric_keys_renormalise_over_suppliers() {
        let k = KalmanLite::with_defaults();
        let now = k.domain("now").unwrap().last_update;
        let mut deltas = BTreeMap::new();
        deltas.insert("now".to_string(), delta(json!({"x": 10, "only_now": 4})));
        deltas.insert("self".to_string(), delta(json!({"x": 20})));
        let merged = k.merge_deltas_at(now, &deltas);

        let w_now = 1.0 / (1.0 + WEIGHT_EPSILON);
        let w_self = 1.0 / (0.2 + WEIGHT_EPSILON);
        let expected = (w_now * 10.0 + w_self * 20.0) / (w_now + w_self);
        assert!((merged["x"].as_f64().unwrap() - expected).abs() < 1e-9);
        // a key from a single domain keeps its value
        assert!((merged["only_now"].as_f64().unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn categorical_keys_snap_to_most_trusted_supplier() {
        let k = KalmanLite::with_defaults();
        let now = k.domain("now").unwrap().last_update;
        let mut deltas = BTreeMap::new();
        deltas.insert("now".to_string(), delta(json!({"topic": "greeting", "mood": "bright"})));
        deltas.insert("projected".to_string(), delta(json!({"topic": "question", "flag": true})));
        deltas.insert("ghost".to_string(), delta(json!({"topic": "ignored"})));
        let merged = k.merge_deltas_at(now, &deltas);

        assert_eq!(merged["topic"], "question");
        assert_eq!(merged["flag"], true);
        // text from a less trusted domain does not leak through
        assert!(!merged.contains_key("mood"));
    }

    #[test]
    fn mixed_numeric_and_text_is_categorical() {
        let k = KalmanLite::with_defaults();
        let now = k.domain("now").unwrap().last_update;
        let mut deltas = BTreeMap::new();
        deltas.insert("now".to_string(), delta(json!({"level": "high"})));
        deltas.insert("self".to_string(), delta(json!({"level": 3})));
        let merged = k.merge_deltas_at(now, &deltas);
        assert_eq!(merged["level"], 3);
    }

    #[test]
    fn only_the_leading_domain_contributes_text() {
        let k = KalmanLite::with_defaults();
        let now = k.domain("now").unwrap().last_update;
        let mut deltas = BTreeMap::new();
        deltas.insert("now".to_string(), delta(json!({"confidence": 0.7, "topic": "greeting"})));
        deltas.insert("self".to_string(), delta(json!({"confidence": 0.9, "mode": "friendly"})));
        deltas.insert(
            "projected".to_string(),
            delta(json!({"confidence": 0.6, "expectation": "question"})),
        );
        let merged = k.merge_deltas_at(now, &deltas);

        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, ["confidence", "mode"]);
        assert_eq!(merged["mode"], "friendly");
    }

    #[test]
    fn equal_weights_pick_smallest_domain_name() {
        let mut seeds = BTreeMap::new();
        let seed = DomainSeed {
            uncertainty: 0.5,
            decay_rate: 0.0,
        };
        seeds.insert("beta".to_string(), seed);
        seeds.insert("alpha".to_string(), seed);
        let k = KalmanLite::new(&seeds);
        let mut deltas = BTreeMap::new();
        deltas.insert("beta".to_string(), delta(json!({"mode": "b"})));
        deltas.insert("alpha".to_string(), delta(json!({"mode": "a"})));
        assert_eq!(k.merge_deltas(&deltas)["mode"], "a");
    }

    #[test]
    fn stale_base_version_conflicts_with_current() {
        let mut k = KalmanLite::with_defaults();
        let d = Map::new();
        assert_eq!(k.apply_delta(0, &d), DeltaOutcome::Applied { version: 1 });
        let second = k.apply_delta(0, &d);
        assert_eq!(second, DeltaOutcome::Conflict { current: 1 });
        assert_eq!(second.version(), 1);
        assert_eq!(k.grammar_version(), 1);
    }
}

//! Background reflection frames: what the hot path enqueues for the cold path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::promotion::TrustTier;
use super::ClockDomain;
use crate::dispatch::Envelope;
use crate::memory::render::to_python_json;

/// First 16 hex chars of SHA-256 over the key-sorted rendering of `content`.
pub fn pattern_hash(content: &Value) -> String {
    let digest = Sha256::digest(to_python_json(content).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BFrame {
    pub frame_type: String,
    pub idempotency_key: String,
    pub pattern_hash: String,
    pub session_id: String,
    pub grammar_version: u64,
    /// e.g. `self_reference`, `contradiction`, `drift`
    pub pattern_type: String,
    pub model_source: String,
    pub content: Value,
    #[serde(default)]
    pub thinking_atoms: Vec<Value>,
    pub emitted_at: DateTime<Utc>,
    #[serde(default)]
    pub trust_level: TrustTier,
    #[serde(default)]
    pub promotion_count: u32,
}

impl BFrame {
    pub fn new(
        session_id: &str,
        grammar_version: u64,
        pattern_type: &str,
        content: Value,
        model_source: &str,
    ) -> Self {
        let hash = pattern_hash(&content);
        Self {
            frame_type: "bframe".into(),
            idempotency_key: format!("bf:{session_id}:{grammar_version}:{pattern_type}:{hash}"),
            pattern_hash: hash,
            session_id: session_id.to_string(),
            grammar_version,
            pattern_type: pattern_type.to_string(),
            model_source: model_source.to_string(),
            content,
            thinking_atoms: Vec::new(),
            emitted_at: Utc::now(),
            trust_level: TrustTier::Untrusted,
            promotion_count: 0,
        }
    }

    pub fn with_thinking_atoms(mut self, atoms: Vec<Value>) -> Self {
        self.thinking_atoms = atoms;
        self
    }

    /// Queue envelope for the cold path, deduplicated on the idempotency key
    /// and grouped by `{grammar_version}:{pattern_type}`.
    pub fn envelope(&self, destination: &str, delay: Duration) -> Envelope {
        Envelope {
            destination: destination.to_string(),
            payload: serde_json::to_value(self).unwrap_or(Value::Null),
            delay: Some(delay),
            domain: ClockDomain::Cold,
            deduplication_id: Some(self.idempotency_key.clone()),
            group: Some(format!("{}:{}", self.grammar_version, self.pattern_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"b": 1, "a": [1, 2]});
        let b: Value = serde_json::from_str(r#"{"a": [1, 2], "b": 1}"#).unwrap();
        assert_eq!(pattern_hash(&a), pattern_hash(&b));
        assert_eq!(pattern_hash(&a).len(), 16);
        assert_ne!(pattern_hash(&a), pattern_hash(&json!({"a": 1})));
    }

    #[test]
    fn hash_matches_known_digest() {
        // sha256('{"a": 1}') = f9d86028c6e0d64e225186f96acb69338b2c59764df79162107f5c4bb34d1310
        assert_eq!(pattern_hash(&json!({"a": 1})), "f9d86028c6e0d64e");
    }

    #[test]
    fn new_frame_starts_untrusted_with_idempotency_key() {
        let frame = BFrame::new("s1", 7, "drift", json!({"a": 1}), "claude");
        assert_eq!(frame.trust_level, TrustTier::Untrusted);
        assert_eq!(frame.idempotency_key, "bf:s1:7:drift:f9d86028c6e0d64e");

        let env = frame.envelope("https://cold.example.test/bframe", Duration::from_secs(10));
        assert_eq!(env.domain, ClockDomain::Cold);
        assert_eq!(env.group.as_deref(), Some("7:drift"));
        assert_eq!(env.payload["pattern_type"], "drift");
    }
}

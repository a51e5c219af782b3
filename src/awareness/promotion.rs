//! Pattern promotion: corroborate repeated observations of the same content
//! across sessions and model sources before trusting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bframe::BFrame;
use super::ClockDomain;
use crate::config::PromotionConfig;
use crate::dispatch::{Dispatcher, Envelope};
use crate::error::{StoreError, StoreResult};
use crate::store::{get_json, set_json, KvStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustTier {
    #[default]
    Untrusted,
    Candidate,
    /// Assigned outside this crate.
    Trusted,
    /// Assigned outside this crate.
    Disfavored,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrusted => "UNTRUSTED",
            Self::Candidate => "CANDIDATE",
            Self::Trusted => "TRUSTED",
            Self::Disfavored => "DISFAVORED",
        }
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub pattern_hash: String,
    #[serde(default)]
    pub occurrences: u32,
    /// Insertion-ordered, deduplicated, most recent last.
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub trust_level: TrustTier,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sample: Option<Value>,
}

impl PatternStats {
    /// Stats for the first observation of a pattern.
    pub fn new(pattern_hash: &str, session_id: &str, model_source: &str, now: DateTime<Utc>) -> Self {
        Self {
            pattern_hash: pattern_hash.to_string(),
            occurrences: 1,
            sessions: vec![session_id.to_string()],
            models: vec![model_source.to_string()],
            trust_level: TrustTier::Untrusted,
            first_seen: Some(now),
            last_seen: Some(now),
            content_sample: None,
        }
    }

    /// Fold in a repeat observation. Both id lists keep the `window` most recent.
    pub fn observe(&mut self, session_id: &str, model_source: &str, now: DateTime<Utc>, window: usize) {
        self.occurrences = self.occurrences.saturating_add(1);
        remember_recent(&mut self.sessions, session_id, window);
        remember_recent(&mut self.models, model_source, window);
        self.first_seen.get_or_insert(now);
        self.last_seen = Some(now);
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        self.first_seen
            .map(|first| (now - first).num_seconds().max(0) as f64 / 3600.0)
            .unwrap_or(0.0)
    }

    /// One-way move to CANDIDATE.
    pub fn promote(&mut self) -> bool {
        if self.trust_level != TrustTier::Untrusted {
            return false;
        }
        self.trust_level = TrustTier::Candidate;
        true
    }
}

fn remember_recent(list: &mut Vec<String>, id: &str, window: usize) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
    if window > 0 && list.len() > window {
        let excess = list.len() - window;
        list.drain(..excess);
    }
}

/// Why a promotion check passed or failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PromotionEvidence {
    ThresholdMet { occurrences: u32, sessions: usize, models: usize, age_hours: f64 },
    InsufficientOccurrences { have: u32, need: u32 },
    InsufficientSessions { have: usize, need: usize },
    InsufficientModels { have: usize, need: usize },
    TooOld { age_hours: f64, max: f64 },
    NotUntrusted { trust_level: TrustTier },
}

/// All thresholds are AND-ed; the first unmet one is reported.
pub fn should_promote(
    stats: &PatternStats,
    config: &PromotionConfig,
    now: DateTime<Utc>,
) -> (bool, PromotionEvidence) {
    if stats.occurrences < config.min_occurrences {
        return (
            false,
            PromotionEvidence::InsufficientOccurrences {
                have: stats.occurrences,
                need: config.min_occurrences,
            },
        );
    }
    if stats.sessions.len() < config.min_sessions {
        return (
            false,
            PromotionEvidence::InsufficientSessions {
                have: stats.sessions.len(),
                need: config.min_sessions,
            },
        );
    }
    if stats.models.len() < config.min_models {
        return (
            false,
            PromotionEvidence::InsufficientModels {
                have: stats.models.len(),
                need: config.min_models,
            },
        );
    }
    let age_hours = stats.age_hours(now);
    if age_hours > config.max_age_hours {
        return (
            false,
            PromotionEvidence::TooOld {
                age_hours,
                max: config.max_age_hours,
            },
        );
    }
    if stats.trust_level != TrustTier::Untrusted {
        return (
            false,
            PromotionEvidence::NotUntrusted {
                trust_level: stats.trust_level,
            },
        );
    }
    (
        true,
        PromotionEvidence::ThresholdMet {
            occurrences: stats.occurrences,
            sessions: stats.sessions.len(),
            models: stats.models.len(),
            age_hours,
        },
    )
}

/// Where candidate notifications go.
pub struct Notifier {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub stats: PatternStats,
    pub promoted: bool,
    pub evidence: PromotionEvidence,
}

/// What happened to a frame handed to [`PromotionTracker::emit_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameEmission {
    pub idempotency_key: String,
    pub queued: bool,
}

/// Store-backed stats keyed by `key_prefix + pattern_hash`.
pub struct PromotionTracker {
    store: Arc<dyn KvStore>,
    config: PromotionConfig,
    notifier: Option<Notifier>,
}

impl PromotionTracker {
    pub fn new(store: Arc<dyn KvStore>, config: PromotionConfig) -> Self {
        Self {
            store,
            config,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn stats_key(&self, pattern_hash: &str) -> String {
        format!("{}{}", self.config.key_prefix, pattern_hash)
    }

    pub async fn load(&self, pattern_hash: &str) -> StoreResult<Option<PatternStats>> {
        let key = self.stats_key(pattern_hash);
        let value = match get_json(self.store.as_ref(), &key).await {
            Ok(value) => value,
            Err(StoreError::Malformed(e)) => {
                warn!(key = %key, error = %e, "unreadable pattern stats, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(value.and_then(|v| match serde_json::from_value(v) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(key = %key, error = %e, "unexpected pattern stats shape, starting fresh");
                None
            }
        }))
    }

    async fn save(&self, stats: &PatternStats) -> StoreResult<()> {
        let value = serde_json::to_value(stats)
            .map_err(|e| StoreError::Malformed(format!("pattern stats: {e}")))?;
        set_json(
            self.store.as_ref(),
            &self.stats_key(&stats.pattern_hash),
            &value,
            Some(Duration::from_secs(self.config.stats_ttl_secs)),
        )
        .await
    }

    fn fold(
        &self,
        existing: Option<PatternStats>,
        pattern_hash: &str,
        session_id: &str,
        model_source: &str,
        now: DateTime<Utc>,
    ) -> PatternStats {
        match existing {
            Some(mut stats) => {
                stats.observe(session_id, model_source, now, self.config.session_window);
                stats
            }
            None => PatternStats::new(pattern_hash, session_id, model_source, now),
        }
    }

    /// Load, fold in one observation, save. No promotion check.
    pub async fn observe(
        &self,
        pattern_hash: &str,
        session_id: &str,
        model_source: &str,
    ) -> StoreResult<PatternStats> {
        let existing = self.load(pattern_hash).await?;
        let stats = self.fold(existing, pattern_hash, session_id, model_source, Utc::now());
        self.save(&stats).await?;
        Ok(stats)
    }

    /// Observe, promote to CANDIDATE when every threshold holds, save, and
    /// notify on promotion. A failed notification does not undo the promotion.
    pub async fn record(
        &self,
        pattern_hash: &str,
        session_id: &str,
        model_source: &str,
        content_sample: Option<Value>,
    ) -> StoreResult<RecordOutcome> {
        let now = Utc::now();
        let existing = self.load(pattern_hash).await?;
        let mut stats = self.fold(existing, pattern_hash, session_id, model_source, now);
        if stats.content_sample.is_none() {
            stats.content_sample = content_sample;
        }

        let (eligible, evidence) = should_promote(&stats, &self.config, now);
        let promoted = eligible && stats.promote();
        self.save(&stats).await?;

        if promoted {
            info!(pattern = %pattern_hash, occurrences = stats.occurrences, "pattern promoted to candidate");
            self.notify(&stats).await;
        }

        Ok(RecordOutcome {
            stats,
            promoted,
            evidence,
        })
    }

    /// Queue a frame for the cold path through the notifier. Without a
    /// notifier the frame is only logged. Queue failures are warnings.
    pub async fn emit_frame(&self, frame: &BFrame, delay: Duration) -> FrameEmission {
        let idempotency_key = frame.idempotency_key.clone();
        let Some(notifier) = &self.notifier else {
            debug!(key = %idempotency_key, "no queue configured, frame kept local");
            return FrameEmission {
                idempotency_key,
                queued: false,
            };
        };
        let queued = match notifier
            .dispatcher
            .enqueue(frame.envelope(&notifier.destination, delay))
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(key = %idempotency_key, error = %e, "frame emission failed");
                false
            }
        };
        FrameEmission {
            idempotency_key,
            queued,
        }
    }

    async fn notify(&self, stats: &PatternStats) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let envelope = Envelope {
            destination: notifier.destination.clone(),
            payload: json!({"event": "bframe_candidate", "stats": stats}),
            delay: None,
            domain: ClockDomain::Cold,
            deduplication_id: Some(format!("candidate:{}", stats.pattern_hash)),
            group: None,
        };
        match notifier.dispatcher.enqueue(envelope).await {
            Ok(true) => {}
            Ok(false) => warn!(pattern = %stats.pattern_hash, "candidate notification not accepted"),
            Err(e) => warn!(pattern = %stats.pattern_hash, error = %e, "candidate notification failed"),
        }
    }
}

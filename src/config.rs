use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AdaConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
    pub tracker: TrackerConfig,
    pub arbiter: ArbiterConfig,
    pub promotion: PromotionConfig,
    pub persist: PersistConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// REST endpoint of the key-value cache. Empty means "use the in-process store".
    pub url: String,
    pub token: String,
    pub timeout_secs: u64,
    pub scan_count: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub namespaces: Vec<String>,
    pub top_k: usize,
    pub excerpt_chars: usize,
    pub fallback_discount: f64,
}

/// Starting point for one observation channel.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct DomainSeed {
    pub uncertainty: f64,
    pub decay_rate: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    pub domains: BTreeMap<String, DomainSeed>,
    pub grammar_key: String,
    pub grammar_ttl_secs: u64,
    pub diff_key_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArbiterConfig {
    pub max_staleness_secs: f64,
    pub max_self_ref_ratio: f64,
    pub quarantine_window: u64,
    pub internal_keywords: Vec<String>,
    pub rejection_log_key: String,
    pub rejection_log_len: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromotionConfig {
    pub min_occurrences: u32,
    pub min_sessions: usize,
    pub min_models: usize,
    pub max_age_hours: f64,
    pub session_window: usize,
    pub stats_ttl_secs: u64,
    pub key_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistConfig {
    pub document_ttl_secs: u64,
    pub dense_dims: usize,
    pub analyzer_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub url: String,
    pub token: String,
    pub callback_url: String,
    pub default_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8390,
            log_level: "info".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            timeout_secs: 10,
            scan_count: 500,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![
                "ada:now:*".into(),
                "ada:self:*".into(),
                "ada:memory:*".into(),
            ],
            top_k: 10,
            excerpt_chars: 100,
            fallback_discount: 0.8,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let mut domains = BTreeMap::new();
        domains.insert(
            "now".to_string(),
            DomainSeed {
                uncertainty: 1.0,
                decay_rate: 0.1,
            },
        );
        domains.insert(
            "self".to_string(),
            DomainSeed {
                uncertainty: 0.2,
                decay_rate: 0.01,
            },
        );
        domains.insert(
            "projected".to_string(),
            DomainSeed {
                uncertainty: 0.5,
                decay_rate: 0.05,
            },
        );
        Self {
            domains,
            grammar_key: "ada:ug:current".into(),
            grammar_ttl_secs: 86_400,
            diff_key_prefix: "ada:grammar:diff:".into(),
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_staleness_secs: 30.0,
            max_self_ref_ratio: 0.7,
            quarantine_window: 5,
            internal_keywords: ["self", "grammar", "state", "awareness", "thinking", "reflecting"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rejection_log_key: "ada:grammar:rejections".into(),
            rejection_log_len: 100,
        }
    }
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            min_sessions: 2,
            min_models: 2,
            max_age_hours: 24.0,
            session_window: 10,
            stats_ttl_secs: 86_400,
            key_prefix: "ada:bframe:pattern:".into(),
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            document_ttl_secs: 7 * 86_400,
            dense_dims: 100,
            analyzer_timeout_secs: 10,
        }
    }
}

impl PersistConfig {
    pub fn document_ttl(&self) -> Duration {
        Duration::from_secs(self.document_ttl_secs)
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzer_timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            url: "https://qstash.upstash.io/v2".into(),
            token: String::new(),
            callback_url: String::new(),
            default_delay_secs: 30,
            timeout_secs: 5,
        }
    }
}

/// Returns `~/.ada/`, or `./.ada/` when no home directory is available.
pub fn default_ada_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ada")
}

/// Returns the default config file path: `~/.ada/config.toml`
pub fn default_config_path() -> PathBuf {
    default_ada_dir().join("config.toml")
}

impl AdaConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AdaConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. The `ADA_*` names win over the
    /// hosted-service names when both are set.
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_first(&["ADA_STORE_URL", "UPSTASH_REDIS_REST_URL"]) {
            self.store.url = val;
        }
        if let Some(val) = env_first(&["ADA_STORE_TOKEN", "UPSTASH_REDIS_REST_TOKEN"]) {
            self.store.token = val;
        }
        if let Ok(val) = std::env::var("ADA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("QSTASH_TOKEN") {
            self.dispatch.token = val;
        }
        if let Ok(val) = std::env::var("BFRAME_CALLBACK") {
            self.dispatch.callback_url = val;
        }
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

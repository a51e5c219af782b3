//! Boundary to the hosted key-value cache.
//!
//! Provides the [`KvStore`] trait (GET/SET/SCAN plus bounded-list primitives),
//! [`scan_all`] for cursor iteration, a REST client ([`rest::RestStore`]) and an
//! in-process implementation ([`memory::MemoryStore`]). All values are JSON text.

pub mod glob;
pub mod memory;
pub mod rest;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// The primitives the core consumes from the external cache.
///
/// Implementations bound every call by a timeout and report failures as
/// [`StoreError`]; a missing key is `Ok(None)`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Replace the value under `key` without touching its expiry (`SET ... KEEPTTL`).
    /// A key with no TTL stays persistent.
    async fn set_keep_ttl(&self, key: &str, value: &str) -> StoreResult<()>;

    /// One page of a key scan. A returned cursor of `0` means the scan is complete.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> StoreResult<(u64, Vec<String>)>;

    /// Push to the head of a list, returning the new length.
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Iterate `SCAN` for `pattern` until the cursor comes back to zero.
pub async fn scan_all(store: &dyn KvStore, pattern: &str, count: usize) -> StoreResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor = 0u64;
    loop {
        let (next, page) = store.scan(cursor, pattern, count).await?;
        keys.extend(page);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    Ok(keys)
}

/// GET and decode a JSON value. Undecodable payloads come back as `Malformed`.
pub async fn get_json(store: &dyn KvStore, key: &str) -> StoreResult<Option<serde_json::Value>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Malformed(format!("{key}: {e}"))),
        None => Ok(None),
    }
}

pub async fn set_json(
    store: &dyn KvStore,
    key: &str,
    value: &serde_json::Value,
    ttl: Option<Duration>,
) -> StoreResult<()> {
    store.set(key, &value.to_string(), ttl).await
}

/// Build the configured store: the REST client when a URL is set, otherwise an
/// in-process store (contents vanish with the process).
pub fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn KvStore>> {
    if config.url.is_empty() {
        tracing::warn!("no store url configured, using in-process store");
        return Ok(Arc::new(memory::MemoryStore::new()));
    }
    let store = rest::RestStore::new(&config.url, &config.token, config.timeout())?;
    tracing::info!(url = %config.url, "rest store ready");
    Ok(Arc::new(store))
}

#![allow(dead_code)]

use ada_recall::dispatch::{Dispatcher, Envelope};
use ada_recall::error::{DispatchError, StoreError, StoreResult};
use ada_recall::store::memory::MemoryStore;
use ada_recall::store::KvStore;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An in-process store pre-loaded with `(key, json)` documents.
pub async fn seeded_store(docs: &[(&str, Value)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (key, value) in docs {
        store.set(key, &value.to_string(), None).await.unwrap();
    }
    store
}

/// Read a key back as JSON.
pub async fn read_json(store: &dyn KvStore, key: &str) -> Value {
    let raw = store.get(key).await.unwrap().expect("key should exist");
    serde_json::from_str(&raw).unwrap()
}

/// Every call fails as if the store were unreachable.
pub struct DownStore;

#[async_trait]
impl KvStore for DownStore {
    async fn get(&self, _: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set_keep_ttl(&self, _: &str, _: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn scan(&self, _: u64, _: &str, _: usize) -> StoreResult<(u64, Vec<String>)> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn lpush(&self, _: &str, _: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn lrange(&self, _: &str, _: i64, _: i64) -> StoreResult<Vec<String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn ltrim(&self, _: &str, _: i64, _: i64) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Wraps a [`MemoryStore`]; reads work, writes time out while `fail_writes` is on,
/// and `GET` of `flaky_key` times out.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_writes: AtomicBool,
    pub flaky_key: Option<String>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            flaky_key: None,
        }
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.flaky_key.as_deref() == Some(key) {
            return Err(StoreError::Timeout(Duration::from_secs(10)));
        }
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout(Duration::from_secs(10)));
        }
        self.inner.set(key, value, ttl).await
    }
    async fn set_keep_ttl(&self, key: &str, value: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout(Duration::from_secs(10)));
        }
        self.inner.set_keep_ttl(key, value).await
    }
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<(u64, Vec<String>)> {
        self.inner.scan(cursor, pattern, count).await
    }
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.inner.lpush(key, value).await
    }
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.inner.lrange(key, start, stop).await
    }
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        self.inner.ltrim(key, start, stop).await
    }
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

/// Records every envelope it is handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<Envelope>>,
    pub refuse: bool,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn enqueue(&self, envelope: Envelope) -> Result<bool, DispatchError> {
        if self.refuse {
            return Err(DispatchError::Transport("queue down".into()));
        }
        self.sent.lock().unwrap().push(envelope);
        Ok(true)
    }
}

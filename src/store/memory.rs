//! In-process [`KvStore`] with TTL expiry, used for tests and local runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::glob::glob_match;
use super::KvStore;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Keys are kept sorted so a scan cursor can be a plain offset.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {e}")))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Rejected {
        status: 400,
        message: format!("WRONGTYPE operation against key {key} holding the wrong kind of value"),
    }
}

/// Resolve Redis-style inclusive `[start, stop]` (negatives count from the end)
/// into a half-open range over a list of `len` items.
fn list_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len_i = len as i64;
    let start = if start < 0 { (len_i + start).max(0) } else { start };
    let stop = if stop < 0 { len_i + stop } else { stop.min(len_i - 1) };
    if len == 0 || start > stop || start >= len_i {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if !entry.is_live(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(Entry {
                slot: Slot::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock()?.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_keep_ttl(&self, key: &str, value: &str) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let expires_at = entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let now = Instant::now();
        let entries = self.lock()?;
        let live: Vec<&String> = entries
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k)
            .collect();

        let start = cursor as usize;
        let end = (start + count.max(1)).min(live.len());
        let page = live
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter(|k| glob_match(pattern, k))
            .map(|k| k.to_string())
            .collect();
        let next = if end >= live.len() { 0 } else { end as u64 };
        Ok((next, page))
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::List(items) => {
                items.push_front(value.to_string());
                Ok(items.len() as u64)
            }
            Slot::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::List(items) => Ok(list_range(items.len(), start, stop)
                    .map(|(from, to)| items.range(from..to).cloned().collect())
                    .unwrap_or_default()),
                Slot::Text(_) => Err(wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(());
        };
        match &mut entry.slot {
            Slot::List(items) => {
                match list_range(items.len(), start, stop) {
                    Some((from, to)) => {
                        items.truncate(to);
                        items.drain(..from);
                    }
                    None => items.clear(),
                }
                Ok(())
            }
            Slot::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}

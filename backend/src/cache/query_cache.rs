use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Part-wise prefix match: `["tickets"]` covers `["tickets", id]` but
    /// `["raffles"]` does not cover `["raffle", id]`.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0.iter().zip(&prefix.0).all(|(a, b)| a == b)
    }
}

/// Outcome of a query that may be disabled for lack of input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Query<T> {
    /// No request was issued.
    Idle,
    Ready(T),
}

impl<T> Query<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Query::Idle => None,
            Query::Ready(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Invalidated { key: Vec<String>, removed: usize },
}

struct CacheEntry {
    value: Value,
    fetched_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<DashMap<QueryKey, CacheEntry>>,
    // bumped by every invalidation so loads that raced one are not stored
    generation: Arc<AtomicU64>,
    retry_attempts: u32,
    retry_delay: Duration,
    max_entries: Option<usize>,
    max_age: Option<Duration>,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new(retry_attempts: u32, retry_delay: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            retry_attempts,
            retry_delay,
            max_entries: None,
            max_age: None,
            events,
        }
    }

    /// Caps the cache at `max_entries` (oldest entry evicted first) and treats
    /// entries older than `max_age` as missing.
    pub fn with_limits(mut self, max_entries: usize, max_age: Duration) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self.max_age = Some(max_age);
        self
    }

    fn is_stale(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (self.max_age, (now - fetched_at).to_std()) {
            (Some(max_age), Ok(age)) => age > max_age,
            _ => false,
        }
    }

    /// Returns the cached result for `key`, or runs `loader` (retrying up to
    /// `retry_attempts` extra times) and caches what it returns.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cached = self
            .entries
            .get(&key)
            .map(|entry| (entry.value.clone(), entry.fetched_at));
        match cached {
            Some((value, fetched_at)) if !self.is_stale(fetched_at, Utc::now()) => {
                tracing::debug!("Cache hit for {:?}", key.parts());
                return Ok(serde_json::from_value(value)?);
            }
            Some(_) => {
                tracing::debug!("Cache entry for {:?} expired", key.parts());
                self.entries.remove(&key);
            }
            None => {}
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let mut attempt = 0u32;

        let result = loop {
            match loader().await {
                Ok(result) => break result,
                Err(e) if attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "Query {:?} failed (attempt {}), retrying: {}",
                        key.parts(),
                        attempt,
                        e
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        };

        if self.generation.load(Ordering::SeqCst) == generation {
            self.make_room_for(&key);
            self.entries.insert(
                key,
                CacheEntry {
                    value: serde_json::to_value(&result)?,
                    fetched_at: Utc::now(),
                },
            );
        } else {
            tracing::debug!("Discarding result for {:?}, invalidated while loading", key.parts());
        }

        Ok(result)
    }

    /// Drops every entry whose key starts with `prefix`. Returns how many
    /// entries were removed.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let doomed: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = doomed
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();

        tracing::debug!("Invalidated {:?} ({} entries)", prefix.parts(), removed);

        // no subscribers is fine
        let _ = self.events.send(CacheEvent::Invalidated {
            key: prefix.parts().to_vec(),
            removed,
        });

        removed
    }

    fn make_room_for(&self, key: &QueryKey) {
        let Some(max_entries) = self.max_entries else {
            return;
        };

        while self.entries.len() >= max_entries && !self.entries.contains_key(key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.fetched_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(oldest) => {
                    tracing::debug!("Cache full, evicting {:?}", oldest.parts());
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drops every entry older than the configured max age. Returns how many
    /// were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !self.is_stale(entry.fetched_at, now));
        before.saturating_sub(self.entries.len())
    }

    pub async fn run_periodic_cleanup(&self, every: Duration) {
        loop {
            tokio::time::sleep(every).await;

            let evicted = self.evict_expired();
            if evicted > 0 {
                tracing::debug!("Cache cleanup evicted {} expired entries", evicted);
            }
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn fetched_at(&self, key: &QueryKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|entry| entry.fetched_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }
}

// Response cache: keyed by (operation, parameters), entries valid for a fixed TTL
// Expired entries are evicted lazily when read.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub hit_rate: f64,
}

// Builds a deterministic key for an operation and its parameters.
// Object keys are sorted at every depth, so insertion order never matters.
pub fn create_cache_key<P: Serialize + ?Sized>(operation: &str, params: &P) -> String {
    let value = serde_json::to_value(params).unwrap_or(Value::Null);
    let mut key = String::with_capacity(64);
    key.push_str(operation);
    key.push(':');
    write_canonical(&value, &mut key);
    key
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_alive(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

pub struct ResponseCache<T> {
    store: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
    eviction_count: AtomicUsize,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: DashMap::new(),
            ttl,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
            eviction_count: AtomicUsize::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<T> {
        // The shard guard must be released before removing.
        let expired = match self.store.get(key) {
            Some(entry) if entry.is_alive(self.ttl) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                debug!("cache hit for {key}");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            let ttl = self.ttl;
            if self.store.remove_if(key, |_, e| !e.is_alive(ttl)).is_some() {
                self.eviction_count.fetch_add(1, Ordering::Relaxed);
                debug!("cache entry expired for {key}");
            }
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        debug!("cache miss for {key}");
        None
    }

    pub fn set(&self, key: String, value: T) {
        self.store.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    // Removes everything when `pattern` is None, otherwise every key containing it.
    // Hit and miss counters are left untouched.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        match pattern {
            None => {
                let removed = self.store.len();
                self.store.clear();
                removed
            }
            Some(pattern) => {
                let keys: Vec<String> = self
                    .store
                    .iter()
                    .filter(|e| e.key().contains(pattern))
                    .map(|e| e.key().to_string())
                    .collect();

                keys.iter()
                    .filter(|k| self.store.remove(k.as_str()).is_some())
                    .count()
            }
        }
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.store.len();
        let ttl = self.ttl;
        self.store.retain(|_, e| e.is_alive(ttl));
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            self.eviction_count.fetch_add(removed, Ordering::Relaxed);
            debug!("cache cleanup removed {removed} expired entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let total_entries = self.store.len();
        let valid_entries = self
            .store
            .iter()
            .filter(|e| e.value().is_alive(self.ttl))
            .count();
        let hit_count = self.hit_count.load(Ordering::Relaxed);
        let miss_count = self.miss_count.load(Ordering::Relaxed);
        let lookups = hit_count + miss_count;

        CacheStats {
            total_entries,
            valid_entries,
            expired_entries: total_entries.saturating_sub(valid_entries),
            hit_count,
            miss_count,
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hit_count as f64 / lookups as f64
            },
        }
    }
}

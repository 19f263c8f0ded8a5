//! Single-flight decision cache.
//!
//! Entries are keyed by the pair of context and policy-set fingerprints,
//! bounded by TTL and entry count, and invalidated by the engine's
//! mutation generation counter: an entry written under an older
//! generation is never served. Concurrent callers on the same key share
//! one in-flight computation.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use verdict_primitives::fingerprint;

/// Builds the cache key for a context fingerprint and a policy-id set.
/// The ids are sorted so the key is independent of selection order.
#[must_use]
pub fn cache_key(context_fingerprint: &str, policy_ids: &[String]) -> String {
    let mut ids: Vec<&str> = policy_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    let set_fingerprint = fingerprint(&json!(ids));
    format!("{context_fingerprint}{set_fingerprint}")
}

/// Computes the fingerprint of a context value for use in a cache key.
#[must_use]
pub fn context_fingerprint(context: &Value) -> String {
    fingerprint(context)
}

struct Entry<T> {
    cell: Arc<OnceCell<T>>,
    expires_at: Instant,
    generation: u64,
}

/// Cache statistics snapshot.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries served from the cache.
    pub hits: u64,
    /// Entries that had to be computed.
    pub misses: u64,
    /// Current entry count.
    pub size: usize,
}

/// TTL-bounded single-flight memo of decision events.
pub struct DecisionCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> DecisionCache<T> {
    /// Creates a cache with the supplied TTL and entry bound.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, or runs `compute` exactly once
    /// across concurrent callers and caches its result. An entry written
    /// under a generation other than `generation` is discarded first.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, generation: u64, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut entries = self.entries.lock();
            let now = Instant::now();

            let reusable = entries.get(key).is_some_and(|entry| {
                entry.expires_at > now && entry.generation == generation
            });
            if !reusable {
                if entries.len() >= self.max_entries {
                    Self::evict(&mut entries, now, self.max_entries);
                }
                entries.insert(
                    key.to_owned(),
                    Entry {
                        cell: Arc::new(OnceCell::new()),
                        expires_at: now + self.ttl,
                        generation,
                    },
                );
            }
            Arc::clone(&entries[key].cell)
        };

        if cell.initialized() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        cell.get_or_init(compute).await.clone()
    }

    fn evict(entries: &mut HashMap<String, Entry<T>>, now: Instant, max_entries: usize) {
        entries.retain(|_, entry| entry.expires_at > now);
        // Still full after dropping expired entries: drop the entry
        // closest to expiry.
        if entries.len() >= max_entries {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = victim {
                entries.remove(&key);
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns hit/miss statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.lock().len(),
        }
    }
}

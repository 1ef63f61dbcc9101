// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Guardrail result cache.
//!
//! Memoizes a guardrail's result for an identical `(guardrail, input, context)`
//! tuple. Entries expire after a TTL; when full, the entry with the oldest
//! `last_accessed` is evicted. A single mutex guards the map and counters are
//! atomics, so `stats()` never contends with lookups for long.

use crate::engine_core::constants::cache::{DEFAULT_MAX_SIZE, DEFAULT_TTL_SECS};
use crate::engine_core::errors::PipelineError;
use crate::guardrails::GuardrailResult;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: GuardrailResult,
    created_at: Instant,
    last_accessed: Instant,
    expires_at: Instant,
}

pub struct GuardrailCache {
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for GuardrailCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl GuardrailCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Deterministic key: SHA-256 over the canonical (JCS) JSON of the tuple.
    /// Object key order in `input` or `context` does not affect the key.
    pub fn cache_key(guardrail: &str, input: &Value, context: &Value) -> Result<String, PipelineError> {
        let canonical = serde_jcs::to_string(&(guardrail, input, context))?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    pub fn get(&self, guardrail: &str, input: &Value, context: &Value) -> Option<GuardrailResult> {
        let key = match Self::cache_key(guardrail, input, context) {
            Ok(k) => k,
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        self.get_by_key(&key)
    }

    fn get_by_key(&self, key: &str) -> Option<GuardrailResult> {
        let now = Instant::now();
        let mut entries = self.lock();

        let expired = match entries.get_mut(key) {
            Some(entry) if now > entry.expires_at => true,
            Some(entry) => {
                entry.last_accessed = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.result.clone());
            }
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, guardrail: &str, input: &Value, context: &Value, result: GuardrailResult) {
        if self.config.max_size == 0 {
            return;
        }
        let key = match Self::cache_key(guardrail, input, context) {
            Ok(k) => k,
            Err(_) => return,
        };

        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.config.max_size {
            let lru = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, e)| (k.clone(), e.created_at));
            if let Some((lru, created_at)) = lru {
                entries.remove(&lru);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    guardrail,
                    age_ms = now.duration_since(created_at).as_millis() as u64,
                    "Guardrail cache full, evicted least recently used entry"
                );
            }
        }

        entries.insert(
            key,
            CacheEntry {
                result,
                created_at: now,
                last_accessed: now,
                expires_at: now + self.config.ttl,
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| now <= e.expires_at);
        before - entries.len()
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval`.
    ///
    /// The task holds a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    debug!(removed, "Swept expired guardrail cache entries");
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all entries. Counters are kept.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

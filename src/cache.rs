use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::problem::ExecutionOutcome;

/// SHA-256 of the language name and the full program text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(language: &str, program: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(language.as_bytes());
        hasher.update([0u8]);
        hasher.update(program.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Content-addressed memo of execution outcomes.
///
/// Entries live as long as the cache. With a capacity set, the cache simply
/// stops admitting new entries once full. Concurrent requests for the same
/// key share a single run through [`OutcomeCache::get_or_run`].
pub struct OutcomeCache {
    entries: RwLock<HashMap<CacheKey, ExecutionOutcome>>,
    in_flight: Mutex<HashMap<CacheKey, Arc<OnceCell<ExecutionOutcome>>>>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl OutcomeCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ExecutionOutcome> {
        let found = self.entries.read().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Cached outcome for `key`, or the result of `run` when there is none.
    ///
    /// Callers arriving while a run for the same key is in progress wait for
    /// it instead of starting their own. `run` returns `Err` for an outcome
    /// that must not be memoized; it is handed back to its own caller only,
    /// and a waiting caller then performs its own run.
    pub async fn get_or_run<F, Fut>(&self, key: CacheKey, run: F) -> ExecutionOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExecutionOutcome, ExecutionOutcome>>,
    {
        if let Some(outcome) = self.get(&key) {
            log::debug!("Cache hit for program {}", key.to_hex());
            return outcome;
        }

        let cell = Arc::clone(self.in_flight.lock().entry(key).or_default());
        let mut ran = false;
        let shared = cell
            .get_or_try_init(|| {
                ran = true;
                async move {
                    // the first run may have finished between the lookup and joining
                    let cached = self.entries.read().get(&key).cloned();
                    match cached {
                        Some(outcome) => Ok(outcome),
                        None => run().await,
                    }
                }
            })
            .await
            .map(ExecutionOutcome::clone);

        if ran {
            if let Ok(outcome) = &shared {
                self.put(key, outcome.clone());
            }
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(&key);
            }
        } else if shared.is_ok() {
            log::debug!("Shared in-flight run for program {}", key.to_hex());
            self.misses.fetch_sub(1, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        shared.unwrap_or_else(|failure| failure)
    }

    pub fn put(&self, key: CacheKey, outcome: ExecutionOutcome) {
        let mut entries = self.entries.write();
        let full = self
            .capacity
            .is_some_and(|capacity| entries.len() >= capacity);
        if full && !entries.contains_key(&key) {
            log::debug!("Outcome cache full, not caching {}", key.to_hex());
            return;
        }
        entries.insert(key, outcome);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for OutcomeCache {
    fn default() -> Self {
        Self::new(None)
    }
}

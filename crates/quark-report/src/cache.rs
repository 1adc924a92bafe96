//! Single-flight report cache
//!
//! Completed reports live in a size-bounded LRU store (`cached::SizedCache`)
//! with a per-entry expiry. Concurrent requests for a key that is being
//! aggregated attach to the running aggregation instead of starting another
//! one.
//!
//! Per key the cache moves through `Absent → Fetching → Cached → Expired →
//! Absent`. Entries and the in-flight registry share one mutex whose critical
//! sections never await, so a lookup and the registration of a new flight are
//! atomic with respect to each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cached::{Cached, SizedCache};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{ReportError, Result};
use crate::identifier::Identifier;
use crate::report::Report;

type Outcome = Result<Arc<Report>>;

struct CacheEntry {
    report: Arc<Report>,
    expires_at: Instant,
    last_access: Instant,
}

struct InFlight {
    id: u64,
    rx: watch::Receiver<Option<Outcome>>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    coalesced: u64,
    evictions: u64,
    expirations: u64,
}

struct CacheState {
    entries: SizedCache<Identifier, CacheEntry>,
    in_flight: HashMap<Identifier, InFlight>,
    next_flight: u64,
    counters: Counters,
}

enum Lookup {
    Hit(Arc<Report>),
    Wait(watch::Receiver<Option<Outcome>>),
    Lead {
        id: u64,
        tx: watch::Sender<Option<Outcome>>,
    },
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// TTL + LRU report cache with single-flight loading
pub struct ReportCache {
    ttl: Duration,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ReportCache {
    /// Create a cache holding at most `capacity` reports for `ttl` each
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ttl,
            capacity,
            state: Mutex::new(CacheState {
                entries: SizedCache::with_size(capacity),
                in_flight: HashMap::new(),
                next_flight: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// Return the live report for `key`, or run `load` to produce one
    ///
    /// Only the first caller for an absent key invokes `load`; its future is
    /// spawned so it finishes even if that caller goes away. Every concurrent
    /// caller for the same key receives the same outcome. Failures are handed
    /// to the waiting callers but never cached.
    pub async fn get_or_load<F, Fut>(self: &Arc<Self>, key: &Identifier, load: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Report>> + Send + 'static,
    {
        let rx = match self.lookup(key) {
            Lookup::Hit(report) => {
                debug!(code = %key, "Cache hit");
                return Ok(report);
            }
            Lookup::Wait(rx) => {
                debug!(code = %key, "Joining in-flight aggregation");
                rx
            }
            Lookup::Lead { id, tx } => {
                debug!(code = %key, "Cache miss, starting aggregation");
                let rx = tx.subscribe();
                // Armed before `load` runs so a panicking factory still retires the flight
                let mut guard = FlightGuard {
                    cache: Arc::clone(self),
                    key: key.clone(),
                    id,
                    armed: true,
                };
                let future = load();
                tokio::spawn(async move {
                    let outcome = future.await.map(Arc::new);
                    guard.armed = false;
                    guard.cache.complete(&guard.key, guard.id, &outcome);
                    // Receivers may all be gone; the outcome is already recorded
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        wait(key, rx).await
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.lock();
        let removed = purge_expired_locked(&mut guard, now);
        if removed > 0 {
            debug!(removed, "Purged expired reports");
        }
        removed
    }

    /// Remove a cached report; in-flight aggregations are unaffected
    pub fn invalidate(&self, key: &Identifier) -> bool {
        self.lock().entries.cache_remove(key).is_some()
    }

    /// Remove every cached report; in-flight aggregations are unaffected
    pub fn clear(&self) {
        self.lock().entries.cache_clear();
    }

    /// Number of stored reports, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.lock().entries.cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.cache_size(),
            in_flight: state.in_flight.len(),
            hits: state.counters.hits,
            misses: state.counters.misses,
            coalesced: state.counters.coalesced,
            evictions: state.counters.evictions,
            expirations: state.counters.expirations,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &Identifier) -> Lookup {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let expired = match state.entries.cache_get_mut(key) {
            Some(entry) if now < entry.expires_at => {
                entry.last_access = now;
                state.counters.hits += 1;
                return Lookup::Hit(Arc::clone(&entry.report));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            let _ = state.entries.cache_remove(key);
            state.counters.expirations += 1;
            debug!(code = %key, "Cached report expired");
        }

        if let Some(flight) = state.in_flight.get(key) {
            state.counters.coalesced += 1;
            return Lookup::Wait(flight.rx.clone());
        }

        state.counters.misses += 1;
        let id = state.next_flight;
        state.next_flight += 1;
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(key.clone(), InFlight { id, rx });
        Lookup::Lead { id, tx }
    }

    /// Retire flight `id` and store its report on success
    fn complete(&self, key: &Identifier, id: u64, outcome: &Outcome) {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.in_flight.get(key).is_some_and(|f| f.id == id) {
            state.in_flight.remove(key);
        }

        let Ok(report) = outcome else {
            return;
        };

        // Replacing an existing key never needs room
        let _ = state.entries.cache_remove(key);
        if state.entries.cache_size() >= self.capacity {
            purge_expired_locked(state, now);
        }
        if state.entries.cache_size() >= self.capacity {
            let victim = state.entries.key_order().last().cloned();
            if let Some(victim) = victim {
                if let Some(evicted) = state.entries.cache_remove(&victim) {
                    state.counters.evictions += 1;
                    info!(
                        code = %victim,
                        idle_ms = now.duration_since(evicted.last_access).as_millis() as u64,
                        "Evicted least recently used report"
                    );
                }
            }
        }

        let _ = state.entries.cache_set(
            key.clone(),
            CacheEntry {
                report: Arc::clone(report),
                expires_at: now + self.ttl,
                last_access: now,
            },
        );
    }
}

impl std::fmt::Debug for ReportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

fn purge_expired_locked(state: &mut CacheState, now: Instant) -> usize {
    let expired: Vec<Identifier> = state
        .entries
        .key_order()
        .zip(state.entries.value_order())
        .filter(|(_, entry)| now >= entry.expires_at)
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired {
        let _ = state.entries.cache_remove(key);
    }
    state.counters.expirations += expired.len() as u64;
    expired.len()
}

async fn wait(key: &Identifier, mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
    let settled = rx.wait_for(Option::is_some).await.ok().and_then(|v| v.clone());
    settled.unwrap_or_else(|| {
        error!(code = %key, "Aggregation ended without producing an outcome");
        Err(ReportError::InternalFault(format!(
            "aggregation for {key} ended without a result"
        )))
    })
}

/// Retires the in-flight marker if the aggregation task unwinds
struct FlightGuard {
    cache: Arc<ReportCache>,
    key: Identifier,
    id: u64,
    armed: bool,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(code = %self.key, "Aggregation task aborted");
        let mut state = self.cache.lock();
        if state.in_flight.get(&self.key).is_some_and(|f| f.id == self.id) {
            state.in_flight.remove(&self.key);
        }
    }
}

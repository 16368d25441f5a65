// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bounded Response Cache
//!
//! Fixed-capacity, age-bounded `key → payload` store.
//!
//! Entries live in an insertion-ordered map (`lru::LruCache` used strictly in
//! insertion order: entries are pushed at the tail and never promoted by
//! reads). Because entries are stamped under the same lock that orders them,
//! insertion times increase from head to tail, so stale entries always form a
//! prefix and a single sweep from the head enforces both the capacity and the
//! age limit.
//!
//! Staleness is enforced lazily:
//! - `lookup` reports a stale entry as a miss but leaves it resident
//! - `store` runs [`BoundedCache::enforce_limits`] after inserting
//!
//! There is no background sweeper; a read-only cache keeps stale entries in
//! memory (still bounded by `max_entries`) until the next store.

use crate::domain::cache::{CacheConfig, CacheEntry, CacheError, CacheStats};
use crate::domain::clock::{Clock, SystemClock};
use bytes::Bytes;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    closed: bool,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    rejected: AtomicU64,
    evictions: AtomicU64,
}

pub struct BoundedCache {
    name: String,
    config: RwLock<CacheConfig>,
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    counters: CacheCounters,
}

impl BoundedCache {
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(name: impl Into<String>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config: RwLock::new(config),
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                closed: false,
            }),
            clock,
            counters: CacheCounters::default(),
        }
    }

    /// A cache that is closed from birth: every lookup misses and every store
    /// is dropped. Handed out by a registry that has been shut down.
    pub fn closed_stub(name: impl Into<String>) -> Self {
        let cache = Self::new(name, CacheConfig::default());
        cache.state.lock().closed = true;
        cache
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CacheConfig {
        *self.config.read()
    }

    /// Swaps the limits in place. Existing entries are kept; the new bounds
    /// take effect on the next store.
    pub fn update_config(&self, config: CacheConfig) {
        let previous = std::mem::replace(&mut *self.config.write(), config);
        if previous != config {
            info!(
                cache = %self.name,
                max_entries = config.max_entries,
                max_age_ms = config.max_age.as_millis() as u64,
                max_entry_size_bytes = config.max_entry_size_bytes,
                "Cache limits updated"
            );
        }
    }

    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.lookup_within(key, None)
    }

    /// Like [`BoundedCache::lookup`] but also treats entries older than
    /// `max_age` as misses, when that is tighter than the cache's own limit.
    pub fn lookup_within(&self, key: &str, max_age: Option<Duration>) -> Option<CacheEntry> {
        let state = self.state.lock();
        if state.closed {
            return None;
        }

        let cache_max_age = self.config.read().max_age;
        let max_age = max_age.map_or(cache_max_age, |limit| limit.min(cache_max_age));
        let now = self.clock.now();

        let found = match state.entries.peek(key) {
            Some(entry) if !entry.is_stale(now, max_age) => Some(entry.clone()),
            Some(entry) => {
                debug!(
                    cache = %self.name,
                    key,
                    age_ms = entry.age(now).as_millis() as u64,
                    "Cache entry is stale"
                );
                None
            }
            None => None,
        };
        drop(state);

        let outcome = if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            "hit"
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            "miss"
        };
        metrics::counter!("gateway_cache_lookups_total", "cache" => self.name.clone(), "outcome" => outcome)
            .increment(1);

        found
    }

    /// Drains `payload` and admits it under `key`.
    ///
    /// The reader is consumed completely before any admission decision, but at
    /// most `max_entry_size_bytes + 1` bytes are buffered; the remainder of an
    /// oversized payload is discarded as it is read. A read failure is
    /// returned and leaves the cache untouched. Payloads larger than
    /// `max_entry_size_bytes` are dropped without error. On a closed cache
    /// this is a no-op and the reader is not touched.
    pub fn store<R: Read>(
        &self,
        key: &str,
        mut payload: R,
        content_type: Option<&str>,
    ) -> Result<(), CacheError> {
        if self.is_closed() {
            return Ok(());
        }
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let read_error = |source: io::Error| CacheError::PayloadRead {
            key: key.to_string(),
            source,
        };
        let max_entry_size = self.config.read().max_entry_size_bytes;
        let mut body = Vec::new();
        payload
            .by_ref()
            .take(max_entry_size.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(read_error)?;

        if body.len() as u64 > max_entry_size {
            let rest = io::copy(&mut payload, &mut io::sink()).map_err(read_error)?;
            self.reject_oversized(key, (body.len() as u64).saturating_add(rest), max_entry_size);
            return Ok(());
        }

        self.store_bytes(key, Bytes::from(body), content_type)
    }

    /// Admits an in-memory payload under `key`, with the same rules as
    /// [`BoundedCache::store`].
    pub fn store_bytes(
        &self,
        key: &str,
        payload: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), CacheError> {
        if self.is_closed() {
            return Ok(());
        }
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let size = payload.len() as u64;
        let max_entry_size = self.config.read().max_entry_size_bytes;
        if size > max_entry_size {
            self.reject_oversized(key, size, max_entry_size);
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        let config = *self.config.read();
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            content_type: content_type.map(str::to_string),
            inserted_at: now,
        };

        // Re-inserting moves the key to the tail.
        if state.entries.pop(key).is_some() {
            debug!(cache = %self.name, key, "Replacing cached entry");
        }
        state.entries.push(key.to_string(), entry);
        let evicted = Self::sweep(&mut state.entries, &config, now);
        drop(state);

        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gateway_cache_stores_total", "cache" => self.name.clone()).increment(1);
        self.record_evictions(evicted);

        Ok(())
    }

    fn reject_oversized(&self, key: &str, size: u64, max_entry_size: u64) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gateway_cache_store_rejected_total", "cache" => self.name.clone())
            .increment(1);
        debug!(
            cache = %self.name,
            key,
            size,
            max_entry_size,
            "Payload exceeds maximum entry size; not caching"
        );
    }

    /// Evicts from the oldest end while the cache is over capacity or the
    /// oldest entry is stale. Returns the number of entries removed.
    pub fn enforce_limits(&self) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        let config = *self.config.read();
        let evicted = Self::sweep(&mut state.entries, &config, self.clock.now());
        drop(state);

        self.record_evictions(evicted);
        evicted
    }

    fn sweep(entries: &mut LruCache<String, CacheEntry>, config: &CacheConfig, now: Instant) -> usize {
        let mut evicted = 0;
        loop {
            let evict = match entries.peek_lru() {
                Some((_, oldest)) => {
                    entries.len() > config.max_entries || oldest.is_stale(now, config.max_age)
                }
                None => false,
            };
            if !evict {
                break;
            }
            entries.pop_lru();
            evicted += 1;
        }
        evicted
    }

    fn record_evictions(&self, evicted: usize) {
        if evicted == 0 {
            return;
        }
        self.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        metrics::counter!("gateway_cache_evictions_total", "cache" => self.name.clone())
            .increment(evicted as u64);
        debug!(cache = %self.name, evicted, "Evicted cache entries");
    }

    /// Closes the cache and releases every resident entry. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let released = state.entries.len();
        state.entries.clear();
        drop(state);

        info!(cache = %self.name, released, "Cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys, oldest first. Includes stale entries not yet swept.
    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BoundedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("config", &self.config())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use std::io;

    fn cache_with_clock(config: CacheConfig) -> (BoundedCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = BoundedCache::with_clock("test", config, clock.clone());
        (cache, clock)
    }

    fn config(max_entries: usize) -> CacheConfig {
        CacheConfig::new(max_entries, Duration::from_secs(60), 1024)
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    #[test]
    fn test_capacity_evicts_oldest_inserted() {
        let cache = BoundedCache::new("test", config(2));
        cache.store("a", &b"1"[..], None).unwrap();
        cache.store("b", &b"2"[..], None).unwrap();
        cache.store("c", &b"3"[..], None).unwrap();

        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("c").is_some());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lookup_does_not_promote() {
        let cache = BoundedCache::new("test", config(2));
        cache.store("a", &b"1"[..], None).unwrap();
        cache.store("b", &b"2"[..], None).unwrap();

        // Reading "a" must not save it from eviction.
        assert!(cache.lookup("a").is_some());
        cache.store("c", &b"3"[..], None).unwrap();

        assert_eq!(cache.keys(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_overwrite_keeps_single_entry_and_moves_to_tail() {
        let cache = BoundedCache::new("test", config(2));
        cache.store("a", &b"first"[..], Some("text/plain")).unwrap();
        cache.store("b", &b"other"[..], None).unwrap();
        cache.store("a", &b"second"[..], Some("text/xml")).unwrap();

        assert_eq!(cache.len(), 2);
        let entry = cache.lookup("a").unwrap();
        assert_eq!(entry.payload, Bytes::from_static(b"second"));
        assert_eq!(entry.content_type.as_deref(), Some("text/xml"));

        // "b" is now the oldest.
        cache.store("c", &b"third"[..], None).unwrap();
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("a").is_some());
    }

    #[test]
    fn test_oversized_payload_is_silently_dropped() {
        let cache = BoundedCache::new("test", CacheConfig::new(10, Duration::from_secs(60), 4));
        cache.store("big", &b"12345"[..], None).unwrap();
        cache.store("fits", &b"1234"[..], None).unwrap();

        assert!(cache.lookup("big").is_none());
        assert!(cache.lookup("fits").is_some());
        assert_eq!(cache.stats().rejected, 1);
    }

    #[test]
    fn test_oversized_overwrite_leaves_previous_entry() {
        let cache = BoundedCache::new("test", CacheConfig::new(10, Duration::from_secs(60), 4));
        cache.store("k", &b"tiny"[..], None).unwrap();
        cache.store("k", &b"far too big"[..], None).unwrap();

        assert_eq!(cache.lookup("k").unwrap().payload, Bytes::from_static(b"tiny"));
    }

    #[test]
    fn test_empty_payload_is_cacheable() {
        let cache = BoundedCache::new("test", config(1));
        cache.store("empty", io::empty(), None).unwrap();

        let entry = cache.lookup("empty").unwrap();
        assert!(entry.payload.is_empty());
    }

    #[test]
    fn test_read_error_propagates_and_leaves_cache_untouched() {
        let cache = BoundedCache::new("test", config(4));
        cache.store("k", &b"old"[..], None).unwrap();

        let err = cache.store("k", FailingReader, None).unwrap_err();
        assert!(matches!(err, CacheError::PayloadRead { ref key, .. } if key == "k"));
        assert_eq!(cache.lookup("k").unwrap().payload, Bytes::from_static(b"old"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let cache = BoundedCache::new("test", config(4));
        assert!(matches!(cache.store("", &b"x"[..], None), Err(CacheError::EmptyKey)));
        assert!(cache.lookup("").is_none());
    }

    #[test]
    fn test_stale_entry_is_a_miss_but_stays_resident_until_next_store() {
        let (cache, clock) = cache_with_clock(CacheConfig::new(10, Duration::from_secs(5), 1024));
        cache.store("old", &b"1"[..], None).unwrap();

        clock.advance(Duration::from_secs(5));
        assert!(cache.lookup("old").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.lookup("old").is_none());
        assert_eq!(cache.len(), 1);

        cache.store("new", &b"2"[..], None).unwrap();
        assert_eq!(cache.keys(), vec!["new".to_string()]);
    }

    #[test]
    fn test_single_sweep_removes_stale_prefix_and_excess() {
        let (cache, clock) = cache_with_clock(CacheConfig::new(3, Duration::from_secs(10), 1024));
        cache.store("s1", &b"x"[..], None).unwrap();
        cache.store("s2", &b"x"[..], None).unwrap();
        clock.advance(Duration::from_secs(8));
        cache.store("f1", &b"x"[..], None).unwrap();
        clock.advance(Duration::from_secs(3));

        // s1, s2 are stale now; f1 is not.
        cache.store("f2", &b"x"[..], None).unwrap();
        assert_eq!(cache.keys(), vec!["f1".to_string(), "f2".to_string()]);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_lookup_within_tightens_max_age() {
        let (cache, clock) = cache_with_clock(CacheConfig::new(10, Duration::from_secs(60), 1024));
        cache.store("k", &b"v"[..], None).unwrap();
        clock.advance(Duration::from_secs(20));

        assert!(cache.lookup_within("k", Some(Duration::from_secs(10))).is_none());
        assert!(cache.lookup_within("k", Some(Duration::from_secs(30))).is_some());
        // A looser override cannot extend the cache's own limit.
        clock.advance(Duration::from_secs(45));
        assert!(cache.lookup_within("k", Some(Duration::from_secs(600))).is_none());
    }

    #[test]
    fn test_update_config_is_not_retroactive() {
        let cache = BoundedCache::new("test", config(5));
        for key in ["a", "b", "c", "d"] {
            cache.store(key, &b"x"[..], None).unwrap();
        }

        cache.update_config(config(2));
        assert_eq!(cache.config().max_entries, 2);
        assert_eq!(cache.len(), 4);

        assert_eq!(cache.enforce_limits(), 2);
        assert_eq!(cache.keys(), vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_close_is_idempotent_and_turns_cache_into_noop() {
        let cache = BoundedCache::new("test", config(5));
        cache.store("a", &b"x"[..], None).unwrap();

        cache.close();
        cache.close();
        assert!(cache.is_closed());
        assert!(cache.is_empty());

        cache.store("b", &b"y"[..], None).unwrap();
        assert!(cache.lookup("b").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.enforce_limits(), 0);
    }

    #[test]
    fn test_closed_cache_skips_admission_checks() {
        let cache = BoundedCache::new("test", CacheConfig::new(10, Duration::from_secs(60), 4));
        cache.close();

        assert!(cache.store("", &b"x"[..], None).is_ok());
        assert!(cache.store_bytes("", Bytes::from_static(b"x"), None).is_ok());
        cache.store("big", &b"far too big"[..], None).unwrap();
        cache.store_bytes("big", Bytes::from_static(b"far too big"), None).unwrap();

        assert_eq!(cache.stats().rejected, 0);
        assert_eq!(cache.stats().stores, 0);
    }

    #[test]
    fn test_closed_stub_never_holds_entries() {
        let stub = BoundedCache::closed_stub("gone");
        stub.store("k", &b"v"[..], None).unwrap();
        assert!(stub.lookup("k").is_none());
        assert!(stub.is_closed());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = BoundedCache::new("test", config(5));
        cache.store("a", &b"x"[..], None).unwrap();
        cache.lookup("a");
        cache.lookup("a");
        cache.lookup("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
    }
}

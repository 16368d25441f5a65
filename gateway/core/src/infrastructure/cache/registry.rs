// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cache Registry
//!
//! Directory of named [`BoundedCache`]s, owned by the host and shared by
//! reference. Caches are created on first reference.
//!
//! Creation uses the `DashMap` entry API, so only the shard holding the name
//! is locked while a cache is inserted; first access to unrelated names does
//! not serialize. When two callers race on the same name, the loser's freshly
//! built cache is closed and both receive the winner.
//!
//! After [`CacheRegistry::shutdown`] every lookup by name returns a closed
//! stub cache instead of creating new state.

use crate::domain::cache::CacheConfig;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::gateway_config::CacheSettings;
use crate::infrastructure::cache::bounded_cache::BoundedCache;
use crate::infrastructure::lifecycle_bus::{LifecycleBusError, LifecycleReceiver};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CacheRegistry {
    caches: DashMap<String, Arc<BoundedCache>>,
    default_config: RwLock<CacheConfig>,
    closed: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl CacheRegistry {
    pub fn new(default_config: CacheConfig) -> Self {
        Self::with_clock(default_config, Arc::new(SystemClock))
    }

    pub fn with_clock(default_config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            caches: DashMap::new(),
            default_config: RwLock::new(default_config),
            closed: AtomicBool::new(false),
            clock,
        }
    }

    /// Builds a registry from the `spec.cache` section of the gateway config,
    /// eagerly creating every named cache listed there.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let registry = Self::new(settings.defaults);
        for (name, config) in &settings.caches {
            registry.get_or_create_with(name, *config);
        }
        registry
    }

    pub fn default_config(&self) -> CacheConfig {
        *self.default_config.read()
    }

    /// Changes the limits used for caches created from now on.
    pub fn set_default_config(&self, config: CacheConfig) {
        *self.default_config.write() = config;
    }

    pub fn get_or_create(&self, name: &str) -> Arc<BoundedCache> {
        let config = self.default_config();
        self.get_or_create_with(name, config)
    }

    /// Returns the cache registered under `name`, creating it with `config` if
    /// absent. An existing cache keeps its own limits; use
    /// [`BoundedCache::update_config`] to change them.
    pub fn get_or_create_with(&self, name: &str, config: CacheConfig) -> Arc<BoundedCache> {
        if self.is_closed() {
            return Arc::new(BoundedCache::closed_stub(name));
        }

        if let Some(existing) = self.caches.get(name) {
            return Arc::clone(existing.value());
        }

        let fresh = Arc::new(BoundedCache::with_clock(name, config, Arc::clone(&self.clock)));
        let cache = self.insert_or_discard(name, fresh);

        // Shutdown may have swept the map between the closed check and the insert.
        if self.is_closed() {
            self.caches.remove(name);
            cache.close();
        }

        cache
    }

    /// Registers `fresh` unless another caller got there first, in which case
    /// `fresh` is closed and the registered cache is returned.
    fn insert_or_discard(&self, name: &str, fresh: Arc<BoundedCache>) -> Arc<BoundedCache> {
        match self.caches.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let winner = Arc::clone(existing.get());
                drop(existing);
                fresh.close();
                debug!(cache = %name, "Lost cache creation race; discarded duplicate");
                winner
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&fresh));
                let config = fresh.config();
                info!(
                    cache = %name,
                    max_entries = config.max_entries,
                    max_age_ms = config.max_age.as_millis() as u64,
                    max_entry_size_bytes = config.max_entry_size_bytes,
                    "Created cache"
                );
                fresh
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<BoundedCache>> {
        if self.is_closed() {
            return None;
        }
        self.caches.get(name).map(|cache| Arc::clone(cache.value()))
    }

    /// Applies new limits to an existing cache. Returns `false` when no cache
    /// is registered under `name`.
    pub fn update_config(&self, name: &str, config: CacheConfig) -> bool {
        match self.get(name) {
            Some(cache) => {
                cache.update_config(config);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes every registered cache and refuses to create new ones. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut closed = 0usize;
        self.caches.retain(|_, cache| {
            cache.close();
            closed += 1;
            false
        });
        info!(closed, "Cache registry shut down");
    }

    /// Shuts the registry down when the host publishes
    /// [`LifecycleEvent::Stopping`](crate::domain::lifecycle::LifecycleEvent::Stopping)
    /// or drops the lifecycle bus.
    pub fn watch_lifecycle(self: &Arc<Self>, mut events: LifecycleReceiver) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_stopping() => {
                        info!("Stopping signal received, shutting down cache registry");
                        registry.shutdown();
                        break;
                    }
                    Ok(event) => debug!(?event, "Ignoring lifecycle event"),
                    Err(LifecycleBusError::Lagged(n)) => {
                        warn!(missed = n, "Cache registry lagged behind lifecycle bus");
                    }
                    Err(LifecycleBusError::Closed) | Err(LifecycleBusError::Empty) => {
                        info!("Lifecycle bus closed, shutting down cache registry");
                        registry.shutdown();
                        break;
                    }
                }
            }
        })
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::LifecycleEvent;
    use crate::infrastructure::lifecycle_bus::LifecycleBus;
    use std::time::Duration;

    fn small() -> CacheConfig {
        CacheConfig::new(2, Duration::from_secs(60), 1024)
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = CacheRegistry::default();
        let a = registry.get_or_create("responses");
        let b = registry.get_or_create("responses");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_losing_creation_race_closes_duplicate() {
        let registry = CacheRegistry::default();
        let winner = registry.get_or_create_with("quotes", small());
        winner.store("k", &b"v"[..], None).unwrap();

        let duplicate = Arc::new(BoundedCache::new("quotes", CacheConfig::default()));
        let returned = registry.insert_or_discard("quotes", Arc::clone(&duplicate));

        assert!(Arc::ptr_eq(&returned, &winner));
        assert!(duplicate.is_closed());
        assert!(!winner.is_closed());
        assert!(winner.lookup("k").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_existing_config_is_authoritative() {
        let registry = CacheRegistry::default();
        let first = registry.get_or_create_with("quotes", small());
        let second = registry.get_or_create_with("quotes", CacheConfig::default());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config(), small());

        assert!(registry.update_config("quotes", CacheConfig::default()));
        assert_eq!(first.config(), CacheConfig::default());
        assert!(!registry.update_config("missing", small()));
    }

    #[test]
    fn test_default_config_applies_to_new_caches_only() {
        let registry = CacheRegistry::new(small());
        let before = registry.get_or_create("before");
        registry.set_default_config(CacheConfig::default());
        let after = registry.get_or_create("after");

        assert_eq!(before.config(), small());
        assert_eq!(after.config(), CacheConfig::default());
        assert_eq!(registry.names(), vec!["after".to_string(), "before".to_string()]);
    }

    #[test]
    fn test_shutdown_closes_caches_and_returns_stubs() {
        let registry = CacheRegistry::default();
        let cache = registry.get_or_create("responses");
        cache.store("k", &b"v"[..], None).unwrap();

        registry.shutdown();
        registry.shutdown();

        assert!(cache.is_closed());
        assert!(registry.is_empty());
        assert!(registry.get("responses").is_none());

        let stub = registry.get_or_create("responses");
        assert!(stub.is_closed());
        stub.store("k", &b"v"[..], None).unwrap();
        assert!(stub.lookup("k").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_settings_precreates_named_caches() {
        let mut settings = CacheSettings::default();
        settings.caches.insert("quotes".to_string(), small());
        let registry = CacheRegistry::from_settings(&settings);

        assert_eq!(registry.names(), vec!["quotes".to_string()]);
        assert_eq!(registry.get("quotes").unwrap().config(), small());
        assert_eq!(registry.default_config(), CacheConfig::default());
    }

    #[tokio::test]
    async fn test_stopping_event_shuts_registry_down() {
        let bus = LifecycleBus::new(8);
        let registry = Arc::new(CacheRegistry::default());
        let cache = registry.get_or_create("responses");
        let watcher = registry.watch_lifecycle(bus.subscribe());

        bus.publish(LifecycleEvent::started());
        bus.publish(LifecycleEvent::stopping());
        watcher.await.unwrap();

        assert!(registry.is_closed());
        assert!(cache.is_closed());
    }
}

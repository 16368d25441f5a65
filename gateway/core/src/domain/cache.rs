// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Value types shared by the bounded response cache and its registry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRY_SIZE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache key cannot be empty")]
    EmptyKey,

    #[error("Failed to read payload for cache key '{key}': {source}")]
    PayloadRead {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Limits applied to a single named cache. Swappable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entries older than this are reported as misses and swept on the next store.
    #[serde(default = "default_max_age", with = "humantime_serde")]
    pub max_age: Duration,

    /// Payloads larger than this are not admitted.
    #[serde(default = "default_max_entry_size_bytes")]
    pub max_entry_size_bytes: u64,
}

impl CacheConfig {
    pub fn new(max_entries: usize, max_age: Duration, max_entry_size_bytes: u64) -> Self {
        Self {
            max_entries,
            max_age,
            max_entry_size_bytes,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age: DEFAULT_MAX_AGE,
            max_entry_size_bytes: DEFAULT_MAX_ENTRY_SIZE_BYTES,
        }
    }
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_max_age() -> Duration {
    DEFAULT_MAX_AGE
}

fn default_max_entry_size_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_SIZE_BYTES
}

/// A cached payload. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    pub content_type: Option<String>,
    pub inserted_at: Instant,
}

impl CacheEntry {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) > max_age
    }
}

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub rejected: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_yaml_uses_humantime() {
        let config: CacheConfig = serde_yaml::from_str(
            "max_entries: 25\nmax_age: 90s\nmax_entry_size_bytes: 4096\n",
        )
        .unwrap();

        assert_eq!(config.max_entries, 25);
        assert_eq!(config.max_age, Duration::from_secs(90));
        assert_eq!(config.max_entry_size_bytes, 4096);
    }

    #[test]
    fn test_cache_config_missing_fields_fall_back_to_defaults() {
        let config: CacheConfig = serde_yaml::from_str("max_entries: 3\n").unwrap();

        assert_eq!(config.max_entries, 3);
        assert_eq!(config.max_age, DEFAULT_MAX_AGE);
        assert_eq!(config.max_entry_size_bytes, DEFAULT_MAX_ENTRY_SIZE_BYTES);
    }

    #[test]
    fn test_entry_staleness_is_strictly_greater_than_max_age() {
        let inserted_at = Instant::now();
        let entry = CacheEntry {
            key: "k".to_string(),
            payload: Bytes::from_static(b"v"),
            content_type: None,
            inserted_at,
        };
        let max_age = Duration::from_secs(10);

        assert!(!entry.is_stale(inserted_at + max_age, max_age));
        assert!(entry.is_stale(inserted_at + max_age + Duration::from_millis(1), max_age));
    }
}

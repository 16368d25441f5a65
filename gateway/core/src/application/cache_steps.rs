// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Response Cache Policy Steps
//!
//! The two leaf assertions that drive the response cache from a policy:
//!
//! - [`CacheStoreAssertion`] copies a message body (or variable) into a named
//!   cache under an interpolated key.
//! - [`CacheLookupAssertion`] copies a cached payload back into the request,
//!   the response or a variable. A miss falsifies the assertion so the policy
//!   can branch to the backend route with `OneOrMore`.

use crate::domain::assertion::{Assertion, AssertionError, AssertionStatus};
use crate::domain::audit::AuditLevel;
use crate::domain::cache::CacheConfig;
use crate::domain::context::{Message, PolicyContext};
use crate::domain::key_template::KeyTemplate;
use crate::infrastructure::cache::CacheRegistry;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Where a cache step reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTarget {
    Request,
    Response,
    Variable(String),
}

pub struct CacheStoreAssertion {
    registry: Arc<CacheRegistry>,
    cache_name: String,
    key: KeyTemplate,
    source: MessageTarget,
    config: CacheConfig,
}

impl CacheStoreAssertion {
    /// Stores the response body under `key` in `cache_name`. The cache is
    /// created with the registry default limits if it does not exist yet.
    pub fn new(registry: Arc<CacheRegistry>, cache_name: impl Into<String>, key: impl Into<KeyTemplate>) -> Self {
        let config = registry.default_config();
        Self {
            registry,
            cache_name: cache_name.into(),
            key: key.into(),
            source: MessageTarget::Response,
            config,
        }
    }

    pub fn with_source(mut self, source: MessageTarget) -> Self {
        self.source = source;
        self
    }

    /// Limits used if this step is the one that creates the cache.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl Assertion for CacheStoreAssertion {
    fn name(&self) -> &str {
        "cache_store"
    }

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError> {
        let key = self.key.render(ctx);
        if key.is_empty() {
            ctx.add_detail(
                AuditLevel::Warning,
                format!("Cache key '{}' resolved to an empty string; not storing", self.key),
            );
            return Ok(AssertionStatus::Falsified);
        }

        let message = match &self.source {
            MessageTarget::Request => ctx.request().clone(),
            MessageTarget::Response => ctx.response().clone(),
            MessageTarget::Variable(name) => match ctx.variable(name) {
                Some(value) => Message::new(value_bytes(value), None),
                None => {
                    ctx.add_detail(
                        AuditLevel::Warning,
                        format!("Variable '{}' is not set; nothing to cache", name),
                    );
                    return Ok(AssertionStatus::Falsified);
                }
            },
        };

        let cache = self.registry.get_or_create_with(&self.cache_name, self.config);
        cache.store(&key, message.reader(), message.content_type())?;
        debug!(cache = %self.cache_name, key = %key, size = message.len(), "Stored payload");

        Ok(AssertionStatus::Success)
    }
}

pub struct CacheLookupAssertion {
    registry: Arc<CacheRegistry>,
    cache_name: String,
    key: KeyTemplate,
    target: MessageTarget,
    max_age: Option<Duration>,
}

impl CacheLookupAssertion {
    /// Looks `key` up in `cache_name` and, on a hit, replaces the response.
    pub fn new(registry: Arc<CacheRegistry>, cache_name: impl Into<String>, key: impl Into<KeyTemplate>) -> Self {
        Self {
            registry,
            cache_name: cache_name.into(),
            key: key.into(),
            target: MessageTarget::Response,
            max_age: None,
        }
    }

    pub fn with_target(mut self, target: MessageTarget) -> Self {
        self.target = target;
        self
    }

    /// Only accept entries younger than `max_age` (never looser than the
    /// cache's own limit).
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

#[async_trait]
impl Assertion for CacheLookupAssertion {
    fn name(&self) -> &str {
        "cache_lookup"
    }

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError> {
        let key = self.key.render(ctx);
        let entry = match self.registry.get(&self.cache_name) {
            Some(cache) if !key.is_empty() => cache.lookup_within(&key, self.max_age),
            _ => None,
        };

        let Some(entry) = entry else {
            debug!(cache = %self.cache_name, key = %key, "Cache miss");
            ctx.add_detail(AuditLevel::Info, format!("Cache miss for key '{}'", key));
            return Ok(AssertionStatus::Falsified);
        };

        debug!(cache = %self.cache_name, key = %key, size = entry.size(), "Cache hit");
        match &self.target {
            MessageTarget::Request => ctx.set_request(Message::new(entry.payload, entry.content_type)),
            MessageTarget::Response => ctx.set_response(Message::new(entry.payload, entry.content_type)),
            MessageTarget::Variable(name) => {
                let text = String::from_utf8_lossy(&entry.payload).into_owned();
                ctx.set_variable(name.clone(), text);
            }
        }

        Ok(AssertionStatus::Success)
    }
}

fn value_bytes(value: &Value) -> Bytes {
    match value {
        Value::String(s) => Bytes::from(s.clone().into_bytes()),
        other => Bytes::from(other.to_string().into_bytes()),
    }
}

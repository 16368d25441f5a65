// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Details
//!
//! Assertions attach human-readable detail records to the request they are
//! evaluating. Each detail remembers which concurrent branch produced it
//! (`source_branch`, outermost index first), so details recorded on worker
//! tasks can be replayed into the parent in declaration order instead of
//! being keyed by whichever thread happened to run them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDetail {
    pub level: AuditLevel,
    pub message: String,
    /// Index path of the concurrent branch that recorded this detail.
    /// Empty when recorded outside any Concurrent-All node.
    #[serde(default)]
    pub source_branch: Vec<usize>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditDetail {
    pub fn new(level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            source_branch: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_source_branch(mut self, source_branch: Vec<usize>) -> Self {
        self.source_branch = source_branch;
        self
    }
}

/// Destination for audit details once a request has finished evaluating.
pub trait AuditSink: Send + Sync {
    fn record_detail(&self, detail: AuditDetail);
}

/// In-memory audit sink for tests and replay.
#[derive(Default)]
pub struct InMemoryAuditSink {
    details: Mutex<Vec<AuditDetail>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn details(&self) -> Vec<AuditDetail> {
        self.details.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.details.lock().iter().map(|d| d.message.clone()).collect()
    }

    pub fn clear(&self) {
        self.details.lock().clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record_detail(&self, detail: AuditDetail) {
        self.details.lock().push(detail);
    }
}

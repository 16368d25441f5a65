// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host process lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started { started_at: DateTime<Utc> },
    /// The host is shutting down; long-lived resources should be released.
    Stopping { stopping_at: DateTime<Utc> },
}

impl LifecycleEvent {
    pub fn started() -> Self {
        LifecycleEvent::Started { started_at: Utc::now() }
    }

    pub fn stopping() -> Self {
        LifecycleEvent::Stopping { stopping_at: Utc::now() }
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, LifecycleEvent::Stopping { .. })
    }
}

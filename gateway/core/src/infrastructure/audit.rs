// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::audit::{AuditDetail, AuditLevel, AuditSink};
use tracing::{error, info, warn};

/// Audit sink that writes every detail to the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_detail(&self, detail: AuditDetail) {
        let branch = format!("{:?}", detail.source_branch);
        match detail.level {
            AuditLevel::Info => info!(target: "gateway::audit", branch = %branch, "{}", detail.message),
            AuditLevel::Warning => warn!(target: "gateway::audit", branch = %branch, "{}", detail.message),
            AuditLevel::Error => error!(target: "gateway::audit", branch = %branch, "{}", detail.message),
        }
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Interpreter
//!
//! Walks a [`PolicyNode`] tree against a [`PolicyContext`]. Sequential
//! combinators run in place; `ConcurrentAll` nodes are handed to the
//! [`ConcurrentAllEvaluator`], which calls back into the interpreter through
//! [`PolicyRunner`] for every branch.

use crate::application::concurrent_all::ConcurrentAllEvaluator;
use crate::domain::assertion::{AssertionStatus, PolicyNode};
use crate::domain::audit::AuditLevel;
use crate::domain::context::PolicyContext;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Evaluates one policy subtree. Implemented by [`PolicyInterpreter`]; the
/// Concurrent-All evaluator only depends on this seam.
#[async_trait]
pub trait PolicyRunner: Send + Sync {
    async fn run(&self, node: &PolicyNode, ctx: &mut PolicyContext) -> AssertionStatus;
}

#[derive(Clone)]
pub struct PolicyInterpreter {
    evaluator: Arc<ConcurrentAllEvaluator>,
    cancel: CancellationToken,
}

impl PolicyInterpreter {
    pub fn new(evaluator: ConcurrentAllEvaluator) -> Self {
        Self::with_cancellation(evaluator, CancellationToken::new())
    }

    /// Interpreter whose evaluations stop when `cancel` fires, e.g. because
    /// the enclosing request was aborted.
    pub fn with_cancellation(evaluator: ConcurrentAllEvaluator, cancel: CancellationToken) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn evaluate(&self, policy: &PolicyNode, ctx: &mut PolicyContext) -> AssertionStatus {
        self.run(policy, ctx).await
    }

    fn aborted(&self, ctx: &mut PolicyContext) -> bool {
        if self.cancel.is_cancelled() {
            ctx.add_detail(AuditLevel::Warning, "Policy evaluation aborted");
            return true;
        }
        false
    }
}

impl Default for PolicyInterpreter {
    fn default() -> Self {
        Self::new(ConcurrentAllEvaluator::default())
    }
}

#[async_trait]
impl PolicyRunner for PolicyInterpreter {
    async fn run(&self, node: &PolicyNode, ctx: &mut PolicyContext) -> AssertionStatus {
        match node {
            PolicyNode::Leaf(assertion) => match assertion.check_request(ctx).await {
                Ok(status) => {
                    debug!(assertion = assertion.name(), %status, "Assertion evaluated");
                    status
                }
                Err(e) => {
                    warn!(assertion = assertion.name(), error = %e, "Assertion failed");
                    ctx.add_detail(
                        AuditLevel::Error,
                        format!("Assertion '{}' failed: {}", assertion.name(), e),
                    );
                    AssertionStatus::Failed
                }
            },
            PolicyNode::All(children) => {
                for child in children.iter() {
                    if self.aborted(ctx) {
                        return AssertionStatus::Failed;
                    }
                    let status = self.run(child, ctx).await;
                    if !status.is_success() {
                        return status;
                    }
                }
                AssertionStatus::Success
            }
            PolicyNode::OneOrMore(children) => {
                for child in children.iter() {
                    if self.aborted(ctx) {
                        return AssertionStatus::Failed;
                    }
                    if self.run(child, ctx).await.is_success() {
                        return AssertionStatus::Success;
                    }
                }
                AssertionStatus::Falsified
            }
            PolicyNode::ConcurrentAll(children) => {
                let runner: Arc<dyn PolicyRunner> = Arc::new(self.clone());
                self.evaluator.evaluate(runner, children, ctx, &self.cancel).await
            }
        }
    }
}

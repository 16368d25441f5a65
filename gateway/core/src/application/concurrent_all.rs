// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Concurrent-All Evaluator
//!
//! Evaluates the direct children of a `ConcurrentAll` node on separate tokio
//! tasks and folds the results back into the caller's context.
//!
//! ## Phases
//!
//! | Phase | Work |
//! |-------|------|
//! | Dispatch | fork one isolated [`PolicyContext`] per child, spawn one task each, in declaration order |
//! | Await | join every task; the only suspension point of an evaluation |
//! | Aggregate | merge variable writes and audit details into the parent in declaration order |
//! | Decide | `Success` if all branches succeeded, else the status of the first failing branch by index |
//!
//! Completion order never leaks into the result: two runs with different
//! scheduling produce the same merged variables, audit order and status.
//!
//! A branch that panics is reported as `Failed` with an audit detail; it
//! cannot disturb its siblings. There is no per-branch timeout, so a branch
//! that never finishes stalls the whole evaluation until the enclosing
//! request is cancelled.

use crate::application::interpreter::PolicyRunner;
use crate::domain::assertion::{AssertionStatus, PolicyNode};
use crate::domain::audit::AuditLevel;
use crate::domain::context::PolicyContext;
use crate::domain::gateway_config::EvaluatorConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one Concurrent-All evaluation in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvaluationId(pub Uuid);

impl EvaluationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct BranchResult {
    index: usize,
    status: AssertionStatus,
    context: PolicyContext,
}

enum BranchOutcome {
    Completed(BranchResult),
    Cancelled { index: usize },
    Panicked { index: usize, message: String },
}

pub struct ConcurrentAllEvaluator {
    config: EvaluatorConfig,
}

impl ConcurrentAllEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> EvaluatorConfig {
        self.config
    }

    /// Runs `children` concurrently against isolated views of `ctx` and merges
    /// the results back in declaration order.
    ///
    /// If `cancel` fires before every branch has finished, unfinished
    /// branches are abandoned and their writes discarded, finished branches
    /// are still merged, and the evaluation reports `Failed`. Dropping the
    /// returned future cancels the branches as well.
    pub async fn evaluate(
        &self,
        runner: Arc<dyn PolicyRunner>,
        children: &[PolicyNode],
        ctx: &mut PolicyContext,
        cancel: &CancellationToken,
    ) -> AssertionStatus {
        if children.is_empty() {
            return AssertionStatus::Success;
        }

        let evaluation_id = EvaluationId::new();
        let started = Instant::now();
        let abort = cancel.child_token();
        let _abort_on_drop = abort.clone().drop_guard();
        // Per evaluation, so nested Concurrent-All nodes cannot starve each other.
        let limiter = self
            .config
            .max_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));

        info!(
            %evaluation_id,
            branches = children.len(),
            max_concurrency = ?self.config.max_concurrency,
            "Dispatching concurrent-all branches"
        );

        let handles: Vec<_> = children
            .iter()
            .enumerate()
            .map(|(index, child)| {
                tokio::spawn(run_branch(
                    index,
                    Arc::clone(&runner),
                    child.clone(),
                    ctx.fork_branch(index),
                    limiter.clone(),
                    abort.clone(),
                ))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        join_error.to_string()
                    };
                    BranchOutcome::Panicked { index, message }
                }
            };
            outcomes.push(outcome);
        }

        let status = aggregate(evaluation_id, outcomes, ctx);
        let elapsed = started.elapsed();

        metrics::histogram!("gateway_concurrent_all_branches").record(children.len() as f64);
        metrics::histogram!("gateway_concurrent_all_duration_seconds").record(elapsed.as_secs_f64());
        metrics::counter!("gateway_concurrent_all_evaluations_total", "outcome" => status.as_str())
            .increment(1);
        info!(
            %evaluation_id,
            %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Concurrent-all evaluation finished"
        );

        status
    }
}

impl Default for ConcurrentAllEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

async fn run_branch(
    index: usize,
    runner: Arc<dyn PolicyRunner>,
    node: PolicyNode,
    mut ctx: PolicyContext,
    limiter: Option<Arc<Semaphore>>,
    abort: CancellationToken,
) -> BranchOutcome {
    let work = async move {
        let _permit = match limiter {
            Some(limiter) => limiter.acquire_owned().await.ok(),
            None => None,
        };
        let status = runner.run(&node, &mut ctx).await;
        (status, ctx)
    };

    tokio::select! {
        biased;
        _ = abort.cancelled() => BranchOutcome::Cancelled { index },
        (status, context) = work => BranchOutcome::Completed(BranchResult { index, status, context }),
    }
}

fn aggregate(
    evaluation_id: EvaluationId,
    outcomes: Vec<BranchOutcome>,
    ctx: &mut PolicyContext,
) -> AssertionStatus {
    let mut first_failure: Option<AssertionStatus> = None;
    let mut abandoned = 0usize;

    for outcome in outcomes {
        match outcome {
            BranchOutcome::Completed(result) => {
                debug!(
                    %evaluation_id,
                    branch = result.index,
                    status = %result.status,
                    writes = result.context.pending_writes().len(),
                    "Merging branch"
                );
                if !result.status.is_success() && first_failure.is_none() {
                    first_failure = Some(result.status);
                }
                ctx.merge_branch(result.context);
            }
            BranchOutcome::Cancelled { index } => {
                debug!(%evaluation_id, branch = index, "Discarding abandoned branch");
                abandoned += 1;
            }
            BranchOutcome::Panicked { index, message } => {
                warn!(%evaluation_id, branch = index, error = %message, "Concurrent branch panicked");
                ctx.add_branch_detail(
                    index,
                    AuditLevel::Error,
                    format!("Concurrent branch {} failed unexpectedly: {}", index, message),
                );
                if first_failure.is_none() {
                    first_failure = Some(AssertionStatus::Failed);
                }
            }
        }
    }

    if abandoned > 0 {
        warn!(%evaluation_id, abandoned, "Concurrent-all evaluation aborted");
        ctx.add_detail(
            AuditLevel::Warning,
            format!("Concurrent evaluation aborted; {} unfinished branch(es) discarded", abandoned),
        );
        return AssertionStatus::Failed;
    }

    first_failure.unwrap_or(AssertionStatus::Success)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for Concurrent-All evaluation through the policy interpreter.
//!
//! Branches are driven by small assertions that sleep, copy variables and
//! report a fixed status, so the tests can control completion order and
//! observe what the parent context looks like after aggregation.

use async_trait::async_trait;
use gateway_core::application::{ConcurrentAllEvaluator, PolicyInterpreter};
use gateway_core::domain::assertion::{Assertion, AssertionError, AssertionStatus, PolicyNode};
use gateway_core::domain::audit::{AuditLevel, InMemoryAuditSink};
use gateway_core::domain::context::PolicyContext;
use gateway_core::domain::gateway_config::EvaluatorConfig;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Sleeps, then writes `name = value` and reports `status`.
struct WriteAfter {
    delay: Duration,
    name: String,
    value: Value,
    status: AssertionStatus,
}

#[async_trait]
impl Assertion for WriteAfter {
    fn name(&self) -> &str {
        "write_after"
    }

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError> {
        tokio::time::sleep(self.delay).await;
        ctx.set_variable(self.name.clone(), self.value.clone());
        ctx.add_detail(AuditLevel::Info, format!("wrote {}", self.name));
        Ok(self.status)
    }
}

/// Sleeps, then copies one variable into another.
struct DelayedCopy {
    delay: Duration,
    from: &'static str,
    to: &'static str,
}

#[async_trait]
impl Assertion for DelayedCopy {
    fn name(&self) -> &str {
        "delayed_copy"
    }

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError> {
        tokio::time::sleep(self.delay).await;
        let value = ctx
            .variable(self.from)
            .cloned()
            .ok_or_else(|| AssertionError::Execution(format!("variable '{}' is not set", self.from)))?;
        ctx.set_variable(self.to, value);
        Ok(AssertionStatus::Success)
    }
}

fn write_after(delay_ms: u64, name: &str, value: Value, status: AssertionStatus) -> PolicyNode {
    PolicyNode::leaf(WriteAfter {
        delay: Duration::from_millis(delay_ms),
        name: name.to_string(),
        value,
        status,
    })
}

#[tokio::test]
async fn test_falsified_branch_sets_status_and_siblings_still_merge() {
    let interpreter = PolicyInterpreter::default();
    let policy = PolicyNode::concurrent_all(vec![
        write_after(30, "b0", json!(0), AssertionStatus::Success),
        write_after(10, "b1", json!(1), AssertionStatus::Success),
        write_after(20, "b2", json!(2), AssertionStatus::Falsified),
        write_after(0, "b3", json!(3), AssertionStatus::Success),
    ]);
    let mut ctx = PolicyContext::default();

    let status = interpreter.evaluate(&policy, &mut ctx).await;

    assert_eq!(status, AssertionStatus::Falsified);
    for (name, value) in [("b0", 0), ("b1", 1), ("b3", 3)] {
        assert_eq!(ctx.variable(name), Some(&json!(value)));
    }
    let messages: Vec<_> = ctx.audit_details().iter().map(|d| d.message.clone()).collect();
    assert_eq!(messages, vec!["wrote b0", "wrote b1", "wrote b2", "wrote b3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_completion_order_is_invisible() {
    // Every branch writes the shared key, so the winner depends only on merge order.
    let mut expected: Option<(AssertionStatus, HashMap<String, Value>, Vec<String>)> = None;

    for _ in 0..20 {
        let delays: Vec<u64> = {
            let mut rng = rand::rng();
            (0..6).map(|_| rng.random_range(0..25)).collect()
        };
        let children: Vec<PolicyNode> = delays
            .iter()
            .enumerate()
            .map(|(i, delay)| {
                let status = if i == 4 {
                    AssertionStatus::Falsified
                } else {
                    AssertionStatus::Success
                };
                PolicyNode::all(vec![
                    write_after(*delay, &format!("own{}", i), json!(i), AssertionStatus::Success),
                    write_after(0, "shared", json!(i), status),
                ])
            })
            .collect();
        let policy = PolicyNode::concurrent_all(children);

        let mut ctx = PolicyContext::default();
        let status = PolicyInterpreter::default().evaluate(&policy, &mut ctx).await;
        let messages = ctx.audit_details().iter().map(|d| d.message.clone()).collect();
        let observed = (status, ctx.variables().clone(), messages);

        match &expected {
            Some(first) => assert_eq!(&observed, first, "delays {:?}", delays),
            None => expected = Some(observed),
        }
    }

    let (status, variables, _) = expected.unwrap();
    assert_eq!(status, AssertionStatus::Falsified);
    assert_eq!(variables.get("shared"), Some(&json!(5)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_branches_run_in_parallel() {
    let branch = |from: &'static str, to: &'static str| {
        PolicyNode::all(vec![PolicyNode::leaf(DelayedCopy {
            delay: Duration::from_secs(2),
            from,
            to,
        })])
    };
    let policy = PolicyNode::concurrent_all(vec![branch("source1", "dest1"), branch("source2", "dest2")]);

    let mut ctx = PolicyContext::default();
    ctx.set_variable("source1", "alpha");
    ctx.set_variable("source2", "beta");

    let started = Instant::now();
    let status = PolicyInterpreter::default().evaluate(&policy, &mut ctx).await;
    let elapsed = started.elapsed();

    assert_eq!(status, AssertionStatus::Success);
    assert!(elapsed < Duration::from_secs(4), "took {:?}", elapsed);
    assert_eq!(ctx.variable("dest1"), Some(&json!("alpha")));
    assert_eq!(ctx.variable("dest2"), Some(&json!("beta")));
}

#[tokio::test]
async fn test_branches_do_not_see_each_others_writes() {
    let policy = PolicyNode::concurrent_all(vec![
        write_after(0, "early", json!(true), AssertionStatus::Success),
        PolicyNode::leaf(DelayedCopy {
            delay: Duration::from_millis(50),
            from: "early",
            to: "copied",
        }),
    ]);
    let mut ctx = PolicyContext::default();

    let status = PolicyInterpreter::default().evaluate(&policy, &mut ctx).await;

    assert_eq!(status, AssertionStatus::Failed);
    assert_eq!(ctx.variable("early"), Some(&json!(true)));
    assert!(ctx.variable("copied").is_none());
    let error = ctx.audit_details().last().unwrap();
    assert_eq!(error.level, AuditLevel::Error);
    assert_eq!(error.source_branch, vec![1]);
}

#[tokio::test]
async fn test_nested_concurrent_all_propagates_writes_outward() {
    let policy = PolicyNode::concurrent_all(vec![
        PolicyNode::concurrent_all(vec![
            write_after(10, "inner0", json!("a"), AssertionStatus::Success),
            write_after(0, "inner1", json!("b"), AssertionStatus::Success),
        ]),
        write_after(5, "outer1", json!("c"), AssertionStatus::Success),
    ]);
    let mut ctx = PolicyContext::default();
    let sink = InMemoryAuditSink::new();

    let status = PolicyInterpreter::default().evaluate(&policy, &mut ctx).await;
    let paths: Vec<Vec<usize>> = ctx.audit_details().iter().map(|d| d.source_branch.clone()).collect();
    ctx.flush_audit(&sink);

    assert_eq!(status, AssertionStatus::Success);
    assert_eq!(ctx.variable("inner0"), Some(&json!("a")));
    assert_eq!(ctx.variable("inner1"), Some(&json!("b")));
    assert_eq!(ctx.variable("outer1"), Some(&json!("c")));
    assert_eq!(paths, vec![vec![0, 0], vec![0, 1], vec![1]]);
    assert_eq!(sink.messages(), vec!["wrote inner0", "wrote inner1", "wrote outer1"]);
    assert!(ctx.audit_details().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nested_evaluations_with_concurrency_limit_complete() {
    let evaluator = ConcurrentAllEvaluator::new(EvaluatorConfig {
        max_concurrency: Some(1),
    });
    let interpreter = PolicyInterpreter::new(evaluator);
    let policy = PolicyNode::concurrent_all(vec![
        PolicyNode::concurrent_all(vec![
            write_after(5, "x", json!(1), AssertionStatus::Success),
            write_after(5, "y", json!(2), AssertionStatus::Success),
        ]),
        write_after(5, "z", json!(3), AssertionStatus::Success),
    ]);
    let mut ctx = PolicyContext::default();

    let status = tokio::time::timeout(Duration::from_secs(5), interpreter.evaluate(&policy, &mut ctx))
        .await
        .expect("nested evaluation should not deadlock");

    assert_eq!(status, AssertionStatus::Success);
    assert_eq!(ctx.variables().len(), 3);
}

#[tokio::test]
async fn test_request_cancellation_aborts_evaluation() {
    let cancel = CancellationToken::new();
    let interpreter = PolicyInterpreter::with_cancellation(ConcurrentAllEvaluator::default(), cancel.clone());
    let policy = PolicyNode::all(vec![
        PolicyNode::concurrent_all(vec![
            write_after(0, "done", json!(true), AssertionStatus::Success),
            write_after(60_000, "hung", json!(true), AssertionStatus::Success),
        ]),
        write_after(0, "after", json!(true), AssertionStatus::Success),
    ]);
    let mut ctx = PolicyContext::default();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let status = interpreter.evaluate(&policy, &mut ctx).await;

    assert_eq!(status, AssertionStatus::Failed);
    assert_eq!(ctx.variable("done"), Some(&json!(true)));
    assert!(ctx.variable("hung").is_none());
    assert!(ctx.variable("after").is_none());
    assert!(ctx
        .audit_details()
        .iter()
        .any(|d| d.level == AuditLevel::Warning && d.message.contains("aborted")));
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local demonstrations of the policy engine
//!
//! Commands: cache, concurrent-all

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use gateway_core::application::{
    CacheLookupAssertion, CacheStoreAssertion, ConcurrentAllEvaluator, PolicyInterpreter,
};
use gateway_core::domain::assertion::{Assertion, AssertionError, AssertionStatus, PolicyNode};
use gateway_core::domain::context::{Message, PolicyContext};
use gateway_core::domain::gateway_config::GatewayConfigManifest;
use gateway_core::domain::lifecycle::LifecycleEvent;
use gateway_core::infrastructure::{CacheRegistry, LifecycleBus, TracingAuditSink};

#[derive(Subcommand)]
pub enum DemoCommand {
    /// Serve repeated requests through a cached route
    Cache {
        /// Cache to store responses in
        #[arg(long, default_value = "quotes")]
        cache: String,

        /// Number of requests to send
        #[arg(short, long, default_value = "10")]
        requests: usize,

        /// Distinct cache keys the requests cycle through
        #[arg(short, long, default_value = "3")]
        keys: usize,
    },

    /// Run sleeping branches under a Concurrent-All node
    ConcurrentAll {
        /// Number of branches
        #[arg(short, long, default_value = "2")]
        branches: usize,

        /// How long each branch sleeps, in milliseconds
        #[arg(long, default_value = "2000")]
        delay_ms: u64,
    },
}

pub async fn handle_command(command: DemoCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let interpreter = PolicyInterpreter::with_cancellation(
        ConcurrentAllEvaluator::new(config.spec.evaluator),
        cancel_on_ctrl_c(),
    );

    match command {
        DemoCommand::Cache {
            cache,
            requests,
            keys,
        } => cache_demo(&config, &interpreter, &cache, requests, keys).await,
        DemoCommand::ConcurrentAll { branches, delay_ms } => {
            concurrent_all_demo(&interpreter, branches, Duration::from_millis(delay_ms)).await
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling evaluation");
            trigger.cancel();
        }
    });
    cancel
}

/// Answers a request as a routed backend would; counts invocations.
struct SimulatedBackend {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Assertion for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated_backend"
    }

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let key = ctx.variable("key").cloned().unwrap_or(json!(null));
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.set_response(Message::new(
            json!({ "key": key, "backend_call": call }).to_string(),
            Some("application/json".to_string()),
        ));
        Ok(AssertionStatus::Success)
    }
}

async fn cache_demo(
    config: &GatewayConfigManifest,
    interpreter: &PolicyInterpreter,
    cache_name: &str,
    requests: usize,
    keys: usize,
) -> Result<()> {
    let registry = Arc::new(CacheRegistry::from_settings(&config.spec.cache));
    let bus = LifecycleBus::with_default_capacity();
    let watcher = registry.watch_lifecycle(bus.subscribe());
    bus.publish(LifecycleEvent::started());

    let calls = Arc::new(AtomicUsize::new(0));
    let template = "response:${key}";
    let policy = PolicyNode::one_or_more(vec![
        PolicyNode::leaf(CacheLookupAssertion::new(registry.clone(), cache_name, template)),
        PolicyNode::all(vec![
            PolicyNode::leaf(SimulatedBackend {
                calls: calls.clone(),
            }),
            PolicyNode::leaf(CacheStoreAssertion::new(registry.clone(), cache_name, template)),
        ]),
    ]);

    println!("{}", format!("Sending {} requests over {} keys", requests, keys.max(1)).bold());
    let sink = TracingAuditSink;
    for i in 0..requests {
        let mut ctx = PolicyContext::new(Message::empty());
        ctx.set_variable("key", format!("k{}", i % keys.max(1)));

        let before = calls.load(Ordering::SeqCst);
        let status = interpreter.evaluate(&policy, &mut ctx).await;
        let source = if calls.load(Ordering::SeqCst) > before {
            "backend".yellow()
        } else {
            "cache".green()
        };
        println!(
            "  #{:<3} {} {} {}",
            i,
            status,
            source,
            String::from_utf8_lossy(ctx.response().body())
        );
        ctx.flush_audit(&sink);
    }
    println!();

    if let Some(cache) = registry.get(cache_name) {
        let stats = cache.stats();
        println!("{}", format!("Cache '{}':", cache_name).bold());
        println!("  Resident entries: {}", cache.len());
        println!("  Hits: {}  Misses: {}", stats.hits, stats.misses);
        println!(
            "  Stores: {}  Rejected: {}  Evictions: {}",
            stats.stores, stats.rejected, stats.evictions
        );
    }
    println!("  Backend calls: {}", calls.load(Ordering::SeqCst));

    bus.publish_stopping();
    watcher.await.context("Lifecycle watcher failed")?;
    println!(
        "{}",
        format!("✓ Registry shut down (closed: {})", registry.is_closed()).green()
    );

    Ok(())
}

/// Sleeps, then copies one variable into another.
struct DelayedCopy {
    delay: Duration,
    from: String,
    to: String,
}

#[async_trait]
impl Assertion for DelayedCopy {
    fn name(&self) -> &str {
        "delayed_copy"
    }

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError> {
        tokio::time::sleep(self.delay).await;
        match ctx.variable(&self.from).cloned() {
            Some(value) => {
                ctx.set_variable(self.to.clone(), value);
                Ok(AssertionStatus::Success)
            }
            None => Ok(AssertionStatus::Falsified),
        }
    }
}

async fn concurrent_all_demo(
    interpreter: &PolicyInterpreter,
    branches: usize,
    delay: Duration,
) -> Result<()> {
    let mut ctx = PolicyContext::new(Message::empty());
    let children: Vec<PolicyNode> = (1..=branches)
        .map(|i| {
            ctx.set_variable(format!("source{}", i), format!("value-{}", i));
            PolicyNode::all(vec![PolicyNode::leaf(DelayedCopy {
                delay,
                from: format!("source{}", i),
                to: format!("dest{}", i),
            })])
        })
        .collect();
    let policy = PolicyNode::concurrent_all(children);

    println!(
        "{}",
        format!("Running {} branches of {:?} each", branches, delay).bold()
    );
    let started = Instant::now();
    let status = interpreter.evaluate(&policy, &mut ctx).await;
    let elapsed = started.elapsed();

    println!("  Status: {}", status);
    match serial_duration(delay, branches) {
        Some(serial) => println!("  Elapsed: {:?} (serial would take {:?})", elapsed, serial),
        None => println!("  Elapsed: {:?}", elapsed),
    }
    for i in 1..=branches {
        let name = format!("dest{}", i);
        match ctx.variable(&name) {
            Some(value) => println!("  {} = {}", name, value),
            None => println!("  {} = {}", name, "(unset)".dimmed()),
        }
    }
    ctx.flush_audit(&TracingAuditSink);

    if status.is_success() {
        println!("{}", "✓ All branches succeeded".green());
    } else {
        println!("{}", format!("✗ Evaluation ended with {}", status).red());
    }

    Ok(())
}

/// Time the branches would take back to back; `None` if it does not fit a `Duration`.
fn serial_duration(delay: Duration, branches: usize) -> Option<Duration> {
    u32::try_from(branches)
        .ok()
        .and_then(|branches| delay.checked_mul(branches))
}

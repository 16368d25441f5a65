// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: policy evaluation and the cache policy steps.

pub mod cache_steps;
pub mod concurrent_all;
pub mod interpreter;

pub use cache_steps::{CacheLookupAssertion, CacheStoreAssertion, MessageTarget};
pub use concurrent_all::{ConcurrentAllEvaluator, EvaluationId};
pub use interpreter::{PolicyInterpreter, PolicyRunner};

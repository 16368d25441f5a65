// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Gateway Core
//!
//! In-process building blocks for the policy-enforcement gateway:
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `PolicyNode`, `PolicyContext`, audit details, cache value types, gateway config |
//! | [`application`] | Application | Concurrent-All evaluator, policy interpreter, cache policy steps |
//! | [`infrastructure`] | Infrastructure | `BoundedCache`, `CacheRegistry`, lifecycle bus, tracing audit sink |
//!
//! The surrounding policy engine owns the [`infrastructure::cache::CacheRegistry`]
//! and the [`application::interpreter::PolicyInterpreter`]; nothing in this crate
//! keeps process-global state.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

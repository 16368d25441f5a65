// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod cache;
pub mod lifecycle_bus;

pub use audit::TracingAuditSink;
pub use cache::{BoundedCache, CacheRegistry};
pub use lifecycle_bus::{LifecycleBus, LifecycleBusError, LifecycleReceiver};

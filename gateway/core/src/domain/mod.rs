// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: pure types with no I/O.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`assertion`] | `Assertion`, `AssertionStatus`, `PolicyNode` |
//! | [`audit`] | `AuditDetail`, `AuditSink`, `InMemoryAuditSink` |
//! | [`cache`] | `CacheConfig`, `CacheEntry`, `CacheStats`, `CacheError` |
//! | [`clock`] | `Clock`, `SystemClock`, `ManualClock` |
//! | [`context`] | `PolicyContext`, `Message` |
//! | [`gateway_config`] | `GatewayConfigManifest` |
//! | [`key_template`] | `KeyTemplate` |
//! | [`lifecycle`] | `LifecycleEvent` |

pub mod assertion;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod context;
pub mod gateway_config;
pub mod key_template;
pub mod lifecycle;

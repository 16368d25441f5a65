// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bounded response caching: the per-name [`BoundedCache`] and the
//! [`CacheRegistry`] that hands them out.

pub mod bounded_cache;
pub mod registry;

pub use bounded_cache::BoundedCache;
pub use registry::CacheRegistry;

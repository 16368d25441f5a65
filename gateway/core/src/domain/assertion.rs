// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Assertions and the Policy Tree
//!
//! A policy is a tree of [`PolicyNode`]s. Leaves are [`Assertion`]s; inner
//! nodes are combinators:
//!
//! | Node | Semantics |
//! |------|-----------|
//! | `All` | every child must succeed; stops at the first non-success |
//! | `OneOrMore` | at least one child must succeed; stops at the first success |
//! | `ConcurrentAll` | every child runs on its own task; all must succeed |

use crate::domain::cache::CacheError;
use crate::domain::context::PolicyContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionStatus {
    Success,
    /// Definite negative outcome, not an infrastructure fault.
    Falsified,
    /// The assertion could not be evaluated.
    Failed,
}

impl AssertionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, AssertionStatus::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssertionStatus::Success => "success",
            AssertionStatus::Falsified => "falsified",
            AssertionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AssertionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Assertion execution failed: {0}")]
    Execution(String),
}

#[async_trait]
pub trait Assertion: Send + Sync {
    fn name(&self) -> &str;

    async fn check_request(&self, ctx: &mut PolicyContext) -> Result<AssertionStatus, AssertionError>;
}

/// Node of a policy tree. Cloning is cheap; children are shared.
#[derive(Clone)]
pub enum PolicyNode {
    Leaf(Arc<dyn Assertion>),
    All(Arc<[PolicyNode]>),
    OneOrMore(Arc<[PolicyNode]>),
    ConcurrentAll(Arc<[PolicyNode]>),
}

impl PolicyNode {
    pub fn leaf(assertion: impl Assertion + 'static) -> Self {
        PolicyNode::Leaf(Arc::new(assertion))
    }

    pub fn all(children: Vec<PolicyNode>) -> Self {
        PolicyNode::All(children.into())
    }

    pub fn one_or_more(children: Vec<PolicyNode>) -> Self {
        PolicyNode::OneOrMore(children.into())
    }

    pub fn concurrent_all(children: Vec<PolicyNode>) -> Self {
        PolicyNode::ConcurrentAll(children.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PolicyNode::Leaf(_) => "leaf",
            PolicyNode::All(_) => "all",
            PolicyNode::OneOrMore(_) => "one_or_more",
            PolicyNode::ConcurrentAll(_) => "concurrent_all",
        }
    }

    pub fn children(&self) -> &[PolicyNode] {
        match self {
            PolicyNode::Leaf(_) => &[],
            PolicyNode::All(children)
            | PolicyNode::OneOrMore(children)
            | PolicyNode::ConcurrentAll(children) => &children[..],
        }
    }
}

impl fmt::Debug for PolicyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyNode::Leaf(assertion) => f.debug_tuple("Leaf").field(&assertion.name()).finish(),
            PolicyNode::All(children) => f.debug_tuple("All").field(children).finish(),
            PolicyNode::OneOrMore(children) => f.debug_tuple("OneOrMore").field(children).finish(),
            PolicyNode::ConcurrentAll(children) => {
                f.debug_tuple("ConcurrentAll").field(children).finish()
            }
        }
    }
}

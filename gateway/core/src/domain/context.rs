// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Evaluation Context
//!
//! Per-request state threaded through policy evaluation: a variable store,
//! the request and response [`Message`]s, and the audit details recorded so
//! far.
//!
//! A Concurrent-All node never shares a context between tasks. Each branch
//! gets its own [`PolicyContext::fork_branch`] view holding a snapshot of the
//! parent's variables, an empty audit buffer and a write log. Once every
//! branch has finished, the parent folds them back with
//! [`PolicyContext::merge_branch`] in declaration order.

use crate::domain::audit::{AuditDetail, AuditLevel, AuditSink};
use bytes::buf::Reader;
use bytes::{Buf, Bytes};
use serde_json::Value;
use std::collections::HashMap;

/// Immutable message body plus its content type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    body: Bytes,
    content_type: Option<String>,
}

impl Message {
    pub fn new(body: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Streaming view over the body. Shares the buffer, does not copy it.
    pub fn reader(&self) -> Reader<Bytes> {
        self.body.clone().reader()
    }
}

#[derive(Debug, Default)]
pub struct PolicyContext {
    variables: HashMap<String, Value>,
    request: Message,
    response: Message,
    audit: Vec<AuditDetail>,
    branch_path: Vec<usize>,
    /// Ordered variable writes; only kept on branch views.
    writes: Option<Vec<(String, Value)>>,
    request_replaced: bool,
    response_replaced: bool,
}

impl PolicyContext {
    pub fn new(request: Message) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(writes) = self.writes.as_mut() {
            writes.push((name.clone(), value.clone()));
        }
        self.variables.insert(name, value);
    }

    pub fn request(&self) -> &Message {
        &self.request
    }

    pub fn response(&self) -> &Message {
        &self.response
    }

    pub fn set_request(&mut self, message: Message) {
        self.request = message;
        self.request_replaced = true;
    }

    pub fn set_response(&mut self, message: Message) {
        self.response = message;
        self.response_replaced = true;
    }

    /// Branch indices from the outermost Concurrent-All down to this view.
    pub fn branch_path(&self) -> &[usize] {
        &self.branch_path
    }

    pub fn is_branch(&self) -> bool {
        self.writes.is_some()
    }

    /// Records an audit detail attributed to this context's branch.
    pub fn add_detail(&mut self, level: AuditLevel, message: impl Into<String>) {
        let detail = AuditDetail::new(level, message).with_source_branch(self.branch_path.clone());
        self.audit.push(detail);
    }

    /// Records an audit detail on behalf of a direct child branch that could
    /// not record it itself (it panicked or was abandoned).
    pub fn add_branch_detail(&mut self, index: usize, level: AuditLevel, message: impl Into<String>) {
        let mut source_branch = self.branch_path.clone();
        source_branch.push(index);
        let detail = AuditDetail::new(level, message).with_source_branch(source_branch);
        self.audit.push(detail);
    }

    pub fn audit_details(&self) -> &[AuditDetail] {
        &self.audit
    }

    /// Writes recorded by this branch view, in the order they were made.
    pub fn pending_writes(&self) -> &[(String, Value)] {
        self.writes.as_deref().unwrap_or(&[])
    }

    /// Creates the isolated view handed to branch `index` of a Concurrent-All.
    pub fn fork_branch(&self, index: usize) -> PolicyContext {
        let mut branch_path = self.branch_path.clone();
        branch_path.push(index);

        PolicyContext {
            variables: self.variables.clone(),
            request: self.request.clone(),
            response: self.response.clone(),
            audit: Vec::new(),
            branch_path,
            writes: Some(Vec::new()),
            request_replaced: false,
            response_replaced: false,
        }
    }

    /// Folds a finished branch back into this context.
    ///
    /// Writes replay through [`PolicyContext::set_variable`], so a merge into a
    /// context that is itself a branch view keeps propagating outward.
    pub fn merge_branch(&mut self, branch: PolicyContext) {
        let PolicyContext {
            request,
            response,
            audit,
            writes,
            request_replaced,
            response_replaced,
            ..
        } = branch;

        for (name, value) in writes.unwrap_or_default() {
            self.set_variable(name, value);
        }
        if request_replaced {
            self.set_request(request);
        }
        if response_replaced {
            self.set_response(response);
        }
        self.audit.extend(audit);
    }

    /// Drains every recorded detail into `sink`, oldest first.
    pub fn flush_audit(&mut self, sink: &dyn AuditSink) {
        for detail in self.audit.drain(..) {
            sink.record_detail(detail);
        }
    }
}

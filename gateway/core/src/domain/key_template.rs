// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cache key templates with `${variable}` references resolved against a
//! [`PolicyContext`].

use crate::domain::context::PolicyContext;
use serde_json::Value;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl KeyTemplate {
    /// Parses a template. An unterminated `${` or an empty `${}` is kept as
    /// literal text.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source.as_str();

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) if end > 0 => {
                    literal.push_str(&rest[..start]);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(after[..end].trim().to_string()));
                    rest = &after[end + 1..];
                }
                Some(end) => {
                    // `${}`
                    literal.push_str(&rest[..start + 3 + end]);
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { source, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the variables referenced by this template, in order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes variable references. Missing variables render as "".
    pub fn render(&self, ctx: &PolicyContext) -> String {
        let mut key = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::Variable(name) => match ctx.variable(name) {
                    Some(Value::String(s)) => key.push_str(s),
                    Some(Value::Null) => {}
                    Some(other) => key.push_str(&other.to_string()),
                    None => debug!(variable = %name, template = %self.source, "Cache key variable not set"),
                },
            }
        }
        key
    }
}

impl From<&str> for KeyTemplate {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl From<String> for KeyTemplate {
    fn from(source: String) -> Self {
        Self::parse(source)
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

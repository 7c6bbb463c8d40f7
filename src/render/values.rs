//! Value Store - named string expressions
//!
//! A store maps keys to expressions. Resolving a key evaluates its
//! expression against the same store; the store itself is never modified
//! by resolution.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::template::{self, Segment};
use super::RenderContext;
use crate::cmd::Command;
use crate::error::{Result, ValetError};

/// `key:Other` - use the resolved value of `Other`
pub const KEY_PREFIX: &str = "key:";
/// `template:body` - substitute `{{ .Name }}` placeholders in `body`
pub const TEMPLATE_PREFIX: &str = "template:";
/// `env:NAME` - read `NAME` from the environment config
pub const ENV_PREFIX: &str = "env:";
/// `cmd:line` - trimmed stdout of a shell command
pub const CMD_PREFIX: &str = "cmd:";

/// Key → expression map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(BTreeMap<String, String>);

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, expression: impl Into<String>) -> Self {
        self.insert(key, expression);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, expression: impl Into<String>) {
        self.0.insert(key.into(), expression.into());
    }

    /// Raw (unresolved) expression for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Combine two stores without touching either.
    ///
    /// Entries already in `self` win over entries in `other`; keys only in
    /// `other` are added.
    pub fn merge(&self, other: &Values) -> Values {
        let mut merged = self.0.clone();
        for (key, expression) in &other.0 {
            merged
                .entry(key.clone())
                .or_insert_with(|| expression.clone());
        }
        Values(merged)
    }

    /// Resolve a key to its concrete string
    pub async fn resolve(&self, key: &str, rctx: &RenderContext<'_>) -> Result<String> {
        self.resolve_key(key, rctx, Vec::new()).await
    }

    /// Resolve every key (used to render whole files)
    pub async fn resolve_all(&self, rctx: &RenderContext<'_>) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for key in self.0.keys() {
            resolved.insert(key.clone(), self.resolve(key, rctx).await?);
        }
        Ok(resolved)
    }

    /// Substitute `{{ .Name }}` placeholders in arbitrary text with resolved values
    pub async fn render_template(&self, body: &str, rctx: &RenderContext<'_>) -> Result<String> {
        self.expand(body, rctx, Vec::new()).await
    }

    fn resolve_key<'a>(
        &'a self,
        key: &'a str,
        rctx: &'a RenderContext<'a>,
        mut stack: Vec<String>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if stack.iter().any(|k| k == key) {
                stack.push(key.to_string());
                return Err(ValetError::ValueCycle {
                    chain: stack.join(" -> "),
                });
            }
            let expression = self.get(key).ok_or_else(|| ValetError::UndefinedValue {
                key: key.to_string(),
            })?;
            stack.push(key.to_string());
            self.evaluate(expression, rctx, stack).await
        })
    }

    fn evaluate<'a>(
        &'a self,
        expression: &'a str,
        rctx: &'a RenderContext<'a>,
        stack: Vec<String>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if let Some(other) = expression.strip_prefix(KEY_PREFIX) {
                return self.resolve_key(other.trim(), rctx, stack).await;
            }
            if let Some(body) = expression.strip_prefix(TEMPLATE_PREFIX) {
                return self.expand(body, rctx, stack).await;
            }
            if let Some(name) = expression.strip_prefix(ENV_PREFIX) {
                return rctx.env.require(name.trim()).map(str::to_string);
            }
            if let Some(line) = expression.strip_prefix(CMD_PREFIX) {
                let output = rctx.runner.output(&Command::shell(line.trim())).await?;
                return Ok(output.trim().to_string());
            }
            Ok(expression.to_string())
        })
    }

    fn expand<'a>(
        &'a self,
        body: &'a str,
        rctx: &'a RenderContext<'a>,
        stack: Vec<String>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let segments = template::parse(body)?;
            let mut out = String::with_capacity(body.len() + 32);
            for segment in segments {
                match segment {
                    Segment::Literal(text) => out.push_str(text),
                    Segment::Placeholder(name) => {
                        out.push_str(&self.resolve_key(name, rctx, stack.clone()).await?)
                    }
                }
            }
            Ok(out)
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Values(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, expression)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, expression)?;
        }
        write!(f, "}}")
    }
}

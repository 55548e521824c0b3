//! SQL templates with parameters.

use crate::value::Value;
use std::collections::BTreeMap;

/// A SQL template plus its positional (`@N`) and named (`@name`) values.
///
/// Builders produce statements; the session's binding step rewrites the
/// placeholders into a [`Command`](crate::Command).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<Value>,
    pub named: BTreeMap<String, Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Replace the positional parameters.
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add a named parameter.
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Append a positional parameter and return its index.
    pub fn push(&mut self, value: impl Into<Value>) -> usize {
        self.parameters.push(value.into());
        self.parameters.len() - 1
    }
}

//! Structured validation results.
//!
//! Data faults are recorded, not raised. A value store keeps a
//! [`ValidationLog`] that callers inspect before persisting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// Value does not have the field's semantic type.
    Type,
    /// Required value is missing.
    Required,
    /// Incoming value could not be converted on assignment.
    Coercion,
    /// Reported by a registered per-field check.
    Custom,
}

/// A single validation failure for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accumulated validation failures, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationLog {
    errors: Vec<ValidationError>,
}

impl ValidationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record a failure.
    pub fn add(&mut self, field: &str, kind: ValidationErrorKind, message: impl Into<String>) {
        self.push(ValidationError::new(field, kind, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Failures recorded for one field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    pub fn has_errors_for(&self, field: &str) -> bool {
        self.for_field(field).next().is_some()
    }

    /// Drop failures for a field, optionally restricted to one kind.
    pub fn clear_field(&mut self, field: &str, kind: Option<ValidationErrorKind>) {
        self.errors
            .retain(|e| e.field != field || kind.is_some_and(|k| k != e.kind));
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

impl fmt::Display for ValidationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ValidationLog {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

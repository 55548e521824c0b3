//! Per-field overrides of the value store's generic behavior.
//!
//! A registered hook replaces the generic setter, reset or check of one
//! field of one entity. Hooks are consulted before the generic path.

use crate::values::EntityValues;
use relmodel_core::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type SetHook = Arc<dyn Fn(&mut EntityValues, Value) + Send + Sync>;
pub type ResetHook = Arc<dyn Fn(&mut EntityValues) + Send + Sync>;
/// Returns whether the field is valid; errors go to the store's log.
pub type CheckHook = Arc<dyn Fn(&mut EntityValues) -> bool + Send + Sync>;

type Key = (String, String);

fn key(entity: &str, field: &str) -> Key {
    (entity.to_string(), field.to_string())
}

/// Registry of field hooks, keyed by entity and field name.
///
/// # Example
///
/// ```ignore
/// let hooks = FieldHooks::new()
///     .on_reset("person", "email", |v| {
///         let lower = v.get_or_null("email").to_string().to_lowercase();
///         let _ = v.set("email", lower);
///     });
/// ```
#[derive(Clone, Default)]
pub struct FieldHooks {
    setters: HashMap<Key, SetHook>,
    resets: HashMap<Key, ResetHook>,
    checks: HashMap<Key, CheckHook>,
}

impl fmt::Debug for FieldHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHooks")
            .field("setters", &self.setters.len())
            .field("resets", &self.resets.len())
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl FieldHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the typed setter of a field.
    pub fn on_set<F>(mut self, entity: &str, field: &str, hook: F) -> Self
    where
        F: Fn(&mut EntityValues, Value) + Send + Sync + 'static,
    {
        self.setters.insert(key(entity, field), Arc::new(hook));
        self
    }

    /// Replace the reset pipeline of a field.
    pub fn on_reset<F>(mut self, entity: &str, field: &str, hook: F) -> Self
    where
        F: Fn(&mut EntityValues) + Send + Sync + 'static,
    {
        self.resets.insert(key(entity, field), Arc::new(hook));
        self
    }

    /// Replace the checks of a field.
    pub fn on_check<F>(mut self, entity: &str, field: &str, hook: F) -> Self
    where
        F: Fn(&mut EntityValues) -> bool + Send + Sync + 'static,
    {
        self.checks.insert(key(entity, field), Arc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty() && self.resets.is_empty() && self.checks.is_empty()
    }

    pub(crate) fn setter(&self, entity: &str, field: &str) -> Option<SetHook> {
        self.setters.get(&key(entity, field)).cloned()
    }

    pub(crate) fn reset(&self, entity: &str, field: &str) -> Option<ResetHook> {
        self.resets.get(&key(entity, field)).cloned()
    }

    pub(crate) fn check(&self, entity: &str, field: &str) -> Option<CheckHook> {
        self.checks.get(&key(entity, field)).cloned()
    }
}

//! Configuration override documents.
//!
//! `entities.json` maps entity names to an [`EntityOverride`];
//! `fields/<entity>.json` maps field names to a [`FieldOverride`]. Both are
//! optional.

use crate::entity::Entity;
use crate::field::{CheckKind, Checks, Field, ResetKind, Resets};
use relmodel_core::{Error, FieldType, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Changes to an entity's field and key sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityOverride {
    pub alias: Option<String>,
    /// Explicit identity fields; inferred when absent.
    pub id: Option<Vec<String>>,
    pub order_default: Option<Vec<String>>,
    pub fields_add: Vec<String>,
    pub fields_sub: Vec<String>,
    pub fk_add: Vec<String>,
    pub fk_sub: Vec<String>,
    pub unique_add: Vec<String>,
    pub unique_sub: Vec<String>,
    pub not_null_add: Vec<String>,
    pub not_null_sub: Vec<String>,
}

/// Changes to a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldOverride {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub not_null: Option<bool>,
    pub default_value: Option<String>,
    pub max_length: Option<u64>,
    pub persisted: Option<bool>,
    pub checks: Option<Checks>,
    pub checks_add: Option<Checks>,
    pub checks_sub: Vec<CheckKind>,
    pub resets: Option<Resets>,
    pub resets_add: Option<Resets>,
    pub resets_sub: Vec<ResetKind>,
}

pub type EntityOverrides = BTreeMap<String, EntityOverride>;
pub type FieldOverrides = BTreeMap<String, FieldOverride>;

/// Read `entities.json` from `dir`, if present.
pub fn load_entity_overrides(dir: &Path) -> Result<Option<EntityOverrides>> {
    read_document(&dir.join("entities.json"))
}

/// Read `fields/<entity>.json` from `dir`, if present.
pub fn load_field_overrides(dir: &Path, entity: &str) -> Result<Option<FieldOverrides>> {
    read_document(&dir.join("fields").join(format!("{entity}.json")))
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    tracing::debug!(path = %path.display(), "Reading override document");
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| Error::config(format!("{}: {e}", path.display())))
}

/// `base + add - sub`, keeping first occurrences only.
fn add_sub(base: &[String], add: &[String], sub: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(base.len() + add.len());
    for name in base.iter().chain(add) {
        if !sub.contains(name) && !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

fn keep_known(names: &mut Vec<String>, fields: &[String]) {
    names.retain(|n| fields.contains(n));
}

impl EntityOverride {
    /// Apply to an entity: additions, then subtractions, then every derived
    /// set is intersected with the final field list.
    pub fn apply(&self, entity: &mut Entity) {
        if let Some(alias) = &self.alias {
            entity.alias.clone_from(alias);
        }
        if let Some(order) = &self.order_default {
            entity.order_default.clone_from(order);
        }

        entity.fields = add_sub(&entity.fields, &self.fields_add, &self.fields_sub);
        entity.fk = add_sub(&entity.fk, &self.fk_add, &self.fk_sub);
        entity.unique = add_sub(&entity.unique, &self.unique_add, &self.unique_sub);
        entity.not_null = add_sub(&entity.not_null, &self.not_null_add, &self.not_null_sub);

        let fields = entity.fields.clone();
        keep_known(&mut entity.pk, &fields);
        keep_known(&mut entity.fk, &fields);
        keep_known(&mut entity.unique, &fields);
        keep_known(&mut entity.not_null, &fields);
        keep_known(&mut entity.order_default, &fields);
        entity
            .unique_multiple
            .retain(|group| group.iter().all(|f| fields.contains(f)));
    }
}

impl FieldOverride {
    /// Reject documents whose add and subtract lists contradict each other.
    pub fn validate(&self, entity: &str, field: &str) -> Result<()> {
        let conflict = |what: &str, key: &str| {
            Error::config(format!(
                "field '{entity}.{field}': '{key}' is both added to and subtracted from {what}"
            ))
        };
        if let Some(add) = &self.checks_add {
            if let Some(k) = self.checks_sub.iter().find(|k| add.contains_key(*k)) {
                return Err(conflict("checks", &format!("{k:?}")));
            }
        }
        if let Some(add) = &self.resets_add {
            if let Some(k) = self.resets_sub.iter().find(|k| add.contains_key(*k)) {
                return Err(conflict("resets", &format!("{k:?}")));
            }
        }
        Ok(())
    }

    /// Apply to a field.
    ///
    /// Scalar properties are copied, implicit rules are re-derived, then each
    /// rule map goes through replace, add and subtract in that order.
    pub fn apply(&self, field: &mut Field) {
        if let Some(ty) = &self.field_type {
            field.field_type = ty.clone();
        }
        if let Some(not_null) = self.not_null {
            field.not_null = not_null;
        }
        if let Some(default) = &self.default_value {
            field.default_value = Some(default.clone());
        }
        if let Some(len) = self.max_length {
            field.max_length = Some(len);
        }
        if let Some(persisted) = self.persisted {
            field.persisted = persisted;
        }

        field.derive_rules();

        if let Some(checks) = &self.checks {
            field.checks.clone_from(checks);
        }
        if let Some(add) = &self.checks_add {
            field.checks.extend(add.iter().map(|(k, v)| (*k, v.clone())));
        }
        for kind in &self.checks_sub {
            field.checks.remove(kind);
        }

        if let Some(resets) = &self.resets {
            field.resets.clone_from(resets);
        }
        if let Some(add) = &self.resets_add {
            field.resets.extend(add.iter().map(|(k, v)| (*k, v.clone())));
        }
        for kind in &self.resets_sub {
            field.resets.remove(kind);
        }
    }
}

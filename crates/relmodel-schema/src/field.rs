//! Model-level fields with their checks and resets.

use crate::column::Column;
use relmodel_core::FieldType;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Validation rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckKind {
    /// Value must have the semantic type named by the parameter.
    Type,
    /// Value must not be null.
    Required,
}

/// Normalization operation kinds.
///
/// The declaration order is the order in which a value store applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResetKind {
    /// Strip the characters in the parameter from both ends.
    Trim,
    /// Collapse runs of whitespace into one space.
    RemoveMultipleSpaces,
    NullIfEmpty,
    /// Replace null with the field default.
    DefaultIfNull,
    /// Always replace with the field default.
    SetDefault,
    /// Remove digits.
    CleanDigits,
    /// Remove everything except digits.
    CleanNonDigits,
}

pub type Checks = BTreeMap<CheckKind, Json>;
pub type Resets = BTreeMap<ResetKind, Json>;

/// A field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub entity_name: String,
    pub name: String,
    /// Assigned to foreign-key fields only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Vendor data type, empty for virtual fields.
    #[serde(default)]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default)]
    pub not_null: bool,
    /// Literal or symbolic default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_field_name: Option<String>,
    #[serde(default)]
    pub checks: Checks,
    #[serde(default)]
    pub resets: Resets,
    /// False for virtual fields that have no column.
    #[serde(default = "default_persisted")]
    pub persisted: bool,
}

fn default_persisted() -> bool {
    true
}

impl Field {
    /// Field backed by a column.
    pub fn from_column(entity_name: &str, column: &Column) -> Self {
        let max_length = column.max_length.filter(|len| *len > 0);
        let mut field = Field {
            entity_name: entity_name.to_string(),
            name: column.name.clone(),
            alias: column.alias.clone(),
            field_type: FieldType::from_sql(&column.data_type, max_length, column.unsigned),
            data_type: column.data_type.clone(),
            max_length,
            not_null: !column.nullable,
            default_value: column.default_value.as_deref().and_then(normalize_default),
            ref_entity_name: column.referenced_table.clone().filter(|_| column.foreign_key),
            ref_field_name: column.referenced_column.clone().filter(|_| column.foreign_key),
            checks: Checks::new(),
            resets: Resets::new(),
            persisted: true,
        };
        field.derive_rules();
        field
    }

    /// Field with no backing column, e.g. a computed label.
    pub fn virtual_field(entity_name: &str, name: &str) -> Self {
        let mut field = Field {
            entity_name: entity_name.to_string(),
            name: name.to_string(),
            alias: None,
            field_type: FieldType::Object,
            data_type: String::new(),
            max_length: None,
            not_null: false,
            default_value: None,
            ref_entity_name: None,
            ref_field_name: None,
            checks: Checks::new(),
            resets: Resets::new(),
            persisted: false,
        };
        field.derive_rules();
        field
    }

    /// Rebuild the implicit checks and resets from type and nullability.
    ///
    /// Replaces both maps, so calling it again after a type change never
    /// leaves stale entries behind.
    pub fn derive_rules(&mut self) {
        self.checks = Checks::new();
        self.checks
            .insert(CheckKind::Type, Json::String(self.field_type.as_str().to_string()));
        if self.not_null {
            self.checks.insert(CheckKind::Required, Json::Bool(true));
        }

        self.resets = Resets::new();
        if self.field_type == FieldType::String {
            self.resets.insert(ResetKind::Trim, Json::String(" ".into()));
            self.resets
                .insert(ResetKind::RemoveMultipleSpaces, Json::Bool(true));
            if !self.not_null {
                self.resets.insert(ResetKind::NullIfEmpty, Json::Bool(true));
            }
        }
    }

    pub fn is_fk(&self) -> bool {
        self.ref_entity_name.is_some()
    }

    pub fn is_required(&self) -> bool {
        self.checks
            .get(&CheckKind::Required)
            .is_some_and(is_enabled)
    }
}

/// Whether a rule parameter switches the rule on.
///
/// `false` and `null` disable a rule; any other parameter enables it.
pub fn is_enabled(param: &Json) -> bool {
    !matches!(param, Json::Bool(false) | Json::Null)
}

/// Strip the wrapping vendors put around default expressions.
///
/// `((0))` becomes `0`, `('abc')` and `N'abc'` become `abc`. The textual
/// `NULL` default is treated as no default.
pub fn normalize_default(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    while s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        s = s[1..s.len() - 1].trim();
    }
    if s.eq_ignore_ascii_case("null") || s.is_empty() {
        return None;
    }
    let s = s.strip_prefix('N').filter(|rest| rest.starts_with('\'')).unwrap_or(s);
    let s = if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        &s[1..s.len() - 1]
    } else {
        s
    };
    Some(s.replace("''", "'"))
}

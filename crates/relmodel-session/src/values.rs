//! The entity value store.
//!
//! [`EntityValues`] maps field names to values for one logical row of one
//! entity. A field that was never set is *undefined*, which is distinct
//! from being NULL.
//!
//! Typed assignment, resets and checks never raise data faults. Failed
//! coercions and checks are recorded in the store's [`ValidationLog`].

use crate::db::Db;
use crate::executor::Executor;
use crate::hooks::FieldHooks;
use chrono::{Datelike, Local};
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use relmodel_core::{Error, FieldType, FromValue, Result, Row, ValidationErrorKind, ValidationLog, Value};
use relmodel_schema::{CheckKind, Field, Model, ResetKind};
use relmodel_schema::field::is_enabled;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

static NULL: Value = Value::Null;

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap_or_else(|e| unreachable!("whitespace pattern is valid: {e}")))
}

fn collapse_whitespace(s: &str) -> String {
    whitespace_regex().replace_all(s, " ").into_owned()
}

/// One entry of a [`EntityValues::compare`] result.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The other store's differing value.
    Value(Value),
    /// Defined here but not in the other store.
    Undefined,
}

/// Options for [`EntityValues::compare`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    pub ignore_fields: Vec<String>,
    /// Skip fields that are null, empty or missing in the other store.
    pub ignore_null: bool,
    /// Skip fields missing on either side.
    pub ignore_non_existent: bool,
    /// Compare only these fields.
    pub fields: Option<Vec<String>>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            ignore_fields: Vec::new(),
            ignore_null: true,
            ignore_non_existent: true,
            fields: None,
        }
    }
}

impl CompareOptions {
    pub fn ignore(mut self, field: impl Into<String>) -> Self {
        self.ignore_fields.push(field.into());
        self
    }

    pub fn ignore_null(mut self, ignore: bool) -> Self {
        self.ignore_null = ignore;
        self
    }

    pub fn ignore_non_existent(mut self, ignore: bool) -> Self {
        self.ignore_non_existent = ignore;
        self
    }

    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn includes(&self, field: &str) -> bool {
        !self.ignore_fields.iter().any(|f| f == field)
            && self.fields.as_ref().is_none_or(|only| only.iter().any(|f| f == field))
    }
}

/// Field values of one row of an entity.
#[derive(Debug, Clone)]
pub struct EntityValues {
    model: Arc<Model>,
    entity: String,
    values: BTreeMap<String, Value>,
    log: ValidationLog,
    hooks: Arc<FieldHooks>,
    db: Option<Db>,
}

impl EntityValues {
    /// An empty store with no database attached.
    ///
    /// Defaults that need the database (`next`, `max`) and relation
    /// lookups fail with a usage error until one is attached.
    pub fn new(model: Arc<Model>, entity: &str) -> Result<Self> {
        model.entity(entity)?;
        Ok(Self {
            model,
            entity: entity.to_string(),
            values: BTreeMap::new(),
            log: ValidationLog::new(),
            hooks: Arc::new(FieldHooks::new()),
            db: None,
        })
    }

    /// Attach a database; its hooks replace the current ones.
    pub fn with_db(mut self, db: Db) -> Self {
        self.hooks = Arc::clone(db.hooks());
        self.db = Some(db);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<FieldHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Defined values, by field name.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn log(&self) -> &ValidationLog {
        &self.log
    }

    /// For hooks reporting their own failures.
    pub fn log_mut(&mut self) -> &mut ValidationLog {
        &mut self.log
    }

    fn field_names(&self) -> &[String] {
        self.model.field_names(&self.entity).unwrap_or_default()
    }

    fn id_name(&self) -> &str {
        self.model.id_name()
    }

    fn is_known(&self, field: &str) -> bool {
        field == self.id_name() || self.field_names().iter().any(|f| f == field)
    }

    fn ensure_known(&self, field: &str) -> Result<()> {
        if self.is_known(field) {
            Ok(())
        } else {
            Err(Error::unknown_field(&self.entity, field))
        }
    }

    // ========================================================================
    // Assignment and access
    // ========================================================================

    /// Store a value as is.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.ensure_known(field)?;
        self.values.insert(field.to_string(), value.into());
        Ok(self)
    }

    /// Store every known field of `row`; other keys are ignored.
    pub fn set_row(&mut self, row: &BTreeMap<String, Value>) -> &mut Self {
        for (k, v) in row {
            if self.is_known(k) {
                self.values.insert(k.clone(), v.clone());
            }
        }
        self
    }

    /// Store the fields of a result row.
    ///
    /// With a prefix, only columns labelled `prefix-field` are read, as
    /// produced by relation references.
    pub fn set_result_row(&mut self, row: &Row, prefix: Option<&str>) -> &mut Self {
        for (column, value) in row.iter() {
            let name = match prefix {
                None => Some(column),
                Some(p) => column.strip_prefix(p).and_then(|rest| rest.strip_prefix('-')),
            };
            if let Some(name) = name.filter(|n| self.is_known(n)) {
                self.values.insert(name.to_string(), value.clone());
            }
        }
        self
    }

    /// Store the non-null known fields of `row`.
    pub fn set_not_null(&mut self, row: &BTreeMap<String, Value>) -> &mut Self {
        for (k, v) in row {
            if !v.is_null() && self.is_known(k) {
                self.values.insert(k.clone(), v.clone());
            }
        }
        self
    }

    /// Store a value converted to the field's type.
    ///
    /// A registered setter hook takes over entirely. A value that cannot
    /// be converted is stored as given and a coercion error is logged.
    pub fn sset(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.ensure_known(field)?;
        let value = value.into();
        if let Some(hook) = self.hooks.setter(&self.entity, field) {
            hook(self, value);
            return Ok(self);
        }
        if field == self.id_name() {
            self.values.insert(field.to_string(), value);
            return Ok(self);
        }

        let model = Arc::clone(&self.model);
        let ty = &model.field(&self.entity, field)?.field_type;
        self.log.clear_field(field, Some(ValidationErrorKind::Coercion));
        let stored = match value.clone().coerce_to(ty) {
            Ok(v) => v,
            Err(reason) => {
                tracing::warn!(entity = %self.entity, field = %field, reason = %reason, "Coercion failed");
                self.log.add(field, ValidationErrorKind::Coercion, reason);
                value
            }
        };
        self.values.insert(field.to_string(), stored);
        Ok(self)
    }

    /// [`EntityValues::sset`] for every known field of `row`.
    pub fn sset_row(&mut self, row: &BTreeMap<String, Value>) -> Result<&mut Self> {
        for (k, v) in row {
            if self.is_known(k) {
                self.sset(k, v.clone())?;
            }
        }
        Ok(self)
    }

    /// The value of a defined field.
    pub fn get(&self, field: &str) -> Result<&Value> {
        self.values.get(field).ok_or_else(|| Error::UndefinedValue {
            entity: self.entity.clone(),
            field: field.to_string(),
        })
    }

    /// The value, or NULL when undefined.
    pub fn get_or_null(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T> {
        T::from_value(self.get(field)?)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Undefined, NULL or empty.
    pub fn is_null_or_empty(&self, field: &str) -> bool {
        self.get_or_null(field).is_null_or_empty()
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn clear(&mut self) -> &mut Self {
        self.values.clear();
        self.log.clear();
        self
    }

    // ========================================================================
    // Defaults
    // ========================================================================

    /// Resolve the configured default of a field.
    ///
    /// No default, or one starting with `?`, resolves to NULL. Symbolic
    /// defaults depend on the field type:
    ///
    /// - strings: `guid`, `random(N)`;
    /// - datetimes: `current...`, `getdate`;
    /// - integers: `next` (next identity value), `max` (maximum plus one);
    /// - shorts additionally: `current_year`, `current_semester`;
    /// - guids: `new...`.
    ///
    /// Anything else is a literal converted to the field type. A literal
    /// that does not convert is a configuration error.
    pub fn default_value(&self, field: &str) -> Result<Value> {
        if field == self.id_name() {
            return Ok(Value::Null);
        }
        let f = self.model.field(&self.entity, field)?;
        let Some(raw) = f.default_value.as_deref().filter(|d| !d.starts_with('?')) else {
            return Ok(Value::Null);
        };
        let token = raw.to_lowercase();

        let value = match &f.field_type {
            FieldType::String => {
                if token.contains("guid") {
                    Value::Text(Uuid::new_v4().to_string())
                } else if token.contains("random") {
                    Value::Text(random_string(random_len(raw, f)?))
                } else {
                    Value::Text(raw.to_string())
                }
            }
            FieldType::DateTime if token.contains("cur") || token.contains("getdate") => {
                Value::DateTime(Local::now().naive_local())
            }
            FieldType::Short if token.contains("current_year") => {
                Value::Short(i16::try_from(Local::now().year()).unwrap_or(i16::MAX))
            }
            FieldType::Short if token.contains("current_semester") => {
                Value::Short(if Local::now().month() <= 6 { 1 } else { 2 })
            }
            ty if ty.is_integer() && token.contains("next") => {
                let next = self.executor(field)?.next_value(&self.entity)?;
                convert(Value::Long(next), f)?
            }
            ty if ty.is_integer() && token.contains("max") => {
                let max = self.executor(field)?.max_value(&self.entity, field)?;
                convert(Value::Long(max.saturating_add(1)), f)?
            }
            FieldType::Guid if token.contains("new") => Value::Uuid(Uuid::new_v4()),
            FieldType::Guid => {
                let cleaned: String = raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect();
                convert(Value::Text(cleaned), f)?
            }
            FieldType::Object | FieldType::Other(_) => Value::Text(raw.to_string()),
            _ => convert(Value::Text(raw.to_string()), f)?,
        };
        Ok(value)
    }

    fn executor(&self, field: &str) -> Result<Executor> {
        self.db.as_ref().map(Db::executor).ok_or_else(|| {
            Error::usage(format!(
                "default of '{}.{field}' needs a database",
                self.entity
            ))
        })
    }

    /// Set the default of a field that is not defined yet.
    pub fn default_field(&mut self, field: &str) -> Result<&mut Self> {
        self.ensure_known(field)?;
        if !self.contains(field) {
            let value = self.default_value(field)?;
            self.values.insert(field.to_string(), value);
        }
        Ok(self)
    }

    /// Set defaults for every undefined field.
    pub fn default_all(&mut self) -> Result<&mut Self> {
        let names = self.field_names().to_vec();
        for name in names {
            self.default_field(&name)?;
        }
        Ok(self)
    }

    /// Replace a field's value with its default.
    pub fn set_default(&mut self, field: &str) -> Result<&mut Self> {
        self.ensure_known(field)?;
        self.values.remove(field);
        self.default_field(field)
    }

    // ========================================================================
    // Resets
    // ========================================================================

    /// Reset every defined field, the identity last.
    pub fn reset(&mut self) -> Result<&mut Self> {
        let names: Vec<String> = self
            .field_names()
            .iter()
            .filter(|f| self.contains(f))
            .cloned()
            .collect();
        for name in names {
            self.reset_field(&name)?;
        }
        let id = self.id_name().to_string();
        if self.contains(&id) {
            self.reset_field(&id)?;
        }
        Ok(self)
    }

    /// Apply a field's resets in their fixed order.
    pub fn reset_field(&mut self, field: &str) -> Result<&mut Self> {
        self.ensure_known(field)?;
        if let Some(hook) = self.hooks.reset(&self.entity, field) {
            hook(self);
            return Ok(self);
        }
        if field == self.id_name() {
            return Ok(self.reset_id());
        }
        self.get(field)?;

        let model = Arc::clone(&self.model);
        let f = model.field(&self.entity, field)?;
        for (kind, param) in &f.resets {
            if !is_enabled(param) {
                continue;
            }
            let current = self.get_or_null(field).clone();
            let next = match kind {
                ResetKind::Trim => map_text(current, |s| trim_chars(s, param)),
                ResetKind::RemoveMultipleSpaces => map_text(current, collapse_whitespace),
                ResetKind::NullIfEmpty if current.is_null_or_empty() => Value::Null,
                ResetKind::NullIfEmpty => current,
                ResetKind::DefaultIfNull if current.is_null_or_empty() => self.default_value(field)?,
                ResetKind::DefaultIfNull => current,
                ResetKind::SetDefault => self.default_value(field)?,
                ResetKind::CleanDigits => map_text(current, |s| s.chars().filter(|c| !c.is_ascii_digit()).collect()),
                ResetKind::CleanNonDigits => map_text(current, |s| s.chars().filter(char::is_ascii_digit).collect()),
            };
            self.values.insert(field.to_string(), next);
        }
        Ok(self)
    }

    /// Recompute the synthetic identity from the identity fields.
    ///
    /// Leaves it untouched unless every identity field is defined and
    /// non-empty.
    pub fn reset_id(&mut self) -> &mut Self {
        let Ok(entity) = self.model.entity(&self.entity) else {
            return self;
        };
        let parts: Option<Vec<String>> = entity
            .id
            .iter()
            .map(|f| {
                self.values
                    .get(f)
                    .filter(|v| !v.is_null_or_empty())
                    .map(ToString::to_string)
            })
            .collect();
        let Some(parts) = parts else {
            return self;
        };
        let id = parts.join(self.model.concat());
        self.values.insert(self.model.id_name().to_string(), Value::Text(id));
        self
    }

    // ========================================================================
    // Checks
    // ========================================================================

    /// Check every defined field. Replaces the log.
    pub fn check(&mut self) -> bool {
        self.log.clear();
        let names: Vec<String> = self
            .field_names()
            .iter()
            .filter(|f| self.contains(f))
            .cloned()
            .collect();
        for name in names {
            self.run_checks(&name);
        }
        self.log.is_empty()
    }

    /// Check one defined field.
    pub fn check_field(&mut self, field: &str) -> Result<bool> {
        self.ensure_known(field)?;
        self.get(field)?;
        Ok(self.run_checks(field))
    }

    fn run_checks(&mut self, field: &str) -> bool {
        self.log.clear_field(field, None);
        if let Some(hook) = self.hooks.check(&self.entity, field) {
            return hook(self);
        }
        let model = Arc::clone(&self.model);
        let Ok(f) = model.field(&self.entity, field) else {
            return true;
        };
        let value = self.get_or_null(field).clone();
        for (kind, param) in &f.checks {
            match kind {
                CheckKind::Type => {
                    let Json::String(name) = param else { continue };
                    let ty = FieldType::parse(name);
                    if !value.conforms_to(&ty) {
                        self.log.add(
                            field,
                            ValidationErrorKind::Type,
                            format!("expected {ty}, got {}", value.type_name()),
                        );
                    }
                }
                CheckKind::Required => {
                    if is_enabled(param) && value.is_null() {
                        self.log.add(field, ValidationErrorKind::Required, "value is required");
                    }
                }
            }
        }
        !self.log.has_errors_for(field)
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// Values of `other` that differ from this store.
    ///
    /// Strings compare case-insensitively after trimming. A field defined
    /// here but not in `other` maps to [`Change::Undefined`] unless
    /// `ignore_non_existent` is set.
    pub fn compare(&self, other: &EntityValues, options: &CompareOptions) -> BTreeMap<String, Change> {
        let mut out = BTreeMap::new();
        for name in self.field_names() {
            if !options.includes(name) {
                continue;
            }
            let mine = self.values.get(name);
            let theirs = other.values.get(name);
            if options.ignore_non_existent && (mine.is_none() || theirs.is_none()) {
                continue;
            }
            if options.ignore_null && theirs.is_none_or(Value::is_null_or_empty) {
                continue;
            }
            let change = match (mine, theirs) {
                (None, Some(t)) => Some(Change::Value(t.clone())),
                (Some(_), None) => Some(Change::Undefined),
                (None, None) => None,
                (Some(m), Some(t)) => match (m.is_null_or_empty(), t.is_null_or_empty()) {
                    (true, true) => None,
                    (true, false) | (false, true) => Some(Change::Value(t.clone())),
                    (false, false) => (comparable(m) != comparable(t)).then(|| Change::Value(t.clone())),
                },
            };
            if let Some(change) = change {
                out.insert(name.clone(), change);
            }
        }
        out
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Values of the row referenced by a first-level relation.
    pub fn values_tree(&self, relation_id: &str) -> Result<Option<EntityValues>> {
        let entity = self.model.entity(&self.entity)?;
        let node = entity.tree.get(relation_id).ok_or_else(|| Error::UnknownRelation {
            entity: self.entity.clone(),
            relation: relation_id.to_string(),
        })?;
        let key = self.get_or_null(&node.field_name).clone();
        self.lookup(&node.ref_entity_name, &node.ref_field_name, key)
    }

    /// Values of the row referenced by any relation, following parents.
    pub fn values_rel(&self, relation_id: &str) -> Result<Option<EntityValues>> {
        let relation = self.model.relation(&self.entity, relation_id)?;
        let key = match &relation.parent_id {
            None => self.get_or_null(&relation.field_name).clone(),
            Some(parent) => match self.values_rel(parent)? {
                Some(parent) => parent.get_or_null(&relation.field_name).clone(),
                None => return Ok(None),
            },
        };
        self.lookup(&relation.ref_entity_name, &relation.ref_field_name, key)
    }

    fn lookup(&self, entity: &str, field: &str, key: Value) -> Result<Option<EntityValues>> {
        if key.is_null_or_empty() {
            return Ok(None);
        }
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| Error::usage(format!("relation lookup on '{}' needs a database", self.entity)))?;
        let select = db.sql(entity)?.where_(format!("${field} = @0")).parameter(key);
        let rows = db.executor().rows_cached(&select)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let mut values = db.values(entity)?;
        values.set_result_row(row, None);
        Ok(Some(values))
    }

    // ========================================================================
    // Text forms
    // ========================================================================

    /// Human-readable label built from the most identifying fields.
    pub fn label(&self) -> String {
        let parts: Vec<String> = self
            .label_fields()
            .iter()
            .map(|f| self.get_or_null(f).to_string())
            .collect();
        collapse_whitespace(&parts.join(", ")).trim().to_string()
    }

    /// Unique not-null fields plus fully not-null unique groups; failing
    /// that the not-null fields; failing that every field.
    fn label_fields(&self) -> Vec<String> {
        let Ok(entity) = self.model.entity(&self.entity) else {
            return Vec::new();
        };
        let not_null = |f: &String| entity.not_null.contains(f);
        let mut fields: Vec<String> = entity.unique.iter().filter(|f| not_null(*f)).cloned().collect();
        for group in &entity.unique_multiple {
            if group.iter().all(not_null) {
                fields.extend(group.iter().cloned());
            }
        }
        if fields.is_empty() {
            fields = entity.not_null.clone();
        }
        if fields.is_empty() {
            fields = entity.fields.clone();
        }
        fields
    }

    /// The given fields joined with `", "`, `?` for undefined ones.
    pub fn to_string_fields(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .map(|f| self.values.get(*f).map_or_else(|| "?".to_string(), Value::to_string))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Defined values as a JSON object.
    pub fn to_json(&self) -> Json {
        Json::Object(self.values.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }
}

impl fmt::Display for EntityValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

/// Trim the characters of a string parameter, or whitespace otherwise.
fn trim_chars(s: &str, param: &Json) -> String {
    match param {
        Json::String(chars) if !chars.is_empty() => s.trim_matches(|c| chars.contains(c)).to_string(),
        _ => s.trim().to_string(),
    }
}

fn comparable(v: &Value) -> String {
    v.to_string().trim().to_lowercase()
}

fn convert(value: Value, field: &Field) -> Result<Value> {
    value.coerce_to(&field.field_type).map_err(|reason| {
        Error::config(format!(
            "default of '{}.{}': {reason}",
            field.entity_name, field.name
        ))
    })
}

fn random_len(raw: &str, field: &Field) -> Result<usize> {
    raw.split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .and_then(|(n, _)| n.trim().parse().ok())
        .ok_or_else(|| {
            Error::config(format!(
                "default '{raw}' of '{}.{}' needs a length, e.g. random(8)",
                field.entity_name, field.name
            ))
        })
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::Config;
    use relmodel_schema::{Column, FieldOverride, FieldOverrides, ModelBuilder, TableSchema};
    use serde_json::json;

    fn model() -> Arc<Model> {
        let schema = vec![
            TableSchema::new("person")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("email", "varchar").max_length(120))
                .column(Column::new("name", "varchar").nullable())
                .column(Column::new("phone", "varchar").nullable())
                .column(Column::new("age", "int").nullable().with_default("((0))"))
                .column(Column::new("born", "datetime").nullable().with_default("(getdate())"))
                .column(Column::new("token", "varchar").nullable().with_default("random(8)"))
                .column(Column::new("uid", "uniqueidentifier").nullable().with_default("(newid())"))
                .column(Column::new("year", "smallint").nullable().with_default("current_year"))
                .column(Column::new("term", "smallint").nullable().with_default("current_semester"))
                .column(Column::new("seq", "int").nullable().with_default("next"))
                .column(Column::new("note", "varchar").nullable().with_default("?external"))
                .unique("uq_email", &["email"]),
            TableSchema::new("grade")
                .column(Column::new("student", "varchar"))
                .column(Column::new("course", "varchar"))
                .column(Column::new("score", "decimal").nullable())
                .unique("uq_grade", &["student", "course"]),
        ];
        let mut phone = FieldOverrides::new();
        phone.insert(
            "phone".into(),
            FieldOverride {
                resets_add: Some([(ResetKind::CleanNonDigits, json!(true))].into_iter().collect()),
                ..FieldOverride::default()
            },
        );
        let config = Config::default().with_concat("-");
        Arc::new(
            ModelBuilder::new(config)
                .with_field_overrides("person", phone)
                .build_from_schema(schema)
                .unwrap(),
        )
    }

    fn person() -> EntityValues {
        EntityValues::new(model(), "person").unwrap()
    }

    #[test]
    fn test_unknown_entity_and_field() {
        assert!(EntityValues::new(model(), "nope").is_err());
        let mut v = person();
        assert!(matches!(v.set("nope", 1), Err(Error::UnknownField { .. })));
    }

    #[test]
    fn test_get_undefined_is_usage_error() {
        let mut v = person();
        assert!(matches!(v.get("name"), Err(Error::UndefinedValue { .. })));
        assert_eq!(v.get_or_null("name"), &Value::Null);
        v.set("name", Value::Null).unwrap();
        assert!(v.get("name").unwrap().is_null());
        assert!(v.is_null_or_empty("name"));
    }

    #[test]
    fn test_sset_coerces_text() {
        let mut v = person();
        v.sset("id", "42").unwrap().sset("age", "").unwrap();
        assert_eq!(v.get("id").unwrap(), &Value::Int(42));
        assert_eq!(v.get("age").unwrap(), &Value::Null);
        assert!(v.log().is_empty());
    }

    #[test]
    fn test_sset_failure_is_logged_not_raised() {
        let mut v = person();
        v.sset("age", "abc").unwrap();
        assert_eq!(v.get("age").unwrap(), &Value::from("abc"));
        assert!(v.log().has_errors_for("age"));
        v.sset("age", "7").unwrap();
        assert!(!v.log().has_errors_for("age"));
    }

    #[test]
    fn test_set_row_ignores_unknown_keys() {
        let mut v = person();
        let row: BTreeMap<String, Value> = [
            ("email".to_string(), Value::from("a@b.c")),
            ("other".to_string(), Value::Int(1)),
            ("name".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();
        v.set_row(&row);
        assert!(v.contains("email") && v.contains("name") && !v.contains("other"));

        let mut w = person();
        w.set_not_null(&row);
        assert!(w.contains("email") && !w.contains("name"));
    }

    #[test]
    fn test_set_result_row_with_prefix() {
        let row = Row::from_pairs([
            ("id", Value::Int(1)),
            ("tutor-email", Value::from("t@x.y")),
            ("tutor-id", Value::Int(9)),
        ]);
        let mut v = person();
        v.set_result_row(&row, Some("tutor"));
        assert_eq!(v.get("email").unwrap(), &Value::from("t@x.y"));
        assert_eq!(v.get("id").unwrap(), &Value::Int(9));
    }

    #[test]
    fn test_symbolic_defaults() {
        let v = person();
        assert_eq!(v.default_value("age").unwrap(), Value::Int(0));
        assert!(matches!(v.default_value("born").unwrap(), Value::DateTime(_)));
        assert!(matches!(v.default_value("uid").unwrap(), Value::Uuid(_)));
        assert_eq!(v.default_value("note").unwrap(), Value::Null);
        assert_eq!(v.default_value("name").unwrap(), Value::Null);
        match v.default_value("token").unwrap() {
            Value::Text(s) => assert_eq!(s.len(), 8),
            other => panic!("unexpected {other:?}"),
        }
        let year = i16::try_from(Local::now().year()).unwrap();
        assert_eq!(v.default_value("year").unwrap(), Value::Short(year));
        let term = if Local::now().month() <= 6 { 1 } else { 2 };
        assert_eq!(v.default_value("term").unwrap(), Value::Short(term));
    }

    #[test]
    fn test_database_default_without_db_is_usage_error() {
        let err = person().default_value("seq").unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_default_field_keeps_defined_values() {
        let mut v = person();
        v.set("age", 5).unwrap();
        v.default_field("age").unwrap();
        assert_eq!(v.get("age").unwrap(), &Value::Int(5));
        v.set_default("age").unwrap();
        assert_eq!(v.get("age").unwrap(), &Value::Int(0));
    }

    #[test]
    fn test_reset_pipeline_is_idempotent() {
        let mut v = person();
        v.set("name", "  Ana   Maria ").unwrap();
        v.set("email", " a@b.c ").unwrap();
        v.set("phone", " (01) 555-1234 ").unwrap();
        v.reset().unwrap();
        let once = v.values().clone();
        v.reset().unwrap();
        assert_eq!(v.values(), &once);
        assert_eq!(v.get("name").unwrap(), &Value::from("Ana Maria"));
        assert_eq!(v.get("email").unwrap(), &Value::from("a@b.c"));
        assert_eq!(v.get("phone").unwrap(), &Value::from("015551234"));
    }

    #[test]
    fn test_null_if_empty() {
        let mut v = person();
        v.set("name", "   ").unwrap();
        v.reset_field("name").unwrap();
        assert_eq!(v.get("name").unwrap(), &Value::Null);
    }

    #[test]
    fn test_reset_undefined_field_fails() {
        assert!(matches!(
            person().reset_field("name"),
            Err(Error::UndefinedValue { .. })
        ));
    }

    #[test]
    fn test_identity_composition() {
        let mut g = EntityValues::new(model(), "grade").unwrap();
        g.set("student", "X").unwrap();
        g.reset_id();
        assert!(!g.contains("_Id"));
        g.set("course", "7").unwrap();
        g.reset_id();
        assert_eq!(g.get("_Id").unwrap(), &Value::from("X-7"));
    }

    #[test]
    fn test_reset_recomputes_identity_last() {
        let mut g = EntityValues::new(model(), "grade").unwrap();
        g.set("student", " X ").unwrap().set("course", "7").unwrap().set("_Id", Value::Null).unwrap();
        g.reset().unwrap();
        assert_eq!(g.get("_Id").unwrap(), &Value::from("X-7"));
    }

    #[test]
    fn test_check_collects_errors() {
        let mut v = person();
        v.set("id", 1).unwrap();
        v.set("email", Value::Null).unwrap();
        v.set("age", "abc").unwrap();
        assert!(!v.check());
        let kinds: Vec<_> = v.log().iter().map(|e| (e.field.as_str(), e.kind)).collect();
        assert!(kinds.contains(&("email", ValidationErrorKind::Required)));
        assert!(kinds.contains(&("age", ValidationErrorKind::Type)));

        v.set("email", "a@b.c").unwrap();
        v.set("age", 3).unwrap();
        assert!(v.check());
        assert!(v.check_field("email").unwrap());
    }

    #[test]
    fn test_hooks_take_precedence() {
        let hooks = FieldHooks::new()
            .on_set("person", "email", |v, value| {
                let lower = value.to_string().to_lowercase();
                let _ = v.set("email", lower);
            })
            .on_check("person", "name", |v| {
                let ok = !v.is_null_or_empty("name");
                if !ok {
                    v.log_mut().add("name", ValidationErrorKind::Custom, "name needed");
                }
                ok
            });
        let mut v = person().with_hooks(Arc::new(hooks));
        v.sset("email", "A@B.C").unwrap();
        assert_eq!(v.get("email").unwrap(), &Value::from("a@b.c"));
        v.set("name", Value::Null).unwrap();
        assert!(!v.check_field("name").unwrap());
        assert_eq!(v.log().for_field("name").next().unwrap().kind, ValidationErrorKind::Custom);
    }

    #[test]
    fn test_compare() {
        let mut a = person();
        a.set("id", 1).unwrap().set("name", "Ana").unwrap().set("email", "a@b.c").unwrap();
        assert!(a.compare(&a.clone(), &CompareOptions::default()).is_empty());

        let mut b = person();
        b.set("id", 1).unwrap().set("name", " ANA ").unwrap().set("email", "x@b.c").unwrap().set("age", 3).unwrap();
        let diff = a.compare(&b, &CompareOptions::default());
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["email"], Change::Value(Value::from("x@b.c")));

        let diff = a.compare(&b, &CompareOptions::default().ignore_non_existent(false));
        assert_eq!(diff["age"], Change::Value(Value::Int(3)));

        let c = person();
        let diff = a.compare(&c, &CompareOptions::default().ignore_non_existent(false).ignore_null(false));
        assert_eq!(diff["name"], Change::Undefined);

        let diff = a.compare(&b, &CompareOptions::default().ignore("email"));
        assert!(diff.is_empty());
        let diff = a.compare(&b, &CompareOptions::default().only(["name"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_label_prefers_unique_not_null() {
        let mut v = person();
        v.set("email", "a@b.c").unwrap().set("name", "Ana").unwrap();
        assert_eq!(v.label(), "a@b.c");
        assert_eq!(v.to_string_fields(&["name", "phone"]), "Ana, ?");

        let mut g = EntityValues::new(model(), "grade").unwrap();
        g.set("student", "X").unwrap().set("course", "7").unwrap();
        assert_eq!(g.to_string(), "X, 7");
    }

    #[test]
    fn test_relation_lookup_needs_database() {
        let mut v = person();
        v.set("id", 1).unwrap();
        assert!(matches!(v.values_tree("nope"), Err(Error::UnknownRelation { .. })));
    }
}

//! INSERT, UPDATE and DELETE batch builder.
//!
//! Statements accumulate in order and share one positional parameter list,
//! so the whole batch can be sent as a single command or split into one
//! command per statement without renumbering.

use crate::translate::Translator;
use regex::{Captures, Regex};
use relmodel_core::{Dialect, Error, Result, Statement, Value};
use relmodel_schema::Model;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

fn positional_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|[^@\w])@(\d+)\b")
            .unwrap_or_else(|e| unreachable!("positional pattern is valid: {e}"))
    })
}

fn named_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^@\w])@([A-Za-z_]\w*)")
            .unwrap_or_else(|e| unreachable!("named pattern is valid: {e}"))
    })
}

#[derive(Debug, Clone, PartialEq)]
struct Part {
    entity: String,
    sql: String,
}

/// Builder for a batch of persistence statements.
///
/// Only administrative (persisted) fields of a row become columns; other
/// entries, including the synthetic identity, are ignored.
///
/// # Example
///
/// ```ignore
/// let persist = Persist::new(model, Dialect::MySql)
///     .insert("person", &row)?
///     .update("person", &changes)?
///     .where_("$id = @0", vec![Value::Int(7)])?;
/// executor.transaction(&persist)?;
/// ```
#[derive(Debug, Clone)]
pub struct Persist {
    model: Arc<Model>,
    dialect: Dialect,
    parts: Vec<Part>,
    parameters: Vec<Value>,
    open_update: bool,
}

impl Persist {
    pub fn new(model: Arc<Model>, dialect: Dialect) -> Self {
        Self {
            model,
            dialect,
            parts: Vec::new(),
            parameters: Vec::new(),
            open_update: false,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Entity of each statement, in order.
    pub fn entities(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.entity.as_str()).collect()
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// `INSERT INTO table (cols) VALUES (...)`.
    pub fn insert(mut self, entity: &str, row: &BTreeMap<String, Value>) -> Result<Self> {
        self.ensure_closed()?;
        let columns = self.columns(entity, row)?;
        let mut names = Vec::with_capacity(columns.len());
        let mut placeholders = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            names.push(name);
            placeholders.push(format!("@{}", self.push(value)));
        }
        let sql = format!(
            "INSERT INTO {entity} ({})\nVALUES ({});",
            names.join(", "),
            placeholders.join(", ")
        );
        self.add(entity, sql);
        Ok(self)
    }

    /// Open an UPDATE; it must be closed with [`Persist::where_`].
    pub fn update(mut self, entity: &str, row: &BTreeMap<String, Value>) -> Result<Self> {
        self.ensure_closed()?;
        let sql = self.update_head(entity, row)?;
        self.add(entity, sql);
        self.open_update = true;
        Ok(self)
    }

    /// Close the open UPDATE with a condition.
    ///
    /// `@0`, `@1`, ... in `condition` refer to `parameters` and are
    /// renumbered into the batch. Only positional placeholders are
    /// accepted: the batch carries one global positional list, so a named
    /// `@name` is a usage error.
    pub fn where_(mut self, condition: &str, parameters: Vec<Value>) -> Result<Self> {
        if !self.open_update {
            return Err(Error::usage("where_ called without an open update"));
        }
        let Some(entity) = self.parts.last().map(|p| p.entity.clone()) else {
            return Err(Error::usage("where_ called on an empty batch"));
        };
        let translated = self.translate_condition(&entity, condition)?;
        let renumbered = renumber(&translated, self.parameters.len(), parameters.len())?;
        self.parameters.extend(parameters);
        if let Some(part) = self.parts.last_mut() {
            part.sql.push_str(&format!("\nWHERE {renumbered};"));
        }
        self.open_update = false;
        Ok(self)
    }

    /// UPDATE every row whose identity is in `ids`.
    pub fn update_ids(self, entity: &str, row: &BTreeMap<String, Value>, ids: Vec<Value>) -> Result<Self> {
        let id = self.model.id_name().to_string();
        self.update(entity, row)?
            .where_(&format!("${id} IN (@0)"), vec![Value::Array(ids)])
    }

    /// Set one field to the same value on every row in `ids`.
    pub fn update_value_ids(self, entity: &str, field: &str, value: Value, ids: Vec<Value>) -> Result<Self> {
        let mut row = BTreeMap::new();
        row.insert(field.to_string(), value);
        if !self.model.field_names_admin(entity)?.contains(&field) {
            return Err(Error::unknown_field(entity, field));
        }
        self.update_ids(entity, &row, ids)
    }

    /// DELETE every row whose identity is in `ids`.
    pub fn delete_ids(mut self, entity: &str, ids: Vec<Value>) -> Result<Self> {
        self.ensure_closed()?;
        let (alias, id_expr) = {
            let t = Translator::new(&self.model, entity, self.dialect)?;
            let e = t.entity();
            (e.alias.clone(), t.identity_expr(e, &e.alias))
        };
        let index = self.push(Value::Array(ids));
        let sql = format!("DELETE {alias}\nFROM {entity} AS {alias}\nWHERE {id_expr} IN (@{index});");
        self.add(entity, sql);
        Ok(self)
    }

    /// The whole batch as one statement.
    pub fn statement(&self) -> Result<Statement> {
        self.ensure_complete()?;
        let sql = self
            .parts
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Statement::new(sql).with_parameters(self.parameters.clone()))
    }

    /// One statement per part, each carrying the full parameter list.
    pub fn statements(&self) -> Result<Vec<Statement>> {
        self.ensure_complete()?;
        Ok(self
            .parts
            .iter()
            .map(|p| Statement::new(p.sql.clone()).with_parameters(self.parameters.clone()))
            .collect())
    }

    fn update_head(&mut self, entity: &str, row: &BTreeMap<String, Value>) -> Result<String> {
        let alias = self.model.entity(entity)?.alias.clone();
        let columns = self.columns(entity, row)?;
        let mut sets = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            let index = self.push(value);
            sets.push(match self.dialect {
                Dialect::SqlServer => format!("{name} = @{index}"),
                Dialect::MySql => format!("{alias}.{name} = @{index}"),
            });
        }
        let sets = sets.join(",\n");
        Ok(match self.dialect {
            Dialect::SqlServer => format!("UPDATE {alias} SET\n{sets}\nFROM {entity} AS {alias}"),
            Dialect::MySql => format!("UPDATE {entity} AS {alias} SET\n{sets}"),
        })
    }

    /// Persisted fields of `entity` present in `row`, in field order.
    fn columns(&self, entity: &str, row: &BTreeMap<String, Value>) -> Result<Vec<(String, Value)>> {
        let columns: Vec<(String, Value)> = self
            .model
            .field_names_admin(entity)?
            .into_iter()
            .filter_map(|f| row.get(f).map(|v| (f.to_string(), v.clone())))
            .collect();
        if columns.is_empty() {
            return Err(Error::usage(format!("no persisted fields of '{entity}' in row")));
        }
        Ok(columns)
    }

    fn translate_condition(&self, entity: &str, condition: &str) -> Result<String> {
        let mut t = Translator::new(&self.model, entity, self.dialect)?;
        let translated = t.translate(condition)?;
        if !t.used_relations().is_empty() {
            return Err(Error::usage(format!(
                "relation references are not allowed in '{entity}' update conditions"
            )));
        }
        Ok(translated)
    }

    fn push(&mut self, value: Value) -> usize {
        self.parameters.push(value);
        self.parameters.len() - 1
    }

    fn add(&mut self, entity: &str, sql: String) {
        tracing::debug!(entity = %entity, dialect = %self.dialect, "Queued persist statement");
        self.parts.push(Part {
            entity: entity.to_string(),
            sql,
        });
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.open_update {
            return Err(Error::usage("previous update has no where_ condition"));
        }
        Ok(())
    }

    fn ensure_complete(&self) -> Result<()> {
        self.ensure_closed()?;
        if self.parts.is_empty() {
            return Err(Error::usage("persist batch is empty"));
        }
        Ok(())
    }
}

/// Shift `@k` to `@(base + k)`, rejecting indices beyond `count`.
fn renumber(text: &str, base: usize, count: usize) -> Result<String> {
    if let Some(caps) = named_regex().captures(text) {
        return Err(Error::usage(format!(
            "named parameter @{} in an update condition; use positional @N",
            &caps[1]
        )));
    }
    let mut missing = None;
    let out = positional_regex().replace_all(text, |caps: &Captures<'_>| {
        let local: usize = caps[2].parse().unwrap_or(usize::MAX);
        if local >= count {
            missing.get_or_insert_with(|| format!("@{}", &caps[2]));
        }
        format!("{}@{}", &caps[1], base.saturating_add(local))
    });
    match missing {
        Some(name) => Err(Error::MissingParameter(name)),
        None => Ok(out.into_owned()),
    }
}

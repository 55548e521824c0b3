//! SELECT and aggregate statement builder.

use crate::translate::{Translator, normalize, split_top_level};
use relmodel_core::{Dialect, Result, Statement, Value};
use relmodel_schema::Model;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder for SELECT statements over one entity.
///
/// Every directive accepts `$field` references. Cloning yields an
/// independent builder: directive lists and parameters are deep copies,
/// only the read-only model is shared.
///
/// # Example
///
/// ```ignore
/// let stmt = Select::new(model, Dialect::SqlServer, "person")?
///     .fields("$email")
///     .where_("$id = @0")
///     .parameters(vec![Value::Int(42)])
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct Select {
    model: Arc<Model>,
    dialect: Dialect,
    entity: String,
    fields: Option<String>,
    tree: bool,
    select: Vec<String>,
    wheres: Vec<String>,
    group: Option<String>,
    having: Option<String>,
    order: Option<String>,
    size: u64,
    page: u64,
    parameters: Vec<Value>,
    named: BTreeMap<String, Value>,
    aggregate: bool,
}

impl Select {
    /// Start a query; fails if the entity is unknown.
    pub fn new(model: Arc<Model>, dialect: Dialect, entity: impl Into<String>) -> Result<Self> {
        let entity = entity.into();
        model.entity(&entity)?;
        Ok(Self {
            model,
            dialect,
            entity,
            fields: None,
            tree: false,
            select: Vec::new(),
            wheres: Vec::new(),
            group: None,
            having: None,
            order: None,
            size: 0,
            page: 1,
            parameters: Vec::new(),
            named: BTreeMap::new(),
            aggregate: false,
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Explicit select list, e.g. `"$id, $city-name"`.
    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    /// Select the entity's fields plus the fields of every relation.
    pub fn fields_tree(mut self) -> Self {
        self.tree = true;
        self
    }

    /// Add a raw expression to the select list.
    pub fn select(mut self, expr: impl Into<String>) -> Self {
        self.select.push(expr.into());
        self
    }

    /// Add a condition; conditions are joined with AND.
    pub fn where_(mut self, condition: impl Into<String>) -> Self {
        self.wheres.push(condition.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// ORDER BY list, e.g. `"$name DESC, $id"`.
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Page size; 0 disables paging.
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// 1-based page number.
    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Append positional parameters after any already bound, including
    /// the one pushed by [`Select::by_id`].
    pub fn parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Append a positional parameter.
    pub fn parameter(mut self, value: impl Into<Value>) -> Self {
        self.parameters.push(value.into());
        self
    }

    /// Set a named parameter, referenced as `@name`.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Filter on the identity; a sequence value filters with `IN`.
    pub fn by_id(mut self, id: impl Into<Value>) -> Self {
        let id = id.into();
        let index = self.parameters.len();
        let id_name = self.model.id_name();
        let condition = match id {
            Value::Array(_) => format!("${id_name} IN (@{index})"),
            _ => format!("${id_name} = @{index}"),
        };
        self.parameters.push(id);
        self.where_(condition)
    }

    /// Select `MAX(field)`, or 0 for an empty table.
    pub fn select_max_value(mut self, field: &str) -> Self {
        self.aggregate = true;
        let expr = self.dialect.max_or_zero(&format!("${field}"));
        self.select(expr)
    }

    /// Select `COUNT(*)`.
    pub fn count(mut self) -> Self {
        self.aggregate = true;
        self.select("COUNT(*)")
    }

    /// Cache key for this query shape and its parameters.
    pub fn cache_key(&self) -> Result<String> {
        let stmt = self.build()?;
        let params: Vec<String> = stmt.parameters.iter().map(|v| format!("{v:?}")).collect();
        let named: Vec<String> = stmt.named.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
        Ok(format!("{}|{}|{}", stmt.sql, params.join(","), named.join(",")))
    }

    /// Render the statement.
    pub fn build(&self) -> Result<Statement> {
        let model = self.model.as_ref();
        let mut t = Translator::new(model, &self.entity, self.dialect)?;
        let entity = t.entity();

        let mut items = self.select_items(&mut t)?;

        let wheres = self
            .wheres
            .iter()
            .map(|w| t.translate(w))
            .collect::<Result<Vec<_>>>()?;
        let group = self.group.as_deref().map(|g| t.translate(g)).transpose()?;
        let having = self.having.as_deref().map(|h| t.translate(h)).transpose()?;

        let ordered = !self.aggregate || group.is_some();
        let mut order = None;
        if ordered {
            let text = match &self.order {
                Some(o) => Some(o.clone()),
                None if !entity.order_default.is_empty() => Some(
                    entity
                        .order_default
                        .iter()
                        .map(|f| format!("${f}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                None => None,
            };
            if let Some(text) = text {
                if self.dialect.requires_order_in_select() && group.is_none() {
                    self.add_order_items(&mut t, &text, &mut items)?;
                }
                order = Some(t.translate(&text)?);
            }
        }

        let mut sql = format!(
            "SELECT {}\nFROM {} AS {}\n",
            items.join(",\n"),
            entity.name,
            entity.alias
        );
        sql.push_str(&t.joins()?);
        match wheres.as_slice() {
            [] => {}
            [only] => sql.push_str(&format!("WHERE {only}\n")),
            many => {
                let parts: Vec<String> = many.iter().map(|w| format!("({w})")).collect();
                sql.push_str(&format!("WHERE {}\n", parts.join(" AND ")));
            }
        }
        if let Some(g) = group {
            sql.push_str(&format!("GROUP BY {g}\n"));
        }
        if let Some(h) = having {
            sql.push_str(&format!("HAVING {h}\n"));
        }
        if ordered {
            match order {
                Some(o) => sql.push_str(&format!("ORDER BY {o}\n")),
                None => sql.push_str("ORDER BY 1\n"),
            }
            let paging = self.dialect.paging(self.size, self.page);
            if !paging.is_empty() {
                sql.push_str(&paging);
                sql.push('\n');
            }
        }

        tracing::debug!(
            entity = %self.entity,
            dialect = %self.dialect,
            relations = t.used_relations().len(),
            "Built select"
        );
        tracing::trace!(sql = %sql, "Select SQL");

        Ok(Statement {
            sql,
            parameters: self.parameters.clone(),
            named: self.named.clone(),
        })
    }

    fn select_items(&self, t: &mut Translator<'_>) -> Result<Vec<String>> {
        let mut items = Vec::new();
        if let Some(fields) = &self.fields {
            items.extend(t.translate_items(fields)?);
        }
        for expr in &self.select {
            items.extend(t.translate_items(expr)?);
        }
        if items.is_empty() {
            items = self.default_items(t)?;
        }
        Ok(items)
    }

    /// Every column of the entity plus its identity, and with `tree` the
    /// same for every relation, labelled `relation-field`.
    fn default_items(&self, t: &mut Translator<'_>) -> Result<Vec<String>> {
        let model = self.model.as_ref();
        let entity = t.entity();
        let id = model.id_name();
        let mut refs: Vec<String> = model
            .field_names_admin(&entity.name)?
            .into_iter()
            .map(|f| format!("${f}"))
            .collect();
        refs.push(format!("${id}"));

        if self.tree {
            for (rel_id, relation) in &entity.relations {
                for f in model.field_names_admin(&relation.ref_entity_name)? {
                    refs.push(format!("${rel_id}-{f}"));
                }
                refs.push(format!("${rel_id}-{id}"));
            }
        }
        refs.iter().map(|r| t.translate_items(r).map(|mut v| v.remove(0))).collect()
    }

    /// Select the ORDER BY expressions too, skipping ones already selected.
    fn add_order_items(&self, t: &mut Translator<'_>, order: &str, items: &mut Vec<String>) -> Result<()> {
        for part in split_top_level(order) {
            let expr = strip_direction(part.trim());
            let translated = t.translate(expr)?;
            let labelled = t.translate_items(expr)?.into_iter().next().unwrap_or_default();
            let present = items.iter().any(|i| {
                let n = normalize(i);
                n == normalize(&translated) || n == normalize(&labelled)
            });
            if !present && !labelled.is_empty() {
                items.push(labelled);
            }
        }
        Ok(())
    }
}

/// Drop a trailing ASC/DESC.
fn strip_direction(expr: &str) -> &str {
    let lower = expr.to_ascii_lowercase();
    for suffix in [" asc", " desc"] {
        if lower.ends_with(suffix) {
            return expr[..expr.len() - suffix.len()].trim_end();
        }
    }
    expr
}

//! `$field` reference translation.
//!
//! Query text refers to fields symbolically:
//!
//! - `$email` is a field of the queried entity, rendered `pers.email`;
//! - `$city-name` is field `name` reached through relation `city`,
//!   rendered with the relation's join alias;
//! - `$_Id` (the configured identity name) is the entity's identity
//!   expression, a single column or a `CONCAT_WS` of several.
//!
//! Every relation referenced is recorded so the query joins exactly those
//! relations and their ancestors.

use regex::{Captures, Regex};
use relmodel_core::{Dialect, Error, Result};
use relmodel_schema::{Entity, Model};
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)(?:-([A-Za-z_][A-Za-z0-9_]*))?")
            .unwrap_or_else(|e| unreachable!("reference pattern is valid: {e}"))
    })
}

/// Resolves `$` references against one entity.
#[derive(Debug, Clone)]
pub struct Translator<'m> {
    model: &'m Model,
    entity: &'m Entity,
    dialect: Dialect,
    used: BTreeSet<String>,
}

impl<'m> Translator<'m> {
    pub fn new(model: &'m Model, entity: &str, dialect: Dialect) -> Result<Self> {
        Ok(Self {
            model,
            entity: model.entity(entity)?,
            dialect,
            used: BTreeSet::new(),
        })
    }

    pub fn entity(&self) -> &'m Entity {
        self.entity
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Relation ids referenced so far.
    pub fn used_relations(&self) -> &BTreeSet<String> {
        &self.used
    }

    /// Replace every `$` reference in `text`.
    pub fn translate(&mut self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in reference_regex().captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..whole.start]);
            out.push_str(&self.resolve(&caps)?);
            last = whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Translate a comma separated list of select items.
    ///
    /// An item that is exactly one relation or identity reference gets a
    /// label, so `$city-name` is selected as `[city-name]`.
    pub fn translate_items(&mut self, text: &str) -> Result<Vec<String>> {
        split_top_level(text)
            .into_iter()
            .map(|item| self.translate_item(item))
            .collect()
    }

    fn translate_item(&mut self, item: &str) -> Result<String> {
        let item = item.trim();
        let translated = self.translate(item)?;
        let Some(caps) = reference_regex().captures(item) else {
            return Ok(translated);
        };
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let is_relation = caps.get(2).is_some();
        let is_id = caps.get(1).is_some_and(|m| m.as_str() == self.model.id_name());
        if whole == item && (is_relation || is_id) {
            let label = &item[1..];
            Ok(format!("{translated} AS {}", self.dialect.quote_identifier(label)))
        } else {
            Ok(translated)
        }
    }

    fn resolve(&mut self, caps: &Captures<'_>) -> Result<String> {
        let first = caps.get(1).map_or("", |m| m.as_str());
        match caps.get(2) {
            None => self.column(self.entity, &self.entity.alias, first),
            Some(field) => {
                let relation = self.entity.relations.get(first).ok_or_else(|| {
                    Error::UnknownRelation {
                        entity: self.entity.name.clone(),
                        relation: first.to_string(),
                    }
                })?;
                let target = self.model.entity(&relation.ref_entity_name)?;
                let expr = self.column(target, &relation.alias, field.as_str())?;
                self.used.insert(first.to_string());
                Ok(expr)
            }
        }
    }

    /// `alias.field`, or the identity expression for the identity name.
    fn column(&self, entity: &Entity, alias: &str, field: &str) -> Result<String> {
        if field == self.model.id_name() {
            return Ok(self.identity_expr(entity, alias));
        }
        let f = self.model.field(&entity.name, field)?;
        if !f.persisted {
            return Err(Error::usage(format!(
                "field '{}.{field}' has no column",
                entity.name
            )));
        }
        Ok(format!("{alias}.{field}"))
    }

    /// Identity of `entity` under `alias`.
    pub fn identity_expr(&self, entity: &Entity, alias: &str) -> String {
        match entity.id.as_slice() {
            [single] => format!("{alias}.{single}"),
            many => {
                let exprs: Vec<String> = many.iter().map(|f| format!("{alias}.{f}")).collect();
                self.dialect.concat_ws(self.model.concat(), &exprs)
            }
        }
    }

    /// `LEFT JOIN` clauses for the referenced relations and their
    /// ancestors, parents before children.
    pub fn joins(&self) -> Result<String> {
        let mut needed: BTreeSet<(usize, &str)> = BTreeSet::new();
        for id in &self.used {
            let path = self.entity.relation_path(id).ok_or_else(|| Error::UnknownRelation {
                entity: self.entity.name.clone(),
                relation: id.clone(),
            })?;
            for (depth, rid) in path.into_iter().enumerate() {
                needed.insert((depth, rid));
            }
        }

        let mut sql = String::new();
        for (_, id) in needed {
            let relation = &self.entity.relations[id];
            let parent_alias = match &relation.parent_id {
                Some(parent) => self.entity.relations[parent].alias.as_str(),
                None => self.entity.alias.as_str(),
            };
            sql.push_str(&format!(
                "LEFT JOIN {} AS {} ON ({}.{} = {}.{})\n",
                relation.ref_entity_name,
                relation.alias,
                parent_alias,
                relation.field_name,
                relation.alias,
                relation.ref_field_name
            ));
        }
        Ok(sql)
    }
}

/// Split on commas outside parentheses and quotes.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                items.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&text[start..]);
    items.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

/// Whitespace-insensitive form used to compare select items.
pub fn normalize(item: &str) -> String {
    item.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::school;

    #[test]
    fn test_plain_field() {
        let model = school();
        let mut t = Translator::new(&model, "person", Dialect::SqlServer).unwrap();
        assert_eq!(t.translate("$email = @0").unwrap(), "pers.email = @0");
        assert!(t.used_relations().is_empty());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let model = school();
        let mut t = Translator::new(&model, "person", Dialect::SqlServer).unwrap();
        assert!(matches!(
            t.translate("$nope = 1"),
            Err(Error::UnknownField { .. })
        ));
        assert!(matches!(
            t.translate("$nope-name = 1"),
            Err(Error::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_relation_field_and_joins() {
        let model = school();
        let mut t = Translator::new(&model, "student", Dialect::SqlServer).unwrap();
        let sql = t.translate("$person__city-name LIKE @0").unwrap();
        let city = &model.entity("student").unwrap().relations["person__city"];
        assert_eq!(sql, format!("{}.name LIKE @0", city.alias));

        let joins = t.joins().unwrap();
        let lines: Vec<&str> = joins.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("LEFT JOIN person AS "));
        assert!(lines[0].contains("(stud.person = "));
        assert!(lines[1].starts_with(&format!("LEFT JOIN city AS {}", city.alias)));
    }

    #[test]
    fn test_identity_expressions() {
        let model = school();
        let mut t = Translator::new(&model, "grade", Dialect::MySql).unwrap();
        assert_eq!(
            t.translate("$_Id").unwrap(),
            "CONCAT_WS('~', grad.student, grad.course)"
        );
        let mut t = Translator::new(&model, "person", Dialect::MySql).unwrap();
        assert_eq!(t.translate("$_Id").unwrap(), "pers.id");
    }

    #[test]
    fn test_items_get_labels() {
        let model = school();
        let mut t = Translator::new(&model, "student", Dialect::SqlServer).unwrap();
        let items = t
            .translate_items("$id, $person-email, COALESCE($person-name, ''), $_Id")
            .unwrap();
        let per = &model.entity("student").unwrap().relations["person"].alias;
        assert_eq!(items[0], "stud.id");
        assert_eq!(items[1], format!("{per}.email AS [person-email]"));
        assert_eq!(items[2], format!("COALESCE({per}.name, '')"));
        assert_eq!(items[3], "stud.id AS [_Id]");
    }

    #[test]
    fn test_virtual_field_has_no_column() {
        let model = school();
        let mut t = Translator::new(&model, "person", Dialect::SqlServer).unwrap();
        assert!(matches!(t.translate("$label"), Err(Error::Usage(_))));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a, CONCAT(b, ','), c"),
            vec!["a", " CONCAT(b, ',')", " c"]
        );
        assert_eq!(normalize("  Pers.Name\n DESC"), "pers.name desc");
    }
}

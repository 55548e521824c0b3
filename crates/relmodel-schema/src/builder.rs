//! Model construction.
//!
//! The build runs once at startup:
//!
//! 1. assign table aliases and foreign-key field aliases;
//! 2. derive entities and apply entity overrides;
//! 3. infer identity fields;
//! 4. derive fields and apply field overrides;
//! 5. build each entity's relation tree and flatten it into relations.
//!
//! # Example
//!
//! ```ignore
//! let mut reader = InformationSchemaReader::new(conn.as_mut(), &config.db_name);
//! let model = ModelBuilder::new(config).build(&mut reader)?;
//! ```

use crate::alias::{AliasPool, FIELD_ALIAS_LENGTH, TABLE_ALIAS_LENGTH};
use crate::column::{Table, TableSchema, is_live_fk};
use crate::entity::{Entity, Relation, RelationNode, define_id};
use crate::field::Field;
use crate::model::Model;
use crate::overrides::{
    EntityOverrides, FieldOverrides, load_entity_overrides, load_field_overrides,
};
use crate::reader::SchemaReader;
use relmodel_core::{Config, Error, IdSource, Result};
use std::collections::BTreeMap;

type FieldMap = BTreeMap<String, BTreeMap<String, Field>>;

/// Builds a [`Model`] from schema metadata plus optional overrides.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    config: Config,
    entity_overrides: Option<EntityOverrides>,
    field_overrides: BTreeMap<String, FieldOverrides>,
}

impl ModelBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            entity_overrides: None,
            field_overrides: BTreeMap::new(),
        }
    }

    /// Use these entity overrides instead of `entities.json`.
    pub fn with_entity_overrides(mut self, overrides: EntityOverrides) -> Self {
        self.entity_overrides = Some(overrides);
        self
    }

    /// Use these field overrides instead of `fields/<entity>.json`.
    pub fn with_field_overrides(mut self, entity: impl Into<String>, overrides: FieldOverrides) -> Self {
        self.field_overrides.insert(entity.into(), overrides);
        self
    }

    /// Introspect through `reader` and build.
    pub fn build(self, reader: &mut dyn SchemaReader) -> Result<Model> {
        let schema = reader.read_schema()?;
        self.build_from_schema(schema)
    }

    /// Build from already-read schema metadata.
    pub fn build_from_schema(mut self, schema: Vec<TableSchema>) -> Result<Model> {
        self.config.validate()?;
        self.load_override_documents(&schema)?;

        let tables = self.tables(schema)?;
        let mut entities = self.entities(&tables)?;
        let fields = self.fields(&tables, &entities)?;

        for entity in entities.values() {
            self.check_foreign_keys(entity, &fields)?;
        }
        let snapshot = entities.clone();
        for entity in entities.values_mut() {
            entity.tree = build_tree(&snapshot, &fields, &entity.name, None, &mut vec![entity.name.clone()])?;
            entity.relations = BTreeMap::new();
            let mut pool = AliasPool::with_reserved(&self.config.reserved_alias);
            pool.reserve(&entity.alias);
            flatten(&entity.tree, None, &mut pool, self.config.id_source, &mut entity.relations)?;
            tracing::debug!(
                entity = %entity.name,
                alias = %entity.alias,
                id = ?entity.id,
                relations = entity.relations.len(),
                "Built entity"
            );
        }

        let model = Model::new(entities, fields, &self.config);
        model.check_consistency()?;
        tracing::info!(entities = model.entity_names().count(), "Model built");
        Ok(model)
    }

    fn load_override_documents(&mut self, schema: &[TableSchema]) -> Result<()> {
        let Some(dir) = self.config.config_path.clone() else {
            return Ok(());
        };
        if self.entity_overrides.is_none() {
            self.entity_overrides = load_entity_overrides(&dir)?;
        }
        for table in schema {
            if self.field_overrides.contains_key(&table.name) {
                continue;
            }
            if let Some(doc) = load_field_overrides(&dir, &table.name)? {
                self.field_overrides.insert(table.name.clone(), doc);
            }
        }
        Ok(())
    }

    fn tables(&self, schema: Vec<TableSchema>) -> Result<Vec<Table>> {
        let config = &self.config;
        let reserved = |t: &str| config.is_reserved_entity(t);
        let mut table_pool = AliasPool::with_reserved(&config.reserved_alias);
        let mut tables = Vec::with_capacity(schema.len());

        for mut table in schema {
            if reserved(&table.name) {
                tracing::debug!(table = %table.name, "Skipping reserved table");
                continue;
            }
            let alias = table_pool.assign(&table.name, TABLE_ALIAS_LENGTH)?;

            let mut field_pool = AliasPool::with_reserved(&config.reserved_alias);
            for col in &mut table.columns {
                if !is_live_fk(col, &reserved) {
                    continue;
                }
                let source = match config.id_source {
                    IdSource::FieldName => col.name.clone(),
                    IdSource::ReferencedTable => col.referenced_table.clone().unwrap_or_default(),
                };
                col.alias = Some(field_pool.assign(&source, FIELD_ALIAS_LENGTH)?);
            }
            tables.push(Table::derive(table, alias, reserved));
        }
        Ok(tables)
    }

    fn entities(&self, tables: &[Table]) -> Result<BTreeMap<String, Entity>> {
        let overrides = self.entity_overrides.as_ref();
        if let Some(doc) = overrides {
            for name in doc.keys() {
                if !tables.iter().any(|t| &t.name == name) {
                    tracing::warn!(entity = %name, "Override for unknown entity ignored");
                }
            }
        }

        let mut entities = BTreeMap::new();
        let mut aliases = AliasPool::new();
        for t in tables {
            let mut e = Entity {
                name: t.name.clone(),
                alias: t.alias.clone(),
                fields: t.column_names.clone(),
                pk: t.pk.clone(),
                fk: t.fk.clone(),
                unique: t.unique.clone(),
                unique_multiple: t.unique_multiple.clone(),
                not_null: t.not_null.clone(),
                id: Vec::new(),
                order_default: Vec::new(),
                tree: BTreeMap::new(),
                relations: BTreeMap::new(),
            };

            let doc = overrides.and_then(|o| o.get(&t.name));
            if let Some(doc) = doc {
                doc.apply(&mut e);
            }

            e.id = match doc.and_then(|d| d.id.clone()) {
                Some(id) => {
                    if let Some(bad) = id.iter().find(|f| !e.has_field(f)) {
                        return Err(Error::config(format!(
                            "identity of '{}' names unknown field '{bad}'",
                            e.name
                        )));
                    }
                    id
                }
                None => define_id(&e),
            };
            if e.id.is_empty() {
                return Err(Error::config(format!("entity '{}' has no fields", e.name)));
            }

            if aliases.contains(&e.alias) {
                return Err(Error::config(format!(
                    "alias '{}' of '{}' is already in use",
                    e.alias, e.name
                )));
            }
            aliases.reserve(&e.alias);
            entities.insert(e.name.clone(), e);
        }
        Ok(entities)
    }

    fn fields(&self, tables: &[Table], entities: &BTreeMap<String, Entity>) -> Result<FieldMap> {
        let mut out = FieldMap::new();
        for t in tables {
            let e = &entities[&t.name];
            let mut map = BTreeMap::new();
            for name in &e.fields {
                let mut field = match t.columns.iter().find(|c| &c.name == name) {
                    Some(col) => Field::from_column(&t.name, col),
                    None => Field::virtual_field(&t.name, name),
                };
                if field.persisted {
                    field.not_null = e.not_null.contains(name);
                }
                if !e.fk.contains(name) {
                    field.ref_entity_name = None;
                    field.ref_field_name = None;
                }
                field.derive_rules();
                map.insert(name.clone(), field);
            }

            if let Some(doc) = self.field_overrides.get(&t.name) {
                for (name, o) in doc {
                    o.validate(&t.name, name)?;
                    match map.get_mut(name) {
                        Some(field) => o.apply(field),
                        None => tracing::warn!(
                            entity = %t.name,
                            field = %name,
                            "Override for unknown field ignored"
                        ),
                    }
                }
            }
            out.insert(t.name.clone(), map);
        }
        Ok(out)
    }

    /// Every foreign key must resolve to an entity and field in the model.
    fn check_foreign_keys(&self, entity: &Entity, fields: &FieldMap) -> Result<()> {
        for fk in &entity.fk {
            let field = &fields[&entity.name][fk];
            let (Some(ref_entity), Some(ref_field)) = (&field.ref_entity_name, &field.ref_field_name) else {
                return Err(Error::config(format!(
                    "foreign key '{}.{fk}' has no referenced column",
                    entity.name
                )));
            };
            let target = fields.get(ref_entity).ok_or_else(|| {
                Error::config(format!(
                    "foreign key '{}.{fk}' references unknown entity '{ref_entity}'",
                    entity.name
                ))
            })?;
            if !target.contains_key(ref_field) {
                return Err(Error::config(format!(
                    "foreign key '{}.{fk}' references unknown field '{ref_entity}.{ref_field}'",
                    entity.name
                )));
            }
        }
        Ok(())
    }
}

/// Relation tree of `entity_name`.
///
/// `path` holds the entities on the current branch; a foreign key back into
/// one of them becomes a leaf so self references terminate.
fn build_tree(
    entities: &BTreeMap<String, Entity>,
    fields: &FieldMap,
    entity_name: &str,
    parent_id: Option<&str>,
    path: &mut Vec<String>,
) -> Result<BTreeMap<String, RelationNode>> {
    let entity = entities
        .get(entity_name)
        .ok_or_else(|| Error::UnknownEntity(entity_name.to_string()))?;
    let mut tree = BTreeMap::new();

    for fk in &entity.fk {
        let field = &fields[entity_name][fk];
        let (Some(ref_entity), Some(ref_field)) = (&field.ref_entity_name, &field.ref_field_name) else {
            continue;
        };
        let id = match parent_id {
            None => fk.clone(),
            Some(parent) => format!("{parent}__{fk}"),
        };
        let children = if path.contains(ref_entity) {
            BTreeMap::new()
        } else {
            path.push(ref_entity.clone());
            let children = build_tree(entities, fields, ref_entity, Some(&id), path);
            path.pop();
            children?
        };
        tree.insert(
            id,
            RelationNode {
                field_name: fk.clone(),
                ref_entity_name: ref_entity.clone(),
                ref_field_name: ref_field.clone(),
                children,
            },
        );
    }
    Ok(tree)
}

/// Depth-first flattening of a relation tree, assigning join aliases.
fn flatten(
    tree: &BTreeMap<String, RelationNode>,
    parent_id: Option<&str>,
    pool: &mut AliasPool,
    id_source: IdSource,
    out: &mut BTreeMap<String, Relation>,
) -> Result<()> {
    for (id, node) in tree {
        let source = match id_source {
            IdSource::FieldName => &node.field_name,
            IdSource::ReferencedTable => &node.ref_entity_name,
        };
        let alias = pool.assign(source, FIELD_ALIAS_LENGTH)?;
        out.insert(
            id.clone(),
            Relation {
                field_name: node.field_name.clone(),
                ref_entity_name: node.ref_entity_name.clone(),
                ref_field_name: node.ref_field_name.clone(),
                parent_id: parent_id.map(String::from),
                alias,
            },
        );
        flatten(&node.children, Some(id), pool, id_source, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::overrides::{EntityOverride, FieldOverride};
    use relmodel_core::FieldType;

    fn school() -> Vec<TableSchema> {
        vec![
            TableSchema::new("city")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("name", "varchar").max_length(80)),
            TableSchema::new("person")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("email", "varchar").max_length(120))
                .column(Column::new("name", "varchar").nullable())
                .column(Column::new("city", "int").nullable().references("city", "id"))
                .unique("uq_person_email", &["email"]),
            TableSchema::new("student")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("person", "int").references("person", "id"))
                .column(Column::new("tutor", "int").nullable().references("person", "id")),
        ]
    }

    #[test]
    fn test_aliases_and_identity() {
        let model = ModelBuilder::new(Config::default())
            .build_from_schema(school())
            .unwrap();
        let person = model.entity("person").unwrap();
        assert_eq!(person.alias, "pers");
        assert_eq!(person.id, vec!["id"]);
        assert_eq!(model.entity("city").unwrap().alias, "city");
        assert_eq!(model.field("person", "city").unwrap().alias.as_deref(), Some("cit"));
        assert_eq!(model.field("person", "email").unwrap().alias, None);
    }

    #[test]
    fn test_keyword_prefixed_tables_get_safe_aliases() {
        let schema = vec![
            TableSchema::new("showroom").column(Column::new("id", "int").primary_key()),
            TableSchema::new("deny_list").column(Column::new("id", "int").primary_key()),
        ];
        let model = ModelBuilder::new(Config::default())
            .build_from_schema(schema)
            .unwrap();
        assert_eq!(model.entity("showroom").unwrap().alias, "sho1");
        assert_eq!(model.entity("deny_list").unwrap().alias, "den1");
    }

    #[test]
    fn test_relations_are_nested_with_parent_ids() {
        let model = ModelBuilder::new(Config::default())
            .build_from_schema(school())
            .unwrap();
        let student = model.entity("student").unwrap();
        let ids: Vec<&str> = student.relations.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["person", "person__city", "tutor", "tutor__city"]);

        let nested = &student.relations["person__city"];
        assert_eq!(nested.parent_id.as_deref(), Some("person"));
        assert_eq!(nested.field_name, "city");
        assert_eq!(nested.ref_entity_name, "city");

        assert!(student.tree["person"].children.contains_key("person__city"));

        let aliases: std::collections::HashSet<&str> =
            student.relations.values().map(|r| r.alias.as_str()).collect();
        assert_eq!(aliases.len(), 4);
        assert!(!aliases.contains(student.alias.as_str()));
    }

    #[test]
    fn test_self_reference_terminates() {
        let schema = vec![
            TableSchema::new("category")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("parent", "int").nullable().references("category", "id")),
        ];
        let model = ModelBuilder::new(Config::default())
            .build_from_schema(schema)
            .unwrap();
        let category = model.entity("category").unwrap();
        assert_eq!(category.relations.len(), 1);
        assert!(category.tree["parent"].children.is_empty());
    }

    #[test]
    fn test_reserved_entities_are_skipped() {
        let config = Config {
            reserved_entities: vec!["city".into()],
            ..Config::default()
        };
        let model = ModelBuilder::new(config).build_from_schema(school()).unwrap();
        assert!(model.entity("city").is_err());
        let person = model.entity("person").unwrap();
        assert!(person.fk.is_empty());
        assert!(person.relations.is_empty());
        assert!(!model.field("person", "city").unwrap().is_fk());
    }

    #[test]
    fn test_entity_override_adds_virtual_field() {
        let mut doc = EntityOverrides::new();
        doc.insert(
            "person".into(),
            EntityOverride {
                fields_add: vec!["label".into()],
                order_default: Some(vec!["name".into()]),
                ..EntityOverride::default()
            },
        );
        let model = ModelBuilder::new(Config::default())
            .with_entity_overrides(doc)
            .build_from_schema(school())
            .unwrap();
        let label = model.field("person", "label").unwrap();
        assert!(!label.persisted);
        assert_eq!(label.field_type, FieldType::Object);
        assert!(!model.field_names_admin("person").unwrap().contains(&"label"));
        assert_eq!(model.entity("person").unwrap().order_default, vec!["name"]);
    }

    #[test]
    fn test_explicit_identity_must_exist() {
        let mut doc = EntityOverrides::new();
        doc.insert(
            "person".into(),
            EntityOverride {
                id: Some(vec!["nope".into()]),
                ..EntityOverride::default()
            },
        );
        let err = ModelBuilder::new(Config::default())
            .with_entity_overrides(doc)
            .build_from_schema(school())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_fk_add_without_reference_is_rejected() {
        let mut doc = EntityOverrides::new();
        doc.insert(
            "person".into(),
            EntityOverride {
                fk_add: vec!["name".into()],
                ..EntityOverride::default()
            },
        );
        let err = ModelBuilder::new(Config::default())
            .with_entity_overrides(doc)
            .build_from_schema(school())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_field_override_applies() {
        let mut doc = FieldOverrides::new();
        doc.insert(
            "name".into(),
            FieldOverride {
                default_value: Some("unknown".into()),
                not_null: Some(true),
                ..FieldOverride::default()
            },
        );
        let model = ModelBuilder::new(Config::default())
            .with_field_overrides("person", doc)
            .build_from_schema(school())
            .unwrap();
        let name = model.field("person", "name").unwrap();
        assert!(name.is_required());
        assert_eq!(name.default_value.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_identity_from_composite_unique() {
        let schema = vec![
            TableSchema::new("grade")
                .column(Column::new("student", "varchar"))
                .column(Column::new("course", "varchar"))
                .column(Column::new("score", "int").nullable())
                .unique("uq_grade", &["student", "course"]),
        ];
        let model = ModelBuilder::new(Config::default())
            .build_from_schema(schema)
            .unwrap();
        assert_eq!(model.entity("grade").unwrap().id, vec!["student", "course"]);
    }
}

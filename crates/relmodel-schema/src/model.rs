//! The immutable entity model.
//!
//! A [`Model`] is built once and then only read. Share it as `Arc<Model>`;
//! it has no mutators, so concurrent readers need no locking.

use crate::entity::{Entity, Relation};
use crate::field::Field;
use relmodel_core::{Config, Error, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Entities and fields of a schema, after overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    entities: BTreeMap<String, Entity>,
    fields: BTreeMap<String, BTreeMap<String, Field>>,
    id_name: String,
    concat: String,
}

impl Model {
    pub(crate) fn new(
        entities: BTreeMap<String, Entity>,
        fields: BTreeMap<String, BTreeMap<String, Field>>,
        config: &Config,
    ) -> Self {
        Self {
            entities,
            fields,
            id_name: config.id.clone(),
            concat: config.concat.clone(),
        }
    }

    /// Name of the synthetic identity field, `_Id` by default.
    pub fn id_name(&self) -> &str {
        &self.id_name
    }

    /// Separator between identity components.
    pub fn concat(&self) -> &str {
        &self.concat
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity(&self, name: &str) -> Result<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    pub fn field(&self, entity: &str, field: &str) -> Result<&Field> {
        self.fields
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?
            .get(field)
            .ok_or_else(|| Error::unknown_field(entity, field))
    }

    /// Fields of an entity in declaration order.
    pub fn fields(&self, entity: &str) -> Result<Vec<&Field>> {
        let e = self.entity(entity)?;
        e.fields.iter().map(|f| self.field(entity, f)).collect()
    }

    /// Field names in declaration order.
    pub fn field_names(&self, entity: &str) -> Result<&[String]> {
        Ok(&self.entity(entity)?.fields)
    }

    /// Names of fields that map to columns and may be written.
    pub fn field_names_admin(&self, entity: &str) -> Result<Vec<&str>> {
        Ok(self
            .fields(entity)?
            .into_iter()
            .filter(|f| f.persisted)
            .map(|f| f.name.as_str())
            .collect())
    }

    pub fn relation(&self, entity: &str, relation_id: &str) -> Result<&Relation> {
        self.entity(entity)?
            .relations
            .get(relation_id)
            .ok_or_else(|| Error::UnknownRelation {
                entity: entity.to_string(),
                relation: relation_id.to_string(),
            })
    }

    /// Write `entities.json` and `fields/<entity>.json` under `dir`.
    pub fn write_snapshot(&self, dir: &Path) -> Result<()> {
        let fields_dir = dir.join("fields");
        std::fs::create_dir_all(&fields_dir)?;
        std::fs::write(
            dir.join("entities.json"),
            serde_json::to_string_pretty(&self.entities)?,
        )?;
        for (entity, fields) in &self.fields {
            std::fs::write(
                fields_dir.join(format!("{entity}.json")),
                serde_json::to_string_pretty(fields)?,
            )?;
        }
        tracing::info!(
            dir = %dir.display(),
            entities = self.entities.len(),
            "Wrote schema snapshot"
        );
        Ok(())
    }

    /// Rebuild a model from a snapshot written by [`Model::write_snapshot`].
    pub fn from_snapshot(dir: &Path, config: &Config) -> Result<Self> {
        let text = std::fs::read_to_string(dir.join("entities.json"))?;
        let entities: BTreeMap<String, Entity> = serde_json::from_str(&text)?;
        let mut fields = BTreeMap::new();
        for name in entities.keys() {
            let path = dir.join("fields").join(format!("{name}.json"));
            let text = std::fs::read_to_string(&path)?;
            let entity_fields: BTreeMap<String, Field> = serde_json::from_str(&text)?;
            fields.insert(name.clone(), entity_fields);
        }
        let model = Self::new(entities, fields, config);
        model.check_consistency()?;
        Ok(model)
    }

    /// Every entity has an identity, and every listed field and relation
    /// target resolves.
    pub(crate) fn check_consistency(&self) -> Result<()> {
        for e in self.entities.values() {
            if e.id.is_empty() {
                return Err(Error::config(format!("entity '{}' has no identity", e.name)));
            }
            for f in e.fields.iter().chain(&e.id) {
                self.field(&e.name, f)
                    .map_err(|_| Error::config(format!("entity '{}' lists unknown field '{f}'", e.name)))?;
            }
            for (id, rel) in &e.relations {
                self.entity(&rel.ref_entity_name).map_err(|_| {
                    Error::config(format!(
                        "relation '{id}' of '{}' targets unknown entity '{}'",
                        e.name, rel.ref_entity_name
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::column::{Column, TableSchema};

    fn model() -> Model {
        let schema = vec![
            TableSchema::new("city")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("name", "varchar")),
            TableSchema::new("person")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("city", "int").references("city", "id")),
        ];
        ModelBuilder::new(Config::default())
            .build_from_schema(schema)
            .unwrap()
    }

    #[test]
    fn test_lookups() {
        let model = model();
        assert_eq!(model.id_name(), "_Id");
        assert!(matches!(model.entity("nope"), Err(Error::UnknownEntity(_))));
        assert!(matches!(
            model.field("person", "nope"),
            Err(Error::UnknownField { .. })
        ));
        assert!(matches!(
            model.relation("person", "nope"),
            Err(Error::UnknownRelation { .. })
        ));
        assert_eq!(model.relation("person", "city").unwrap().ref_entity_name, "city");
        assert_eq!(model.field_names_admin("person").unwrap(), vec!["id", "city"]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let model = model();
        let dir = std::env::temp_dir().join(format!("relmodel-snapshot-{}", std::process::id()));
        model.write_snapshot(&dir).unwrap();
        assert!(dir.join("entities.json").is_file());
        assert!(dir.join("fields").join("person.json").is_file());

        let reloaded = Model::from_snapshot(&dir, &Config::default()).unwrap();
        assert_eq!(reloaded, model);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

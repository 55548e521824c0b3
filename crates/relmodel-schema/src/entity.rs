//! Entities, identity inference and relations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One foreign-key hop in an entity's relation tree.
///
/// Children are the referenced entity's own foreign keys, keyed by
/// relation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationNode {
    pub field_name: String,
    pub ref_entity_name: String,
    pub ref_field_name: String,
    #[serde(default)]
    pub children: BTreeMap<String, RelationNode>,
}

/// Flattened relation entry, addressed by relation id.
///
/// `parent_id` names the relation that owns `field_name`; `None` means the
/// field belongs to the entity itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub field_name: String,
    pub ref_entity_name: String,
    pub ref_field_name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Alias of the joined table in generated SQL.
    pub alias: String,
}

/// The model of a table after configuration overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub alias: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub pk: Vec<String>,
    #[serde(default)]
    pub fk: Vec<String>,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub unique_multiple: Vec<Vec<String>>,
    #[serde(default)]
    pub not_null: Vec<String>,
    /// Identity fields, never empty.
    pub id: Vec<String>,
    #[serde(default)]
    pub order_default: Vec<String>,
    #[serde(default)]
    pub tree: BTreeMap<String, RelationNode>,
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
}

impl Entity {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Relation ids from the root down to `id`, inclusive.
    ///
    /// Returns `None` when `id` or one of its ancestors is missing.
    pub fn relation_path(&self, id: &str) -> Option<Vec<&str>> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(rid) = current {
            let (key, relation) = self.relations.get_key_value(rid)?;
            if path.len() > self.relations.len() {
                return None;
            }
            path.push(key.as_str());
            current = relation.parent_id.as_deref();
        }
        path.reverse();
        Some(path)
    }

    /// Relations whose parent is `parent_id`.
    pub fn child_relations<'a>(
        &'a self,
        parent_id: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a Relation)> + 'a {
        self.relations
            .iter()
            .filter(move |(_, r)| r.parent_id.as_deref() == parent_id)
            .map(|(id, r)| (id.as_str(), r))
    }
}

/// Infer the identity fields of an entity.
///
/// The first matching rule wins:
/// 1. a single-column primary key;
/// 2. the first single-column unique field that is not null;
/// 3. the first multi-column unique group whose fields are all not null;
/// 4. all not-null fields, when there is more than one;
/// 5. all fields.
pub fn define_id(entity: &Entity) -> Vec<String> {
    if let [pk] = entity.pk.as_slice() {
        return vec![pk.clone()];
    }

    let not_null = |f: &String| entity.not_null.contains(f);

    if let Some(f) = entity.unique.iter().find(|f| not_null(f)) {
        return vec![f.clone()];
    }

    if let Some(group) = entity
        .unique_multiple
        .iter()
        .find(|group| !group.is_empty() && group.iter().all(not_null))
    {
        return group.clone();
    }

    if entity.not_null.len() > 1 {
        return entity.not_null.clone();
    }

    entity.fields.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(fields: &[&str]) -> Entity {
        Entity {
            name: "t".into(),
            alias: "t".into(),
            fields: fields.iter().map(|s| (*s).to_string()).collect(),
            pk: Vec::new(),
            fk: Vec::new(),
            unique: Vec::new(),
            unique_multiple: Vec::new(),
            not_null: Vec::new(),
            id: Vec::new(),
            order_default: Vec::new(),
            tree: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_single_pk_wins() {
        let mut e = entity(&["id", "email"]);
        e.pk = strings(&["id"]);
        e.unique = strings(&["email"]);
        e.not_null = strings(&["id", "email"]);
        assert_eq!(define_id(&e), strings(&["id"]));
    }

    #[test]
    fn test_composite_pk_falls_to_unique() {
        let mut e = entity(&["a", "b", "code"]);
        e.pk = strings(&["a", "b"]);
        e.unique = strings(&["code"]);
        e.not_null = strings(&["a", "b", "code"]);
        assert_eq!(define_id(&e), strings(&["code"]));
    }

    #[test]
    fn test_nullable_unique_is_skipped() {
        let mut e = entity(&["a", "b", "c"]);
        e.unique = strings(&["c", "a"]);
        e.not_null = strings(&["a"]);
        assert_eq!(define_id(&e), strings(&["a"]));
    }

    #[test]
    fn test_first_all_not_null_unique_group() {
        let mut e = entity(&["a", "b", "c"]);
        e.unique_multiple = vec![strings(&["a", "c"]), strings(&["a", "b"])];
        e.not_null = strings(&["a", "b"]);
        assert_eq!(define_id(&e), strings(&["a", "b"]));
    }

    #[test]
    fn test_all_not_null_fields() {
        let mut e = entity(&["a", "b", "c"]);
        e.not_null = strings(&["a", "c"]);
        assert_eq!(define_id(&e), strings(&["a", "c"]));
    }

    #[test]
    fn test_single_not_null_falls_to_all_fields() {
        let mut e = entity(&["a", "b"]);
        e.not_null = strings(&["a"]);
        assert_eq!(define_id(&e), strings(&["a", "b"]));
    }

    #[test]
    fn test_relation_path() {
        let mut e = entity(&["student"]);
        let rel = |field: &str, parent: Option<&str>| Relation {
            field_name: field.into(),
            ref_entity_name: "x".into(),
            ref_field_name: "id".into(),
            parent_id: parent.map(String::from),
            alias: field[..3].into(),
        };
        e.relations.insert("student".into(), rel("student", None));
        e.relations
            .insert("student__person".into(), rel("person", Some("student")));
        assert_eq!(
            e.relation_path("student__person").unwrap(),
            vec!["student", "student__person"]
        );
        assert!(e.relation_path("nope").is_none());
        assert_eq!(e.child_relations(None).count(), 1);
        assert_eq!(e.child_relations(Some("student")).count(), 1);
    }
}

//! Schema introspection and the entity model for RelModel.
//!
//! This crate turns raw schema metadata into an immutable [`Model`]:
//!
//! - **Readers** ([`SchemaReader`]) list tables, columns and unique
//!   constraints, either from `INFORMATION_SCHEMA` or from memory.
//! - **Aliases** ([`AliasPool`]) give every table, foreign-key field and join
//!   a short unique name.
//! - **Identity inference** ([`define_id`]) picks the fields that identify a
//!   row when there is no single-column key.
//! - **Overrides** ([`EntityOverride`], [`FieldOverride`]) adjust field sets,
//!   keys, checks and resets from JSON documents.
//! - **Relations** map foreign-key paths to join aliases, nested through
//!   parent ids.
//!
//! The model can be written to and reloaded from a JSON snapshot.

pub mod alias;
pub mod builder;
pub mod column;
pub mod entity;
pub mod field;
pub mod model;
pub mod overrides;
pub mod reader;

pub use alias::{AliasPool, get_alias};
pub use builder::ModelBuilder;
pub use column::{Column, Table, TableSchema};
pub use entity::{Entity, Relation, RelationNode, define_id};
pub use field::{CheckKind, Checks, Field, ResetKind, Resets};
pub use model::Model;
pub use overrides::{EntityOverride, EntityOverrides, FieldOverride, FieldOverrides};
pub use reader::{
    InformationSchemaReader, MemorySchemaReader, MySqlSchemaReader, SchemaReader,
    SqlServerSchemaReader,
};

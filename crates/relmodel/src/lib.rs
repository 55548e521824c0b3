//! RelModel: a schema-reflecting entity model and dynamic SQL engine.
//!
//! RelModel reads a live SQL Server or MySQL schema, derives a model of
//! entities, fields, keys and foreign-key relations, and uses it to build
//! parameterized queries and hold typed entity values.
//!
//! # Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `relmodel-core` | values, rows, dialects, configuration, the `Connection` contract |
//! | `relmodel-schema` | introspection, overrides, the [`Model`](relmodel_schema::Model) |
//! | `relmodel-query` | [`Select`](relmodel_query::Select) and [`Persist`](relmodel_query::Persist) builders |
//! | `relmodel-session` | binding, execution, result cache and [`EntityValues`](relmodel_session::EntityValues) |
//!
//! The engine never opens sockets itself. Applications supply a
//! [`ConnectionFactory`](relmodel_core::ConnectionFactory) wrapping their
//! driver of choice.
//!
//! # Example
//!
//! ```ignore
//! use relmodel::prelude::*;
//!
//! let config = Config::load("relmodel.json")?;
//! let db = Db::connect(config, Arc::new(|| open_driver_connection()))?;
//!
//! let mut exec = db.executor();
//! let rows = exec.rows(
//!     &db.sql("student")?
//!         .fields("$id, $person-name, $person__city-name")
//!         .where_("$person__city-name = @0")
//!         .parameter("Lima")
//!         .size(20),
//! )?;
//! ```

pub use relmodel_core as core;
pub use relmodel_query as query;
pub use relmodel_schema as schema;
pub use relmodel_session as session;

pub use relmodel_core::{
    Command, Config, Connection, ConnectionFactory, Dialect, Error, FieldType, FromValue, IdSource,
    Result, Row, Statement, ValidationError, ValidationErrorKind, ValidationLog, Value,
};
pub use relmodel_query::{Persist, Select, Translator};
pub use relmodel_schema::{
    CheckKind, Column, Entity, EntityOverride, EntityOverrides, Field, FieldOverride,
    FieldOverrides, InformationSchemaReader, MemorySchemaReader, Model, ModelBuilder, Relation,
    RelationNode, ResetKind, SchemaReader, TableSchema,
};
pub use relmodel_session::{
    Change, CompareOptions, Db, EntityValues, Executor, FieldHooks, ResultCache, ToStatement, bind,
};

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{
        Change, Column, Command, CompareOptions, Config, Connection, ConnectionFactory, Db,
        Dialect, EntityValues, Error, Executor, FieldHooks, FieldType, FromValue, Model,
        ModelBuilder, Persist, Result, Row, Select, Statement, TableSchema, ToStatement,
        ValidationErrorKind, Value,
    };
    pub use std::sync::Arc;
}

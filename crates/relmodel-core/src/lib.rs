//! Core types and traits for RelModel.
//!
//! `relmodel-core` is the **foundation layer**. It defines the data types and
//! contracts every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Value`, `Row` and `FieldType` represent field values,
//!   query results and semantic column types.
//! - **Contract layer**: `Connection` and `ConnectionFactory` are implemented
//!   by database drivers; `Command` is what they execute.
//! - **Dialects**: `Dialect` captures the SQL text differences between SQL
//!   Server and MySQL.
//! - **Errors**: `Error` covers configuration, usage, transport and
//!   transaction faults. Data faults go to a `ValidationLog` instead.
//!
//! # Who Uses This Crate
//!
//! - `relmodel-schema` maps vendor column types through `FieldType`.
//! - `relmodel-query` emits `Statement`s using `Dialect`.
//! - `relmodel-session` binds statements into `Command`s and runs them on a
//!   `Connection`.

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod row;
pub mod statement;
pub mod types;
pub mod validate;
pub mod value;

pub use config::{Config, IdSource};
pub use connection::{Command, Connection, ConnectionFactory};
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use row::Row;
pub use statement::Statement;
pub use types::FieldType;
pub use validate::{ValidationError, ValidationErrorKind, ValidationLog};
pub use value::{FromValue, Value};

//! Binding, execution and entity values for RelModel.
//!
//! This crate turns the statements built by `relmodel-query` into commands
//! a [`Connection`](relmodel_core::Connection) can run, and gives
//! applications a typed view of entity rows.
//!
//! - [`bind`] expands `@N`, `@name` and array placeholders into one
//!   `@_k` binding per value.
//! - [`Executor`] runs commands on one lazily opened connection, manages
//!   its transaction and materializes rows, objects and scalars.
//! - [`ResultCache`] is shared between executors for point lookups.
//! - [`EntityValues`] holds one row of an entity with typed assignment,
//!   defaults, resets, checks and relation navigation.
//! - [`Db`] ties model, configuration, connection factory, cache and
//!   [`FieldHooks`] together.
//!
//! # Example
//!
//! ```ignore
//! use relmodel_session::Db;
//!
//! let db = Db::connect(config, Arc::new(open_connection))?;
//! let mut exec = db.executor();
//! let count: Option<i64> = exec.value(&db.sql("person")?.count())?;
//!
//! let mut person = db.values("person")?;
//! person.sset("email", " Ana@Example.com ")?.reset()?;
//! if person.check() {
//!     let batch = db.persist().insert("person", person.values())?;
//!     exec.transaction(&batch)?;
//! }
//! ```

pub mod binding;
pub mod cache;
pub mod db;
pub mod executor;
pub mod hooks;
pub mod values;

pub use binding::bind;
pub use cache::ResultCache;
pub use db::Db;
pub use executor::{Executor, ToStatement};
pub use hooks::{CheckHook, FieldHooks, ResetHook, SetHook};
pub use values::{Change, CompareOptions, EntityValues};

//! SQL builders for RelModel.
//!
//! Both builders read an immutable [`Model`](relmodel_schema::Model) and
//! produce [`Statement`](relmodel_core::Statement)s: SQL text with `@N` and
//! `@name` placeholders plus their values. Nothing here touches a
//! connection; binding and execution live in `relmodel-session`.
//!
//! - [`Select`] builds SELECT and aggregate queries. Field lists,
//!   conditions and ordering use `$field` and `$relation-field`
//!   references, which [`Translator`] resolves to aliased columns and the
//!   joins they need.
//! - [`Persist`] accumulates INSERT, UPDATE and DELETE statements over one
//!   shared parameter list.
//!
//! # Example
//!
//! ```ignore
//! use relmodel_query::Select;
//!
//! let stmt = Select::new(model.clone(), Dialect::SqlServer, "student")?
//!     .fields("$id, $person-name")
//!     .where_("$person__city-name = @0")
//!     .parameter("Lima")
//!     .order("$person-name")
//!     .build()?;
//! ```

pub mod persist;
pub mod select;
pub mod translate;

pub use persist::Persist;
pub use select::Select;
pub use translate::{Translator, normalize, split_top_level};

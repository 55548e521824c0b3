//! Raw schema metadata.
//!
//! [`Column`] and [`TableSchema`] are what a schema reader returns. [`Table`]
//! adds the assigned alias and the derived key sets. All three are transient:
//! they are discarded once the [`Model`](crate::Model) is built.

use std::collections::BTreeMap;

/// A column as reported by the database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Column {
    pub name: String,
    /// Vendor data type, e.g. `varchar`.
    pub data_type: String,
    /// Character or byte length, when the type has one.
    pub max_length: Option<u64>,
    pub nullable: bool,
    pub unsigned: bool,
    pub primary_key: bool,
    pub foreign_key: bool,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
    /// Default expression as reported, e.g. `('abc')` or `((0))`.
    pub default_value: Option<String>,
    /// Alias assigned to foreign-key columns while building.
    pub alias: Option<String>,
}

impl Column {
    /// Create a non-null column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    /// Mark as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn max_length(mut self, len: u64) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Mark as a foreign key to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = true;
        self.referenced_table = Some(table.into());
        self.referenced_column = Some(column.into());
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }
}

/// Everything a schema reader reports about one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    /// Constraint name to its ordered column names.
    pub unique_constraints: BTreeMap<String, Vec<String>>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a unique constraint.
    pub fn unique(mut self, constraint: impl Into<String>, columns: &[&str]) -> Self {
        self.unique_constraints.insert(
            constraint.into(),
            columns.iter().map(|c| (*c).to_string()).collect(),
        );
        self
    }
}

/// A table with its alias and derived column subsets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub alias: String,
    pub columns: Vec<Column>,
    pub column_names: Vec<String>,
    pub pk: Vec<String>,
    pub fk: Vec<String>,
    pub not_null: Vec<String>,
    /// Columns with a single-column unique constraint.
    pub unique: Vec<String>,
    /// Column groups with a multi-column unique constraint.
    pub unique_multiple: Vec<Vec<String>>,
}

impl Table {
    /// Derive the key sets of a table.
    ///
    /// `is_reserved` filters foreign keys pointing at excluded tables.
    pub fn derive(
        schema: TableSchema,
        alias: String,
        is_reserved: impl Fn(&str) -> bool,
    ) -> Self {
        let mut table = Table {
            name: schema.name,
            alias,
            ..Table::default()
        };
        for col in &schema.columns {
            table.column_names.push(col.name.clone());
            if col.primary_key {
                table.pk.push(col.name.clone());
            }
            if is_live_fk(col, &is_reserved) {
                table.fk.push(col.name.clone());
            }
            if !col.nullable {
                table.not_null.push(col.name.clone());
            }
        }
        for columns in schema.unique_constraints.into_values() {
            match columns.as_slice() {
                [] => {}
                [single] => table.unique.push(single.clone()),
                _ => table.unique_multiple.push(columns),
            }
        }
        table.columns = schema.columns;
        table
    }
}

/// Foreign key whose target table is part of the model.
pub(crate) fn is_live_fk(col: &Column, is_reserved: &impl Fn(&str) -> bool) -> bool {
    col.foreign_key
        && col
            .referenced_table
            .as_deref()
            .is_some_and(|t| !is_reserved(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_sets() {
        let schema = TableSchema::new("enrollment")
            .column(Column::new("id", "int").primary_key())
            .column(Column::new("student", "int").references("student", "id"))
            .column(Column::new("course", "int").references("course", "id"))
            .column(Column::new("note", "varchar").nullable())
            .column(Column::new("audit", "int").nullable().references("sysaudit", "id"))
            .unique("uq_code", &["id"])
            .unique("uq_pair", &["student", "course"]);

        let table = Table::derive(schema, "enro".into(), |t| t == "sysaudit");
        assert_eq!(table.pk, vec!["id"]);
        assert_eq!(table.fk, vec!["student", "course"]);
        assert_eq!(table.not_null, vec!["id", "student", "course"]);
        assert_eq!(table.unique, vec!["id"]);
        assert_eq!(table.unique_multiple, vec![vec!["student".to_string(), "course".to_string()]]);
        assert_eq!(table.column_names.len(), 5);
    }
}

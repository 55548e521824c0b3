//! Schema introspection.
//!
//! A [`SchemaReader`] reports raw tables, columns and unique constraints.
//! The SQL Server and MySQL readers query `INFORMATION_SCHEMA` through any
//! [`Connection`]; [`MemorySchemaReader`] serves a fixed schema.

use crate::column::{Column, TableSchema};
use relmodel_core::{Command, Connection, Dialect, Error, Result, Row, Value};
use std::collections::BTreeMap;

/// Source of raw schema metadata.
pub trait SchemaReader {
    /// Base table names.
    fn table_names(&mut self) -> Result<Vec<String>>;

    /// Columns of a table, in ordinal order.
    fn columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Unique constraints of a table: constraint name to column names.
    fn unique_constraints(&mut self, table: &str) -> Result<BTreeMap<String, Vec<String>>>;

    /// Read every table.
    fn read_schema(&mut self) -> Result<Vec<TableSchema>> {
        let mut tables = Vec::new();
        for name in self.table_names()? {
            let columns = self.columns(&name)?;
            let unique_constraints = self.unique_constraints(&name)?;
            tables.push(TableSchema {
                name,
                columns,
                unique_constraints,
            });
        }
        Ok(tables)
    }
}

// ============================================================================
// In-memory reader
// ============================================================================

/// Serves a schema held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaReader {
    tables: Vec<TableSchema>,
}

impl MemorySchemaReader {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }
}

impl SchemaReader for MemorySchemaReader {
    fn table_names(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn columns(&mut self, table: &str) -> Result<Vec<Column>> {
        Ok(self.table(table)?.columns.clone())
    }

    fn unique_constraints(&mut self, table: &str) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(self.table(table)?.unique_constraints.clone())
    }

    fn read_schema(&mut self) -> Result<Vec<TableSchema>> {
        Ok(self.tables.clone())
    }
}

// ============================================================================
// INFORMATION_SCHEMA readers
// ============================================================================

const SS_TABLES: &str = "SELECT TABLE_NAME
FROM INFORMATION_SCHEMA.TABLES
WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_CATALOG = @db
ORDER BY TABLE_NAME ASC";

const SS_COLUMNS: &str = "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.CHARACTER_MAXIMUM_LENGTH,
    c.IS_NULLABLE, c.COLUMN_DEFAULT, 0 AS IS_UNSIGNED,
    CASE WHEN pk.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS IS_PRIMARY_KEY,
    CASE WHEN fk.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS IS_FOREIGN_KEY,
    fk.REFERENCED_TABLE_NAME, fk.REFERENCED_COLUMN_NAME
FROM INFORMATION_SCHEMA.COLUMNS c
LEFT JOIN (
    SELECT ku.TABLE_NAME, ku.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
        ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME AND tc.TABLE_NAME = ku.TABLE_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
) pk ON pk.TABLE_NAME = c.TABLE_NAME AND pk.COLUMN_NAME = c.COLUMN_NAME
LEFT JOIN (
    SELECT ku.TABLE_NAME, ku.COLUMN_NAME,
        ccu.TABLE_NAME AS REFERENCED_TABLE_NAME, ccu.COLUMN_NAME AS REFERENCED_COLUMN_NAME
    FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
    INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku ON rc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
    INNER JOIN INFORMATION_SCHEMA.CONSTRAINT_COLUMN_USAGE ccu
        ON rc.UNIQUE_CONSTRAINT_NAME = ccu.CONSTRAINT_NAME
) fk ON fk.TABLE_NAME = c.TABLE_NAME AND fk.COLUMN_NAME = c.COLUMN_NAME
WHERE c.TABLE_CATALOG = @db AND c.TABLE_NAME = @table
ORDER BY c.ORDINAL_POSITION";

const SS_UNIQUE: &str = "SELECT tc.CONSTRAINT_NAME, ku.COLUMN_NAME
FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
    ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME AND tc.TABLE_NAME = ku.TABLE_NAME
WHERE tc.CONSTRAINT_TYPE = 'UNIQUE' AND tc.TABLE_CATALOG = @db AND tc.TABLE_NAME = @table
ORDER BY tc.CONSTRAINT_NAME, ku.ORDINAL_POSITION";

const MY_TABLES: &str = "SELECT TABLE_NAME
FROM information_schema.TABLES
WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = @db
ORDER BY TABLE_NAME ASC";

const MY_COLUMNS: &str = "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.COLUMN_TYPE, c.CHARACTER_MAXIMUM_LENGTH,
    c.IS_NULLABLE, c.COLUMN_DEFAULT,
    IF(c.COLUMN_TYPE LIKE '%unsigned%', 1, 0) AS IS_UNSIGNED,
    IF(c.COLUMN_KEY = 'PRI', 1, 0) AS IS_PRIMARY_KEY,
    IF(k.REFERENCED_TABLE_NAME IS NULL, 0, 1) AS IS_FOREIGN_KEY,
    k.REFERENCED_TABLE_NAME, k.REFERENCED_COLUMN_NAME
FROM information_schema.COLUMNS c
LEFT JOIN information_schema.KEY_COLUMN_USAGE k
    ON k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME
    AND k.COLUMN_NAME = c.COLUMN_NAME AND k.REFERENCED_TABLE_NAME IS NOT NULL
WHERE c.TABLE_SCHEMA = @db AND c.TABLE_NAME = @table
ORDER BY c.ORDINAL_POSITION";

const MY_UNIQUE: &str = "SELECT tc.CONSTRAINT_NAME, k.COLUMN_NAME
FROM information_schema.TABLE_CONSTRAINTS tc
INNER JOIN information_schema.KEY_COLUMN_USAGE k
    ON tc.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND tc.CONSTRAINT_NAME = k.CONSTRAINT_NAME
    AND tc.TABLE_NAME = k.TABLE_NAME
WHERE tc.CONSTRAINT_TYPE = 'UNIQUE' AND tc.TABLE_SCHEMA = @db AND tc.TABLE_NAME = @table
ORDER BY tc.CONSTRAINT_NAME, k.ORDINAL_POSITION";

struct Queries {
    tables: &'static str,
    columns: &'static str,
    unique: &'static str,
}

/// Reader over `INFORMATION_SCHEMA` for a given dialect.
pub struct InformationSchemaReader<'a> {
    conn: &'a mut dyn Connection,
    db_name: String,
    queries: Queries,
}

/// SQL Server flavour of [`InformationSchemaReader`].
pub type SqlServerSchemaReader<'a> = InformationSchemaReader<'a>;

/// MySQL flavour of [`InformationSchemaReader`].
pub type MySqlSchemaReader<'a> = InformationSchemaReader<'a>;

impl<'a> InformationSchemaReader<'a> {
    /// Reader for the connection's own dialect.
    pub fn new(conn: &'a mut dyn Connection, db_name: impl Into<String>) -> Self {
        let queries = match conn.dialect() {
            Dialect::SqlServer => Queries {
                tables: SS_TABLES,
                columns: SS_COLUMNS,
                unique: SS_UNIQUE,
            },
            Dialect::MySql => Queries {
                tables: MY_TABLES,
                columns: MY_COLUMNS,
                unique: MY_UNIQUE,
            },
        };
        Self {
            conn,
            db_name: db_name.into(),
            queries,
        }
    }

    fn run(&mut self, sql: &str, table: Option<&str>) -> Result<Vec<Row>> {
        let mut cmd = Command::new(sql);
        cmd.bind("db", Value::Text(self.db_name.clone()));
        if let Some(t) = table {
            cmd.bind("table", Value::Text(t.to_string()));
        }
        self.conn.query(&cmd)
    }
}

impl SchemaReader for InformationSchemaReader<'_> {
    fn table_names(&mut self) -> Result<Vec<String>> {
        let rows = self.run(self.queries.tables, None)?;
        Ok(rows.iter().filter_map(|r| text(r, "TABLE_NAME")).collect())
    }

    fn columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let rows = self.run(self.queries.columns, Some(table))?;
        Ok(rows.iter().map(column_from_row).collect())
    }

    fn unique_constraints(&mut self, table: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let rows = self.run(self.queries.unique, Some(table))?;
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in &rows {
            if let (Some(name), Some(col)) = (text(row, "CONSTRAINT_NAME"), text(row, "COLUMN_NAME")) {
                out.entry(name).or_default().push(col);
            }
        }
        Ok(out)
    }
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .filter(|v| !v.is_null_or_empty())
        .map(ToString::to_string)
}

fn flag(row: &Row, column: &str) -> bool {
    row.get(column)
        .and_then(Value::as_i128)
        .is_some_and(|v| v != 0)
}

/// Length from `CHARACTER_MAXIMUM_LENGTH`, else from `COLUMN_TYPE` such as
/// `tinyint(1)`. `-1` (SQL Server `max`) counts as no length.
fn max_length(row: &Row) -> Option<u64> {
    let declared = row
        .get("CHARACTER_MAXIMUM_LENGTH")
        .and_then(Value::as_i128)
        .and_then(|v| u64::try_from(v).ok());
    declared.or_else(|| {
        let ty = text(row, "COLUMN_TYPE")?;
        let open = ty.find('(')?;
        let close = ty[open..].find(')')? + open;
        ty[open + 1..close].split(',').next()?.trim().parse().ok()
    })
}

fn column_from_row(row: &Row) -> Column {
    let nullable = text(row, "IS_NULLABLE").is_some_and(|v| v.eq_ignore_ascii_case("yes"));
    Column {
        name: text(row, "COLUMN_NAME").unwrap_or_default(),
        data_type: text(row, "DATA_TYPE").unwrap_or_default(),
        max_length: max_length(row),
        nullable,
        unsigned: flag(row, "IS_UNSIGNED"),
        primary_key: flag(row, "IS_PRIMARY_KEY"),
        foreign_key: flag(row, "IS_FOREIGN_KEY"),
        referenced_table: text(row, "REFERENCED_TABLE_NAME"),
        referenced_column: text(row, "REFERENCED_COLUMN_NAME"),
        default_value: text(row, "COLUMN_DEFAULT"),
        alias: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_from_mysql_row() {
        let row = Row::from_pairs([
            ("COLUMN_NAME", Value::from("active")),
            ("DATA_TYPE", Value::from("tinyint")),
            ("COLUMN_TYPE", Value::from("tinyint(1)")),
            ("CHARACTER_MAXIMUM_LENGTH", Value::Null),
            ("IS_NULLABLE", Value::from("NO")),
            ("COLUMN_DEFAULT", Value::from("1")),
            ("IS_UNSIGNED", Value::Long(0)),
            ("IS_PRIMARY_KEY", Value::Long(0)),
            ("IS_FOREIGN_KEY", Value::Long(0)),
            ("REFERENCED_TABLE_NAME", Value::Null),
            ("REFERENCED_COLUMN_NAME", Value::Null),
        ]);
        let col = column_from_row(&row);
        assert_eq!(col.max_length, Some(1));
        assert!(!col.nullable);
        assert!(!col.foreign_key);
        assert_eq!(col.default_value.as_deref(), Some("1"));
    }

    #[test]
    fn test_sql_server_max_length_minus_one() {
        let row = Row::from_pairs([
            ("COLUMN_NAME", Value::from("notes")),
            ("DATA_TYPE", Value::from("nvarchar")),
            ("CHARACTER_MAXIMUM_LENGTH", Value::Int(-1)),
            ("IS_NULLABLE", Value::from("YES")),
            ("IS_FOREIGN_KEY", Value::Int(1)),
            ("REFERENCED_TABLE_NAME", Value::from("city")),
            ("REFERENCED_COLUMN_NAME", Value::from("id")),
        ]);
        let col = column_from_row(&row);
        assert_eq!(col.max_length, None);
        assert!(col.nullable);
        assert!(col.foreign_key);
        assert_eq!(col.referenced_table.as_deref(), Some("city"));
    }

    #[test]
    fn test_memory_reader_round_trip() {
        let schema = TableSchema::new("person").column(Column::new("id", "int").primary_key());
        let mut reader = MemorySchemaReader::new(vec![schema.clone()]);
        assert_eq!(reader.table_names().unwrap(), vec!["person"]);
        assert_eq!(reader.read_schema().unwrap(), vec![schema]);
        assert!(reader.columns("missing").is_err());
    }
}

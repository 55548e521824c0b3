//! SQL dialect differences.
//!
//! Everything that varies between vendors at the SQL text level lives here:
//! identifier quoting, paging, whether ORDER BY columns must be selected,
//! null-coalescing aggregates and the sequence lookups used by symbolic
//! defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Microsoft SQL Server.
    #[default]
    SqlServer,
    /// MySQL / MariaDB.
    MySql,
}

impl Dialect {
    /// Quote an identifier for this dialect, escaping the closing quote.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Paging clause for a 1-based `page` of `size` rows.
    ///
    /// Returns an empty string when `size` is zero.
    pub fn paging(self, size: u64, page: u64) -> String {
        if size == 0 {
            return String::new();
        }
        let offset = page.max(1).saturating_sub(1).saturating_mul(size);
        match self {
            Dialect::SqlServer => {
                format!("OFFSET {offset} ROWS\nFETCH FIRST {size} ROWS ONLY")
            }
            Dialect::MySql => format!("LIMIT {size} OFFSET {offset}"),
        }
    }

    /// SQL Server refuses ORDER BY on columns that are not in the select
    /// list of certain query shapes, so order expressions are selected too.
    pub fn requires_order_in_select(self) -> bool {
        matches!(self, Dialect::SqlServer)
    }

    /// Null-safe `MAX(expr)` evaluating to 0 on an empty table.
    pub fn max_or_zero(self, expr: &str) -> String {
        match self {
            Dialect::SqlServer => format!("CAST(ISNULL(MAX({expr}), 0) AS bigint)"),
            Dialect::MySql => format!("CAST(IFNULL(MAX({expr}), 0) AS SIGNED)"),
        }
    }

    /// Join expressions with a separator, skipping nulls.
    pub fn concat_ws(self, separator: &str, exprs: &[String]) -> String {
        let sep = separator.replace('\'', "''");
        format!("CONCAT_WS('{sep}', {})", exprs.join(", "))
    }

    /// Query returning the next identity value for a table.
    ///
    /// The table name is bound as `@table`; MySQL additionally needs the
    /// schema as `@db`.
    pub fn next_value_sql(self) -> &'static str {
        match self {
            Dialect::SqlServer => "SELECT CAST(IDENT_CURRENT(@table) + IDENT_INCR(@table) AS bigint)",
            Dialect::MySql => {
                "SELECT AUTO_INCREMENT FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = @db AND TABLE_NAME = @table"
            }
        }
    }

    /// Human-readable dialect name.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::SqlServer => "SQL Server",
            Dialect::MySql => "MySQL",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

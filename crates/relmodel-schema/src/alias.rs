//! Alias assignment for tables, fields and joins.
//!
//! An alias is the first `length` characters of a name with leading and
//! trailing separators removed. On collision the alias is shortened by one
//! character and suffixed with an increasing counter until it is free.

use relmodel_core::{Error, Result};
use std::collections::HashSet;

/// Default alias length for tables.
pub const TABLE_ALIAS_LENGTH: usize = 4;

/// Default alias length for fields and joins.
pub const FIELD_ALIAS_LENGTH: usize = 3;

const SEPARATOR: char = '_';

/// Words never handed out as aliases: short SQL keywords plus tokens the
/// query builder reserves for itself.
pub const RESERVED_WORDS: &[&str] = &[
    // SQL Server and MySQL keywords of up to four characters
    "add", "all", "alt", "and", "any", "as", "asc", "at", "both", "bulk", "by", "call",
    "case", "cast", "char", "col", "cube", "cur", "date", "day", "dbcc", "dec", "deny",
    "desc", "disk", "div", "do", "drop", "dual", "dump", "each", "else", "end", "exec",
    "exit", "file", "for", "from", "full", "get", "go", "goto", "if", "in", "int", "int1",
    "int2", "int3", "int4", "int8", "into", "is", "join", "key", "keys", "kill", "lag",
    "last", "lead", "left", "less", "like", "load", "lock", "long", "loop", "max", "min",
    "mod", "new", "next", "no", "not", "null", "of", "off", "on", "open", "or", "out",
    "over", "plan", "proc", "rank", "read", "real", "row", "rows", "rule", "save", "set",
    "show", "some", "sql", "ssl", "sum", "tab", "then", "to", "top", "tran", "true",
    "undo", "use", "user", "view", "when", "with", "xor", "year", "zone",
    // builder tokens
    "_id",
];

/// The set of aliases already taken in one namespace.
///
/// Comparison is ASCII case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct AliasPool {
    used: HashSet<String>,
}

impl AliasPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool seeded with [`RESERVED_WORDS`] and `extra`.
    pub fn with_reserved<S: AsRef<str>>(extra: &[S]) -> Self {
        let mut pool = Self::new();
        for word in RESERVED_WORDS {
            pool.reserve(word);
        }
        for word in extra {
            pool.reserve(word.as_ref());
        }
        pool
    }

    /// Mark an alias as taken.
    pub fn reserve(&mut self, alias: &str) {
        self.used.insert(alias.to_ascii_lowercase());
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.used.contains(&alias.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Compute a free alias for `name` and reserve it.
    pub fn assign(&mut self, name: &str, length: usize) -> Result<String> {
        let alias = get_alias(name, self, length)?;
        self.reserve(&alias);
        Ok(alias)
    }
}

/// Compute an alias for `name` that is not in `reserved`.
///
/// Fails when the name is empty after trimming or when no free alias
/// exists within the candidate space.
pub fn get_alias(name: &str, reserved: &AliasPool, length: usize) -> Result<String> {
    let trimmed = name.trim_matches(SEPARATOR);
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.is_empty() || length == 0 {
        return Err(Error::config(format!(
            "cannot derive an alias from '{name}'"
        )));
    }

    let length = length.min(chars.len());
    let mut alias: String = chars[..length].iter().collect();
    let base: String = chars[..length - 1].iter().collect();

    // One more candidate than there are taken aliases always finds a gap.
    let limit = reserved.len() + 1;
    let mut counter = 0usize;
    while reserved.contains(&alias) {
        counter += 1;
        if counter > limit {
            return Err(Error::config(format!(
                "alias space exhausted for '{name}'"
            )));
        }
        alias = format!("{base}{counter}");
    }
    Ok(alias)
}

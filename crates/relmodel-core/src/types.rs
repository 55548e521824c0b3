//! Semantic field types and the vendor type table.
//!
//! Vendor column types are mapped to a [`FieldType`] through [`TYPE_RULES`].
//! The mapping is total: a data type missing from the table is carried as
//! [`FieldType::Other`] with its raw name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Decimal,
    Bool,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    DateTime,
    Guid,
    Bytes,
    /// Opaque values that are never coerced.
    Object,
    /// Unrecognized vendor type, kept verbatim.
    Other(String),
}

impl FieldType {
    /// Stable textual name, used in snapshots and `type` checks.
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Decimal => "decimal",
            FieldType::Bool => "bool",
            FieldType::Byte => "byte",
            FieldType::Short => "short",
            FieldType::UShort => "ushort",
            FieldType::Int => "int",
            FieldType::UInt => "uint",
            FieldType::Long => "long",
            FieldType::ULong => "ulong",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::DateTime => "datetime",
            FieldType::Guid => "guid",
            FieldType::Bytes => "bytes",
            FieldType::Object => "object",
            FieldType::Other(raw) => raw,
        }
    }

    /// Parse a semantic type name. Unknown names become [`FieldType::Other`].
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "string" => FieldType::String,
            "decimal" => FieldType::Decimal,
            "bool" => FieldType::Bool,
            "byte" => FieldType::Byte,
            "short" => FieldType::Short,
            "ushort" => FieldType::UShort,
            "int" => FieldType::Int,
            "uint" => FieldType::UInt,
            "long" => FieldType::Long,
            "ulong" => FieldType::ULong,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "datetime" => FieldType::DateTime,
            "guid" => FieldType::Guid,
            "bytes" => FieldType::Bytes,
            "object" => FieldType::Object,
            _ => FieldType::Other(name.to_string()),
        }
    }

    /// Integer family, including `byte`.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Byte
                | FieldType::Short
                | FieldType::UShort
                | FieldType::Int
                | FieldType::UInt
                | FieldType::Long
                | FieldType::ULong
        )
    }

    /// Any numeric type.
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                FieldType::Decimal | FieldType::Float | FieldType::Double
            )
    }

    /// Map a vendor column type to its semantic type.
    ///
    /// `max_length` is the character or byte length reported by the schema,
    /// `unsigned` the MySQL unsigned flag.
    pub fn from_sql(data_type: &str, max_length: Option<u64>, unsigned: bool) -> Self {
        let lower = data_type.to_ascii_lowercase();
        let rule = TYPE_RULES
            .iter()
            .find(|(names, _)| names.contains(&lower.as_str()))
            .map(|(_, rule)| rule);

        match rule {
            Some(TypeRule::Fixed(ty)) => ty.to_owned_type(),
            Some(TypeRule::ByLength { one, other }) => {
                if max_length == Some(1) {
                    one.to_owned_type()
                } else {
                    other.to_owned_type()
                }
            }
            Some(TypeRule::BySign { signed, unsigned: u }) => {
                if unsigned {
                    u.to_owned_type()
                } else {
                    signed.to_owned_type()
                }
            }
            None => FieldType::Other(data_type.to_string()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        FieldType::parse(&value)
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// Vendor type table
// ============================================================================

/// Const-friendly mirror of the non-`Other` [`FieldType`] variants.
#[derive(Debug, Clone, Copy)]
pub enum Sem {
    String,
    Decimal,
    Bool,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    DateTime,
    Guid,
    Bytes,
    Object,
}

impl Sem {
    fn to_owned_type(self) -> FieldType {
        match self {
            Sem::String => FieldType::String,
            Sem::Decimal => FieldType::Decimal,
            Sem::Bool => FieldType::Bool,
            Sem::Byte => FieldType::Byte,
            Sem::Short => FieldType::Short,
            Sem::UShort => FieldType::UShort,
            Sem::Int => FieldType::Int,
            Sem::UInt => FieldType::UInt,
            Sem::Long => FieldType::Long,
            Sem::ULong => FieldType::ULong,
            Sem::Float => FieldType::Float,
            Sem::Double => FieldType::Double,
            Sem::DateTime => FieldType::DateTime,
            Sem::Guid => FieldType::Guid,
            Sem::Bytes => FieldType::Bytes,
            Sem::Object => FieldType::Object,
        }
    }
}

/// How a group of vendor types resolves.
#[derive(Debug, Clone, Copy)]
pub enum TypeRule {
    Fixed(Sem),
    /// Length 1 selects `one`.
    ByLength { one: Sem, other: Sem },
    /// MySQL unsigned flag selects `unsigned`.
    BySign { signed: Sem, unsigned: Sem },
}

/// Vendor data types (lowercase) and the rule that maps them.
pub const TYPE_RULES: &[(&[&str], TypeRule)] = &[
    (
        &["varbinary", "binary"],
        TypeRule::ByLength {
            one: Sem::Byte,
            other: Sem::Bytes,
        },
    ),
    (
        &["image", "rowversion", "blob", "longblob", "mediumblob", "tinyblob"],
        TypeRule::Fixed(Sem::Bytes),
    ),
    (
        &["money", "smallmoney", "numeric", "decimal"],
        TypeRule::Fixed(Sem::Decimal),
    ),
    (
        &[
            "varchar", "char", "nchar", "nvarchar", "text", "ntext", "mediumtext",
            "tinytext", "longtext", "enum", "set",
        ],
        TypeRule::Fixed(Sem::String),
    ),
    (&["real"], TypeRule::Fixed(Sem::Float)),
    (&["float", "double"], TypeRule::Fixed(Sem::Double)),
    (&["bit"], TypeRule::Fixed(Sem::Bool)),
    (
        &["datetime", "datetime2", "smalldatetime", "timestamp", "date", "time"],
        TypeRule::Fixed(Sem::DateTime),
    ),
    (
        &["smallint", "year"],
        TypeRule::BySign {
            signed: Sem::Short,
            unsigned: Sem::UShort,
        },
    ),
    (
        &["int", "mediumint"],
        TypeRule::BySign {
            signed: Sem::Int,
            unsigned: Sem::UInt,
        },
    ),
    (
        &["tinyint"],
        TypeRule::ByLength {
            one: Sem::Bool,
            other: Sem::Byte,
        },
    ),
    (
        &["bigint"],
        TypeRule::BySign {
            signed: Sem::Long,
            unsigned: Sem::ULong,
        },
    ),
    (&["uniqueidentifier"], TypeRule::Fixed(Sem::Guid)),
    (
        &["sql_variant", "table", "cursor", "xml"],
        TypeRule::Fixed(Sem::Object),
    ),
];

//! Database rows.

use crate::error::{Error, Result};
use crate::value::{FromValue, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single row returned from a query.
///
/// Column names are shared between the rows of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. Missing trailing values are padded with NULL.
    pub fn new(columns: Arc<Vec<String>>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(Arc::new(columns), values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Position of a column; exact match first, then ASCII case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index_of(name).map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed read of a named column.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .get(name)
            .ok_or_else(|| Error::usage(format!("column '{name}' not in result")))?;
        T::from_value(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Owned name/value map.
    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.columns.iter().cloned().zip(self.values).collect()
    }

    /// JSON object view, used to deserialize typed objects.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_index() {
        let row = Row::from_pairs([("id", Value::Int(1)), ("Email", Value::from("a@b.c"))]);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("email"), Some(&Value::from("a@b.c")));
        assert_eq!(row.get_index(1), row.get("Email"));
        assert!(row.get("missing").is_none());
        assert_eq!(row.get_as::<i64>("id").unwrap(), 1);
    }

    #[test]
    fn test_new_pads_missing_values() {
        let row = Row::new(Arc::new(vec!["a".into(), "b".into()]), vec![Value::Int(1)]);
        assert_eq!(row.get("b"), Some(&Value::Null));
    }

    #[test]
    fn test_to_json() {
        let row = Row::from_pairs([("n", Value::Long(2))]);
        assert_eq!(row.to_json(), serde_json::json!({ "n": 2 }));
    }
}

use std::fmt;
use std::sync::Arc;

use crate::native::types::Type;
use crate::native::values::{FromSql, Value};
use crate::{Error, FxIndexMap, Result};

/// Column names and types of a result, shared by every row it produces.
pub type Schema = Arc<[(String, Type)]>;

/// One decoded result row, in the column order the server returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Schema,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(schema: Schema, values: Vec<Value>) -> Self { Row { schema, values } }

    pub fn schema(&self) -> &[(String, Type)] { &self.schema }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|index| &self.values[index])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> { self.values.get(index) }

    /// Typed value of the column named `column`.
    ///
    /// # Errors
    /// [`Error::ColumnNotFound`] when there is no such column, otherwise the conversion error of
    /// [`FromSql::from_sql`], e.g. a `NULL` read into a non-`Option` type.
    pub fn try_get<T: FromSql>(&self, column: &str) -> Result<T> {
        let index = self.position(column).ok_or_else(|| Error::ColumnNotFound(column.into()))?;
        self.try_get_index(index)
    }

    /// Typed value of the column at `index`.
    ///
    /// # Errors
    /// See [`Row::try_get`].
    pub fn try_get_index<T: FromSql>(&self, index: usize) -> Result<T> {
        let (value, (_, type_)) = self
            .values
            .get(index)
            .zip(self.schema.get(index))
            .ok_or_else(|| Error::ColumnNotFound(format!("index {index}")))?;
        T::from_sql(type_, value.clone())
    }

    /// `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema.iter().map(|(name, _)| name.as_str()).zip(&self.values)
    }

    /// Keyed by column name. A later column with a repeated name replaces the earlier value.
    pub fn into_map(self) -> FxIndexMap<String, Value> {
        self.schema.iter().map(|(name, _)| name.clone()).zip(self.values).collect()
    }

    pub fn into_values(self) -> Vec<Value> { self.values }

    fn position(&self, column: &str) -> Option<usize> {
        self.schema.iter().position(|(name, _)| name == column)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Shape of the rows handed out by [`crate::ResultSet::fetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FetchMode {
    /// Keyed by column name.
    #[default]
    Assoc,
    /// Positional values.
    Num,
    /// Both of the above.
    Both,
}

/// A row in the shape requested by a [`FetchMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Assoc(FxIndexMap<String, Value>),
    Num(Vec<Value>),
    Both { values: Vec<Value>, map: FxIndexMap<String, Value> },
}

impl Row {
    pub fn fetch(self, mode: FetchMode) -> Fetched {
        match mode {
            FetchMode::Assoc => Fetched::Assoc(self.into_map()),
            FetchMode::Num => Fetched::Num(self.into_values()),
            FetchMode::Both => {
                let values = self.values.clone();
                Fetched::Both { values, map: self.into_map() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let schema: Schema = Arc::from(vec![
            ("id".to_string(), Type::UInt64),
            ("note".to_string(), Type::Nullable(Box::new(Type::String))),
        ]);
        Row::new(schema, vec![Value::UInt64(u64::MAX), Value::Null])
    }

    #[test]
    fn test_access_by_name_and_index() {
        let row = row();
        assert_eq!(row.get("id"), Some(&Value::UInt64(u64::MAX)));
        assert_eq!(row.get_index(1), Some(&Value::Null));
        assert_eq!(row.try_get::<u64>("id").unwrap(), u64::MAX);
        assert_eq!(row.try_get::<Option<String>>("note").unwrap(), None);
        assert!(matches!(row.try_get::<String>("note"), Err(Error::Decode(_))));
        assert!(matches!(row.try_get::<u64>("missing"), Err(Error::ColumnNotFound(_))));
        assert!(row.try_get_index::<u64>(5).is_err());
    }

    #[test]
    fn test_fetch_modes() {
        let Fetched::Assoc(map) = row().fetch(FetchMode::Assoc) else { panic!("assoc") };
        assert_eq!(map.keys().collect::<Vec<_>>(), ["id", "note"]);

        let Fetched::Num(values) = row().fetch(FetchMode::Num) else { panic!("num") };
        assert_eq!(values, vec![Value::UInt64(u64::MAX), Value::Null]);

        let Fetched::Both { values, map } = row().fetch(FetchMode::Both) else { panic!("both") };
        assert_eq!(values.len(), map.len());
    }

    #[test]
    fn test_display() {
        assert_eq!(row().to_string(), "{id: 18446744073709551615, note: NULL}");
    }
}

//! Insert batches built from positional or associative rows.
//!
//! A batch is validated when it is built and encoded into a [`Block`] only once the server has
//! answered the `INSERT` statement with the table's header, so every value is coerced to the type
//! the server actually declares for its column.
use chrono_tz::Tz;

use crate::native::block::{Block, BlockColumn};
use crate::native::types::Type;
use crate::native::values::Value;
use crate::{Error, FxIndexMap, Result};

/// A single input row.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRow {
    /// Values matched to an external column list by position.
    Positional(Vec<Value>),
    /// Values keyed by column name. Nullable columns may be left out.
    Associative(FxIndexMap<String, Value>),
}

impl InsertRow {
    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        InsertRow::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn associative<K: Into<String>, V: Into<Value>>(
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        InsertRow::Associative(values.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<Vec<Value>> for InsertRow {
    fn from(values: Vec<Value>) -> Self { InsertRow::Positional(values) }
}

impl From<FxIndexMap<String, Value>> for InsertRow {
    fn from(values: FxIndexMap<String, Value>) -> Self { InsertRow::Associative(values) }
}

/// Rows sent to the server in one `INSERT`.
///
/// Associative batches resolve the column set row by row, which costs an extra lookup per value
/// compared to positional batches.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertBatch {
    Positional { columns: Vec<String>, rows: Vec<Vec<Value>> },
    /// `columns` is the union of every row's keys, in first-seen order.
    Associative { columns: Vec<String>, rows: Vec<FxIndexMap<String, Value>> },
}

impl InsertBatch {
    /// Build a batch from an explicit column list and rows of the same length.
    ///
    /// # Errors
    /// Fails when there are no rows, a column name is empty or repeated, or a row's length
    /// differs from the number of columns.
    pub fn positional<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let columns = columns.into_iter().map(Into::into).collect::<Vec<String>>();
        validate_columns(&columns)?;
        if rows.is_empty() {
            return Err(Error::InvalidBatch("batch has no rows".into()));
        }
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len())
        {
            return Err(Error::InvalidBatch(format!(
                "row {index} has {} values, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(InsertBatch::Positional { columns, rows })
    }

    /// Build a batch from rows keyed by column name.
    ///
    /// # Errors
    /// Fails when there are no rows or the rows name no columns at all.
    pub fn associative(rows: Vec<FxIndexMap<String, Value>>) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InvalidBatch("batch has no rows".into()));
        }
        let mut seen = FxIndexMap::<&str, ()>::default();
        for key in rows.iter().flat_map(|row| row.keys()) {
            let _ = seen.insert(key.as_str(), ());
        }
        let columns = seen.into_keys().map(ToString::to_string).collect::<Vec<_>>();
        validate_columns(&columns)?;
        Ok(InsertBatch::Associative { columns, rows })
    }

    /// Resolve the batch mode once from a list of rows.
    ///
    /// # Errors
    /// Fails when positional and associative rows are mixed, when associative rows come with an
    /// explicit column list, when positional rows come without one, or on any validation error of
    /// [`InsertBatch::positional`] and [`InsertBatch::associative`].
    pub fn from_rows<S: Into<String>>(
        columns: Option<Vec<S>>,
        rows: Vec<InsertRow>,
    ) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::InvalidBatch("batch has no rows".into()));
        };

        match first {
            InsertRow::Positional(_) => {
                let columns = columns.ok_or_else(|| {
                    Error::InvalidBatch("positional rows require a column list".into())
                })?;
                let rows = rows
                    .into_iter()
                    .enumerate()
                    .map(|(index, row)| match row {
                        InsertRow::Positional(values) => Ok(values),
                        InsertRow::Associative(_) => Err(mixed(index)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::positional(columns, rows)
            }
            InsertRow::Associative(_) => {
                if columns.is_some() {
                    return Err(Error::InvalidBatch(
                        "associative rows carry their own column names".into(),
                    ));
                }
                let rows = rows
                    .into_iter()
                    .enumerate()
                    .map(|(index, row)| match row {
                        InsertRow::Associative(values) => Ok(values),
                        InsertRow::Positional(_) => Err(mixed(index)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::associative(rows)
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            InsertBatch::Positional { columns, .. } | InsertBatch::Associative { columns, .. } => {
                columns
            }
        }
    }

    /// Number of rows, reported back as the affected rows of the insert.
    pub fn len(&self) -> usize {
        match self {
            InsertBatch::Positional { rows, .. } => rows.len(),
            InsertBatch::Associative { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// The statement announcing this batch to the server.
    pub fn statement(&self, table: &str) -> String {
        let columns = self.columns().iter().map(|c| quote_identifier(c)).collect::<Vec<_>>();
        format!("INSERT INTO {table} ({}) VALUES", columns.join(", "))
    }

    /// Coerce every value to the type the server declared for its column.
    ///
    /// # Errors
    /// Fails with an encode error naming the row and column of the first value that does not fit,
    /// or of a required column missing from an associative row.
    pub(crate) fn encode(self, header: &[(String, Type)], tz: Tz) -> Result<Block> {
        let rows = self.len();
        let mut values = header.iter().map(|_| Vec::with_capacity(rows)).collect::<Vec<_>>();

        match self {
            InsertBatch::Positional { columns, rows } => {
                let slots = columns
                    .iter()
                    .map(|name| {
                        header.iter().position(|(n, _)| n == name).ok_or_else(|| {
                            Error::ColumnNotFound(format!("{name} is not in the insert header"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                if let Some((name, _)) =
                    header.iter().enumerate().find(|(i, _)| !slots.contains(i)).map(|(_, c)| c)
                {
                    return Err(Error::encode(format!("no values supplied for column '{name}'")));
                }

                for (index, row) in rows.into_iter().enumerate() {
                    for (value, &slot) in row.into_iter().zip(&slots) {
                        let (name, type_) = &header[slot];
                        values[slot].push(coerce(value, type_, tz, index, name)?);
                    }
                }
            }
            InsertBatch::Associative { rows, .. } => {
                for (index, mut row) in rows.into_iter().enumerate() {
                    for (slot, (name, type_)) in header.iter().enumerate() {
                        let value = match row.swap_remove(name) {
                            Some(value) => coerce(value, type_, tz, index, name)?,
                            None if type_.is_nullable() => Value::Null,
                            None => {
                                return Err(Error::encode(format!(
                                    "row {index} is missing required column '{name}' ({type_})"
                                )));
                            }
                        };
                        values[slot].push(value);
                    }
                    if let Some(extra) = row.keys().next() {
                        return Err(Error::ColumnNotFound(format!(
                            "{extra} (row {index}) is not in the insert header"
                        )));
                    }
                }
            }
        }

        let columns = header
            .iter()
            .zip(values)
            .map(|((name, type_), values)| BlockColumn {
                name: name.clone(),
                type_: type_.clone(),
                values,
            })
            .collect();
        Ok(Block { rows, columns, ..Block::default() })
    }
}

fn coerce(value: Value, type_: &Type, tz: Tz, row: usize, column: &str) -> Result<Value> {
    value.coerce_to_tz(type_, tz).map_err(|error| {
        let reason = match error {
            Error::Encode(message) => message,
            other => other.to_string(),
        };
        Error::encode(format!("row {row}, column '{column}': {reason}"))
    })
}

fn mixed(index: usize) -> Error {
    Error::InvalidBatch(format!("row {index} mixes positional and associative rows"))
}

fn validate_columns(columns: &[String]) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::InvalidBatch("batch has no columns".into()));
    }
    let mut seen = FxIndexMap::<&str, ()>::default();
    for column in columns {
        if column.is_empty() {
            return Err(Error::InvalidBatch("column names must not be empty".into()));
        }
        if seen.insert(column.as_str(), ()).is_some() {
            return Err(Error::InvalidBatch(format!("duplicate column '{column}'")));
        }
    }
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<(String, Type)> {
        vec![
            ("id".into(), Type::UInt64),
            ("name".into(), Type::String),
            ("key".into(), Type::FixedSizedString(2)),
            ("nullable_date".into(), Type::Nullable(Box::new(Type::Date))),
            ("nullable_fixed".into(), Type::Nullable(Box::new(Type::FixedSizedString(8)))),
        ]
    }

    fn positional_rows() -> Vec<Vec<Value>> {
        vec![
            vec![1.into(), "a".into(), "aa".into(), "2020-01-01".into(), "test1".into()],
            vec![2.into(), "b".into(), "bb".into(), Value::Null, "test2".into()],
            vec![3.into(), "c".into(), "cc".into(), "2020-01-03".into(), Value::Null],
        ]
    }

    fn columns() -> Vec<&'static str> { vec!["id", "name", "key", "nullable_date", "nullable_fixed"] }

    #[test]
    fn test_positional_validation() {
        assert!(InsertBatch::positional(columns(), positional_rows()).is_ok());
        assert!(matches!(
            InsertBatch::positional(columns(), vec![]),
            Err(Error::InvalidBatch(_))
        ));
        assert!(matches!(
            InsertBatch::positional(vec!["id", "id"], vec![vec![1.into(), 2.into()]]),
            Err(Error::InvalidBatch(_))
        ));
        let short = vec![vec![Value::from(1)]];
        let err = InsertBatch::positional(columns(), short).unwrap_err();
        assert_eq!(err.to_string(), "invalid insert batch: row 0 has 1 values, expected 5");
    }

    #[test]
    fn test_associative_columns_in_first_seen_order() {
        let rows = vec![
            FxIndexMap::from_iter([("b".to_string(), Value::from(1)), ("a".into(), 2.into())]),
            FxIndexMap::from_iter([("c".to_string(), Value::from(3)), ("a".into(), 4.into())]),
        ];
        let batch = InsertBatch::associative(rows).unwrap();
        assert_eq!(batch.columns(), ["b", "a", "c"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_mixed_rows_are_rejected() {
        let rows = vec![
            InsertRow::positional([1, 2]),
            InsertRow::associative([("a", 1), ("b", 2)]),
        ];
        let err = InsertBatch::from_rows(Some(vec!["a", "b"]), rows).unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Encode);

        let rows = vec![InsertRow::associative([("a", 1)])];
        assert!(InsertBatch::from_rows(Some(vec!["a"]), rows).is_err());
        assert!(InsertBatch::from_rows::<String>(None, vec![InsertRow::positional([1])]).is_err());
    }

    #[test]
    fn test_statement_quotes_columns() {
        let batch =
            InsertBatch::positional(["id", "odd`name"], vec![vec![1.into(), 2.into()]]).unwrap();
        assert_eq!(batch.statement("db.t"), "INSERT INTO db.t (`id`, `odd\\`name`) VALUES");
    }

    #[test]
    fn test_positional_encode() {
        let batch = InsertBatch::positional(columns(), positional_rows()).unwrap();
        let block = batch.encode(&header(), Tz::UTC).unwrap();
        assert_eq!(block.rows, 3);
        assert_eq!(block.columns[0].values, vec![
            Value::UInt64(1),
            Value::UInt64(2),
            Value::UInt64(3)
        ]);
        assert_eq!(block.columns[2].values[0], Value::FixedString(b"aa".to_vec()));
        assert_eq!(block.columns[3].values[1], Value::Null);
        assert_eq!(block.columns[4].values[0], Value::FixedString(b"test1\0\0\0".to_vec()));
        assert_eq!(block.columns[4].values[2], Value::Null);
    }

    #[test]
    fn test_positional_encode_follows_header_order() {
        let batch =
            InsertBatch::positional(["b", "a"], vec![vec![Value::from(1), "x".into()]]).unwrap();
        let header = vec![("a".to_string(), Type::String), ("b".to_string(), Type::Int32)];
        let block = batch.encode(&header, Tz::UTC).unwrap();
        assert_eq!(block.columns[0].values, vec![Value::string("x")]);
        assert_eq!(block.columns[1].values, vec![Value::Int32(1)]);
    }

    #[test]
    fn test_missing_nullable_column_is_null() {
        let explicit = InsertBatch::associative(vec![FxIndexMap::from_iter([
            ("id".to_string(), Value::from(7)),
            ("note".into(), Value::Null),
        ])])
        .unwrap();
        let omitted =
            InsertBatch::associative(vec![FxIndexMap::from_iter([("id".to_string(), 7.into())])])
                .unwrap();

        let header = vec![
            ("id".to_string(), Type::Int64),
            ("note".to_string(), Type::Nullable(Box::new(Type::String))),
        ];
        let explicit = explicit.encode(&header, Tz::UTC).unwrap();
        let omitted = omitted.encode(&header, Tz::UTC).unwrap();
        assert_eq!(explicit, omitted);
    }

    #[test]
    fn test_missing_required_column_fails() {
        let batch = InsertBatch::associative(vec![
            FxIndexMap::from_iter([("id".to_string(), Value::from(1)), ("n".into(), 1.into())]),
            FxIndexMap::from_iter([("n".to_string(), Value::from(2))]),
        ])
        .unwrap();
        let header = vec![("id".to_string(), Type::Int64), ("n".to_string(), Type::Int64)];
        let err = batch.encode(&header, Tz::UTC).unwrap_err();
        assert!(matches!(&err, Error::Encode(m) if m.contains("row 1") && m.contains("'id'")));
    }

    #[test]
    fn test_coercion_failure_names_row_and_column() {
        let batch = InsertBatch::positional(["v"], vec![
            vec![Value::from(1)],
            vec![Value::UInt64(1 << 63)],
        ])
        .unwrap();
        let header = vec![("v".to_string(), Type::Int64)];
        let err = batch.encode(&header, Tz::UTC).unwrap_err();
        let Error::Encode(message) = err else { panic!("expected encode error") };
        assert!(message.starts_with("row 1, column 'v':"), "{message}");
    }
}

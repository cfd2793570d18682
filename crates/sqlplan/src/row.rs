//! Result rows, typed mapping and type-erased records.

use crate::error::{PlanError, PlanResult};
use crate::value::{FromValue, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One result row: shared column names plus this row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> PlanResult<Self> {
        if columns.len() != values.len() {
            return Err(PlanError::Other(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Typed column access, returning [`PlanError::Decode`] on failure.
    pub fn try_get_column<T: FromValue>(&self, column: &str) -> PlanResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| PlanError::decode(column, "column not present in row"))?;
        T::from_value(value).map_err(|msg| PlanError::decode(column, msg))
    }
}

/// Trait for converting a result row into a Rust struct.
///
/// This trait should typically be derived using `#[derive(FromRow)]`.
///
/// # Example
///
/// ```ignore
/// use sqlplan::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     #[orm(column = "email_address")]
///     email: Option<String>,
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> PlanResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> PlanResult<Self> {
        Ok(row.clone())
    }
}

/// Column-name to position map for one table, built once per catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    names: Arc<[String]>,
    index: HashMap<String, usize>,
}

impl ColumnMap {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let names: Arc<[String]> = names.into_iter().collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A row decoded without a static record type.
///
/// Values are laid out in the table's declared column order. Columns the
/// query did not return read as [`Value::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    map: Arc<ColumnMap>,
    values: Vec<Value>,
}

impl Record {
    /// Decode `row` through `map`. A returned column the table does not
    /// declare is a decode error.
    pub fn decode(map: &Arc<ColumnMap>, row: &Row) -> PlanResult<Self> {
        let mut values = vec![Value::Null; map.len()];
        for (name, value) in row.columns().iter().zip(row.values()) {
            let idx = map
                .index_of(name)
                .ok_or_else(|| PlanError::decode(name.as_str(), "not a column of this table"))?;
            values[idx] = value.clone();
        }
        Ok(Self {
            map: Arc::clone(map),
            values,
        })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.map.index_of(column).map(|i| &self.values[i])
    }

    pub fn get_as<T: FromValue>(&self, column: &str) -> PlanResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| PlanError::decode(column, "unknown column"))?;
        T::from_value(value).map_err(|msg| PlanError::decode(column, msg))
    }

    pub fn columns(&self) -> &[String] {
        self.map.names()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

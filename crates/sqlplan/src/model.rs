//! Record-type metadata.
//!
//! A [`Model`] describes the table a record type maps to and its ordered
//! column list. It is normally produced by `#[derive(Model)]`; the metadata is
//! read once when a [`Catalog`](crate::Catalog) is built for the type.

use crate::row::FromRow;
use crate::value::Params;

/// Static description of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub nullable: bool,
    pub primary_key: bool,
    /// Filled in by the database (serial, defaults); skipped on insert.
    pub generated: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            nullable: false,
            primary_key: false,
            generated: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn generated(mut self) -> Self {
        self.generated = true;
        self
    }
}

/// A record type bound to one table.
///
/// # Example
///
/// ```ignore
/// use sqlplan::{FromRow, Model};
///
/// #[derive(Debug, FromRow, Model)]
/// #[orm(table = "users")]
/// struct User {
///     #[orm(id, generated)]
///     id: i64,
///     email: String,
///     name: Option<String>,
///     age: i32,
/// }
/// ```
pub trait Model: FromRow + Send + Sync + 'static {
    /// Table name, optionally schema-qualified.
    const TABLE: &'static str;

    /// Columns in declaration order.
    fn columns() -> &'static [ColumnDef];

    /// Column values of this record, keyed by column name.
    fn to_params(&self) -> Params;
}

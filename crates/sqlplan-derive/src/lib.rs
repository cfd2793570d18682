//! Derive macros for sqlplan
//!
//! Provides `#[derive(FromRow)]` and `#[derive(Model)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod common;
mod from_row;
mod model;

/// Derive `FromRow` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use sqlplan::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     username: String,
///     #[orm(column = "email_address")]
///     email: Option<String>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Read the field from a differently named column
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `Model` metadata for a struct.
///
/// # Example
///
/// ```ignore
/// use sqlplan::{FromRow, Model};
///
/// #[derive(FromRow, Model)]
/// #[orm(table = "users")]
/// struct User {
///     #[orm(id, generated)]
///     id: i64,
///     username: String,
///     email: Option<String>,
/// }
/// ```
///
/// # Generated
///
/// - `impl sqlplan::Model`: `TABLE`, `columns()` and `to_params()`
/// - `COL_*: &'static str` - Column name constants
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name, optionally schema-qualified (required)
/// - `#[orm(id)]` - Primary-key column
/// - `#[orm(generated)]` - Filled in by the database; left out of inserts
/// - `#[orm(column = "name")]` - Map the field to a different column name
///
/// `Option<T>` fields are nullable columns.
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

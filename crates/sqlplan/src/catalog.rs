//! Schema catalog and validated name tokens.
//!
//! Builders never hold raw strings for tables, fields or parameters. Every
//! name passes through a [`SchemaCatalog`], which hands back an opaque token
//! stamped with the catalog's [`CatalogId`]. The renderer refuses tokens
//! issued by a different catalog than the plan's table.

use crate::ident::{self, Ident};
use crate::model::{ColumnDef, Model};
use crate::row::ColumnMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one catalog instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatalogId(u64);

impl CatalogId {
    /// Allocate a fresh id. Custom [`SchemaCatalog`] implementations call this
    /// once at construction.
    pub fn next() -> Self {
        Self(NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog#{}", self.0)
    }
}

/// Name resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown table '{name}' (catalog serves '{expected}')")]
    UnknownTable { name: String, expected: String },

    #[error("unknown field '{name}' on table '{table}'")]
    UnknownField { name: String, table: String },

    #[error("invalid parameter name '{name}'")]
    InvalidParamName { name: String },

    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },
}

impl CatalogError {
    /// The offending input name.
    pub fn name(&self) -> &str {
        match self {
            CatalogError::UnknownTable { name, .. }
            | CatalogError::UnknownField { name, .. }
            | CatalogError::InvalidParamName { name }
            | CatalogError::InvalidIdentifier { name, .. } => name,
        }
    }

    /// `true` when the name was well-formed but not found.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            CatalogError::UnknownTable { .. } | CatalogError::UnknownField { .. }
        )
    }
}

/// Validated table token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    catalog: CatalogId,
    ident: Ident,
}

impl TableRef {
    /// Issue a token. Only [`SchemaCatalog`] implementations should call this.
    pub fn issue(catalog: CatalogId, ident: Ident) -> Self {
        Self { catalog, ident }
    }

    pub fn catalog(&self) -> CatalogId {
        self.catalog
    }

    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// Dotted table name as declared.
    pub fn name(&self) -> String {
        self.ident.as_dotted()
    }
}

/// Validated column token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    catalog: CatalogId,
    name: String,
}

impl FieldRef {
    /// Issue a token. Only [`SchemaCatalog`] implementations should call this.
    pub fn issue(catalog: CatalogId, name: impl Into<String>) -> Self {
        Self {
            catalog,
            name: name.into(),
        }
    }

    pub fn catalog(&self) -> CatalogId {
        self.catalog
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Validated parameter-name token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef {
    catalog: CatalogId,
    name: String,
}

impl ParamRef {
    /// Issue a token. Only [`SchemaCatalog`] implementations should call this.
    pub fn issue(catalog: CatalogId, name: impl Into<String>) -> Self {
        Self {
            catalog,
            name: name.into(),
        }
    }

    pub fn catalog(&self) -> CatalogId {
        self.catalog
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same parameter moved into a namespace (`q1_` + `id` = `q1_id`).
    pub(crate) fn prefixed(&self, prefix: &str) -> ParamRef {
        ParamRef {
            catalog: self.catalog,
            name: format!("{prefix}{}", self.name),
        }
    }
}

/// Resolves names for one table into validated tokens.
///
/// Implementations are built once and shared read-only across every builder
/// for that table.
pub trait SchemaCatalog: Send + Sync + fmt::Debug {
    fn id(&self) -> CatalogId;

    /// The table this catalog serves.
    fn table(&self) -> TableRef;

    fn resolve_table(&self, name: &str) -> Result<TableRef, CatalogError>;

    fn resolve_field(&self, name: &str) -> Result<FieldRef, CatalogError>;

    fn resolve_param(&self, name: &str) -> Result<ParamRef, CatalogError>;

    /// Every column in declaration order.
    fn fields(&self) -> Vec<FieldRef>;

    /// Columns that take a value on insert (generated columns excluded).
    fn insertable_fields(&self) -> Vec<FieldRef>;

    /// Primary-key columns in declaration order.
    fn primary_key(&self) -> Vec<FieldRef>;

    /// Column-index map used to decode type-erased records.
    fn column_map(&self) -> Arc<ColumnMap>;
}

/// Owned column description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub generated: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            primary_key: false,
            generated: false,
        }
    }
}

impl From<&ColumnDef> for Column {
    fn from(def: &ColumnDef) -> Self {
        Self {
            name: def.name.to_string(),
            nullable: def.nullable,
            primary_key: def.primary_key,
            generated: def.generated,
        }
    }
}

/// In-memory catalog for a single table.
#[derive(Debug)]
pub struct Catalog {
    id: CatalogId,
    table: Ident,
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    column_map: Arc<ColumnMap>,
}

impl Catalog {
    /// Build a catalog, validating every identifier up front.
    pub fn new(
        table: &str,
        columns: impl IntoIterator<Item = Column>,
    ) -> Result<Self, CatalogError> {
        let table = Ident::parse(table)?;
        let columns: Vec<Column> = columns.into_iter().collect();

        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            let parsed = Ident::parse(&col.name)?;
            if parsed.as_dotted() != parsed.name() {
                return Err(CatalogError::InvalidIdentifier {
                    name: col.name.clone(),
                    reason: "column names cannot be qualified".to_string(),
                });
            }
            if by_name.insert(col.name.clone(), i).is_some() {
                return Err(CatalogError::InvalidIdentifier {
                    name: col.name.clone(),
                    reason: "duplicate column".to_string(),
                });
            }
        }

        let column_map = Arc::new(ColumnMap::new(columns.iter().map(|c| c.name.clone())));

        Ok(Self {
            id: CatalogId::next(),
            table,
            columns,
            by_name,
            column_map,
        })
    }

    /// Build a catalog from a record type's derived metadata.
    pub fn for_model<T: Model>() -> Result<Self, CatalogError> {
        Self::new(T::TABLE, T::columns().iter().map(Column::from))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    fn tokens<'a>(&'a self, cols: impl Iterator<Item = &'a Column>) -> Vec<FieldRef> {
        cols.map(|c| FieldRef::issue(self.id, c.name.clone()))
            .collect()
    }
}

impl SchemaCatalog for Catalog {
    fn id(&self) -> CatalogId {
        self.id
    }

    fn table(&self) -> TableRef {
        TableRef::issue(self.id, self.table.clone())
    }

    fn resolve_table(&self, name: &str) -> Result<TableRef, CatalogError> {
        if name == self.table.as_dotted() || name == self.table.name() {
            Ok(self.table())
        } else {
            Err(CatalogError::UnknownTable {
                name: name.to_string(),
                expected: self.table.as_dotted(),
            })
        }
    }

    fn resolve_field(&self, name: &str) -> Result<FieldRef, CatalogError> {
        // Accept `col` and `table.col` / `schema.table.col` for this table.
        let bare = match name.rsplit_once('.') {
            Some((qualifier, col))
                if qualifier == self.table.as_dotted() || qualifier == self.table.name() =>
            {
                col
            }
            _ => name,
        };
        match self.by_name.get(bare) {
            Some(&i) => Ok(FieldRef::issue(self.id, self.columns[i].name.clone())),
            None => Err(CatalogError::UnknownField {
                name: name.to_string(),
                table: self.table.as_dotted(),
            }),
        }
    }

    fn resolve_param(&self, name: &str) -> Result<ParamRef, CatalogError> {
        if ident::is_param_name(name) {
            Ok(ParamRef::issue(self.id, name))
        } else {
            Err(CatalogError::InvalidParamName {
                name: name.to_string(),
            })
        }
    }

    fn fields(&self) -> Vec<FieldRef> {
        self.tokens(self.columns.iter())
    }

    fn insertable_fields(&self) -> Vec<FieldRef> {
        self.tokens(self.columns.iter().filter(|c| !c.generated))
    }

    fn primary_key(&self) -> Vec<FieldRef> {
        self.tokens(self.columns.iter().filter(|c| c.primary_key))
    }

    fn column_map(&self) -> Arc<ColumnMap> {
        Arc::clone(&self.column_map)
    }
}

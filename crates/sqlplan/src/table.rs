//! Entry point: one catalog and renderer per record type.

use crate::catalog::{Catalog, SchemaCatalog};
use crate::config::TableConfig;
use crate::error::{BuilderKind, PlanResult};
use crate::model::Model;
use crate::plan::QueryKind;
use crate::qb::{AggregateQb, CompoundQb, DeleteQb, InsertQb, QbCore, SelectQb, UpdateQb};
use crate::render::{Dialect, Renderer, SqlRenderer};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Builder factory for the table behind `T`.
///
/// Build one per record type at startup and share it; cloning is cheap.
///
/// ```ignore
/// let users = Table::<User>::new(Dialect::Postgres)?;
///
/// let adults: Vec<User> = users
///     .select()
///     .where_("age", ">=", "min_age")
///     .bind("min_age", 18)
///     .fetch_all(&client)
///     .await?;
/// ```
pub struct Table<T> {
    catalog: Arc<dyn SchemaCatalog>,
    renderer: Arc<dyn Renderer>,
    config: TableConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            renderer: Arc::clone(&self.renderer),
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("catalog", &self.catalog)
            .field("renderer", &self.renderer)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Model> Table<T> {
    /// Derive the catalog from `T` and render for `dialect`.
    pub fn new(dialect: Dialect) -> PlanResult<Self> {
        let catalog = Catalog::for_model::<T>()?;
        Ok(Self::from_parts(
            Arc::new(catalog),
            Arc::new(SqlRenderer::new(dialect)),
        ))
    }

    pub fn postgres() -> PlanResult<Self> {
        Self::new(Dialect::Postgres)
    }
}

impl<T> Table<T> {
    /// Use a caller-supplied catalog and renderer.
    pub fn from_parts(catalog: Arc<dyn SchemaCatalog>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            catalog,
            renderer,
            config: TableConfig::default(),
            _marker: PhantomData,
        }
    }

    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.renderer.dialect()
    }

    fn core(&self, kind: BuilderKind, query: QueryKind) -> QbCore {
        QbCore::new(
            kind,
            query,
            Arc::clone(&self.catalog),
            Arc::clone(&self.renderer),
            self.config.clone(),
        )
    }

    pub fn select(&self) -> SelectQb<T> {
        SelectQb::new(self.core(BuilderKind::Select, QueryKind::Select))
    }

    pub fn insert(&self) -> InsertQb<T> {
        InsertQb::new(self.core(BuilderKind::Insert, QueryKind::Insert))
    }

    pub fn update(&self) -> UpdateQb<T> {
        UpdateQb::new(self.core(BuilderKind::Update, QueryKind::Update))
    }

    pub fn delete(&self) -> DeleteQb<T> {
        DeleteQb::new(self.core(BuilderKind::Delete, QueryKind::Delete))
    }

    pub fn aggregate(&self) -> AggregateQb<T> {
        AggregateQb::new(self.core(BuilderKind::Aggregate, QueryKind::Select))
    }

    /// An empty compound; rendering it before adding an operand fails.
    pub fn compound(&self) -> CompoundQb<T> {
        CompoundQb::empty()
    }
}

//! # sqlplan
//!
//! Validated, fluent query plans over a schema catalog.
//!
//! ## Features
//!
//! - **Deferred errors**: builder chains never fail halfway; the first bad
//!   field, operator or parameter name surfaces from `render`/`fetch_*`
//! - **Catalog-checked names**: every field and parameter is resolved against
//!   the record type's catalog before it reaches the plan
//! - **Compound queries**: UNION/INTERSECT/EXCEPT with per-operand parameter
//!   namespacing (`q0_`, `q1_`, ...)
//! - **Capability-gated upsert**: native `ON CONFLICT` where the dialect has
//!   it, UPDATE-then-INSERT elsewhere
//! - **Safe defaults**: UPDATE and DELETE refuse to render without WHERE
//! - **Query monitoring**: timing, slow-query detection and timeouts via
//!   [`InstrumentedExecutor`]
//!
//! ## Usage
//!
//! ```ignore
//! use sqlplan::prelude::*;
//!
//! #[derive(Debug, FromRow, Model)]
//! #[orm(table = "users")]
//! struct User {
//!     #[orm(id, generated)]
//!     id: i64,
//!     email: String,
//!     name: Option<String>,
//!     age: i32,
//! }
//!
//! let users = Table::<User>::postgres()?;
//!
//! // SELECT
//! let adults = users
//!     .select()
//!     .where_("age", ">=", "min_age")
//!     .order_by("name", "asc")
//!     .bind("min_age", 18)
//!     .fetch_all(&client)
//!     .await?;
//!
//! // INSERT ... ON CONFLICT
//! let saved = users
//!     .insert()
//!     .record(&user)
//!     .on_conflict_update(&["email"], &["name", "age"])
//!     .upsert(&client)
//!     .await?;
//!
//! // DELETE
//! users
//!     .delete()
//!     .where_("id", "=", "id")
//!     .bind("id", saved.id)
//!     .execute(&client)
//!     .await?;
//! ```

pub mod catalog;
pub mod condition;
pub mod config;
pub mod error;
pub mod exec;
pub mod ident;
pub mod model;
pub mod monitor;
pub mod plan;
pub mod postgres;
pub mod prelude;
pub mod qb;
pub mod render;
pub mod row;
pub mod table;
pub mod value;

#[doc(hidden)]
pub mod testing;

pub use catalog::{
    Catalog, CatalogError, CatalogId, Column, FieldRef, ParamRef, SchemaCatalog, TableRef,
};
pub use condition::{AggregateFn, Condition, Filter, Operator};
pub use config::{TableConfig, UpsertFallback};
pub use error::{
    BuilderKind, PlanError, PlanResult, QueryPhase, ValidationError, ValidationKind,
};
pub use exec::Executor;
pub use ident::Ident;
pub use model::{ColumnDef, Model};
pub use monitor::{
    CompositeMonitor, InstrumentedExecutor, MonitorConfig, NoopMonitor, QueryContext,
    QueryMonitor, QueryResult, QueryStats, StatsMonitor, TracingMonitor,
};
pub use plan::{
    Bound, CompoundPlan, ConflictResolution, ConflictSpec, Direction, Distinct, Frame,
    FrameBound, LockMode, NullsOrder, OrderTarget, OrderTerm, QueryKind, QueryPlan, Returning,
    SelectItem, SetOperator, WindowExpr, WindowFn,
};
pub use postgres::to_positional;
pub use qb::{
    AggregateQb, CompoundQb, DeleteQb, InsertQb, PlanQb, SelectQb, UpdateQb, WhereQb, WindowQb,
};
pub use render::{Capabilities, Dialect, RenderError, RenderedQuery, Renderer, SqlRenderer};
pub use row::{ColumnMap, FromRow, Record, Row};
pub use table::Table;
pub use value::{FromValue, Params, ToValue, Value};

#[cfg(feature = "derive")]
pub use sqlplan_derive::{FromRow, Model};

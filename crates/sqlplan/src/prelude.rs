//! Convenient imports for typical `sqlplan` usage.
//!
//! ```ignore
//! use sqlplan::prelude::*;
//! ```

pub use crate::{
    Dialect, Executor, Filter, FromRow, Model, Params, PlanError, PlanQb, PlanResult, Table,
    TableConfig, Value, WhereQb, params,
};

pub use crate::{InstrumentedExecutor, MonitorConfig, TracingMonitor};

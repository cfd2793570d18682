//! Statement monitoring and timeouts.
//!
//! [`InstrumentedExecutor`] wraps any [`Executor`](crate::Executor) and
//! reports the start, completion or failure of every statement to a
//! [`QueryMonitor`]. Monitors observe only; they never change what runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlplan::monitor::{CompositeMonitor, InstrumentedExecutor, MonitorConfig, StatsMonitor, TracingMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let stats = Arc::new(StatsMonitor::new());
//! let exec = InstrumentedExecutor::new(client)
//!     .with_config(
//!         MonitorConfig::new()
//!             .with_query_timeout(Duration::from_secs(30))
//!             .with_slow_query_threshold(Duration::from_millis(500))
//!             .enable_monitoring(),
//!     )
//!     .with_monitor(CompositeMonitor::new().add(TracingMonitor::new()).add_arc(stats.clone()));
//!
//! let adults = users.select().where_("age", ">=", "min_age").bind("min_age", 18).fetch_all(&exec).await?;
//! println!("{:?}", stats.stats());
//! ```

mod config;
mod instrumented;
mod monitors;
mod tracing_monitor;
mod types;

#[cfg(test)]
mod tests;

pub use config::MonitorConfig;
pub use instrumented::InstrumentedExecutor;
pub use monitors::{CompositeMonitor, NoopMonitor, QueryStats, StatsMonitor};
pub use tracing_monitor::TracingMonitor;
pub use types::{QueryContext, QueryMonitor, QueryResult};

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

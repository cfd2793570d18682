use super::truncate_sql_bytes;
use super::types::{QueryContext, QueryMonitor, QueryResult};
use crate::error::PlanError;
use std::time::Duration;
use tracing::Level;

/// A `tracing`-based monitor.
///
/// Emits the rendered SQL under target `sqlplan.sql` when a statement starts,
/// its outcome when it finishes, and a WARN event for slow or failed
/// statements.
#[derive(Debug, Clone)]
pub struct TracingMonitor {
    /// Level for start/complete events. Slow and failed statements always
    /// log at WARN.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingMonitor {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

impl TracingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryMonitor for TracingMonitor {
    fn on_query_start(&self, ctx: &QueryContext) {
        let tag = ctx.tag.as_deref().unwrap_or("-");
        emit_at_level!(
            self.level,
            target: "sqlplan.sql",
            table = %ctx.table,
            kind = %ctx.kind,
            tag,
            param_count = ctx.param_count,
            sql = %self.truncate_sql(&ctx.sql),
        );
    }

    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        let tag = ctx.tag.as_deref().unwrap_or("-");
        emit_at_level!(
            self.level,
            target: "sqlplan.sql",
            table = %ctx.table,
            kind = %ctx.kind,
            tag,
            ?duration,
            result = %result,
            "statement completed",
        );
    }

    fn on_query_failed(&self, ctx: &QueryContext, duration: Duration, error: &PlanError) {
        tracing::warn!(
            target: "sqlplan.sql",
            table = %ctx.table,
            kind = %ctx.kind,
            tag = ctx.tag.as_deref().unwrap_or("-"),
            ?duration,
            error = %error,
            sql = %self.truncate_sql(&ctx.sql),
            "statement failed",
        );
    }

    fn on_slow_query(&self, ctx: &QueryContext, duration: Duration) {
        tracing::warn!(
            target: "sqlplan.sql",
            table = %ctx.table,
            kind = %ctx.kind,
            ?duration,
            sql = %self.truncate_sql(&ctx.sql),
            "slow statement",
        );
    }
}

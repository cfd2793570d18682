use crate::error::PlanError;
use crate::plan::QueryKind;
use crate::render::RenderedQuery;
use std::fmt;
use std::time::Duration;

/// What a monitor knows about the statement being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    /// Target table of the plan that produced the statement.
    pub table: String,
    pub kind: QueryKind,
    /// Rendered SQL with `:name` placeholders.
    pub sql: String,
    pub param_count: usize,
    /// Optional query name/tag for identification.
    pub tag: Option<String>,
}

impl QueryContext {
    pub fn new(query: &RenderedQuery) -> Self {
        Self {
            table: query.table.clone(),
            kind: query.kind,
            sql: query.sql.clone(),
            param_count: query.params.len(),
            tag: None,
        }
    }

    /// Add a tag to identify this query.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Outcome of a successful statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Rows returned by a query.
    Rows(usize),
    /// Rows affected by a statement.
    Affected(u64),
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(n) => write!(f, "{n} rows"),
            QueryResult::Affected(n) => write!(f, "{n} affected"),
        }
    }
}

/// Receives lifecycle events for executed statements.
///
/// Monitors observe; they cannot alter or abort a statement. Every method
/// except [`QueryMonitor::on_query_complete`] has an empty default.
pub trait QueryMonitor: Send + Sync {
    /// Called before the statement is sent.
    fn on_query_start(&self, _ctx: &QueryContext) {}

    /// Called after the statement succeeds.
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult);

    /// Called when the statement fails, including timeouts.
    fn on_query_failed(&self, _ctx: &QueryContext, _duration: Duration, _error: &PlanError) {}

    /// Called after completion or failure when the duration exceeds the
    /// configured slow-query threshold.
    fn on_slow_query(&self, _ctx: &QueryContext, _duration: Duration) {}
}

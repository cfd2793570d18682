//! Executor trait and the shared render → execute → scan core.
//!
//! Every typed fetch in the crate goes through [`run_query`], parameterized by
//! the row-to-value strategy. Batch execution goes through [`run_batch`].

use crate::error::{PlanError, PlanResult, QueryPhase};
use crate::render::RenderedQuery;
use crate::row::Row;
use crate::value::Params;
use std::future::Future;

/// A connection-like handle that runs named-parameter SQL.
///
/// Implemented for `tokio_postgres::Client`, `tokio_postgres::Transaction`,
/// pooled clients and references to any of them, so a transaction can be used
/// wherever a bare connection is accepted.
pub trait Executor: Send + Sync {
    /// Run a row-returning statement.
    fn query(
        &self,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<Vec<Row>>> + Send;

    /// Run a statement and return the affected-row count.
    fn execute(
        &self,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<u64>> + Send;

    /// Run a row-returning statement, associating a tag for monitoring.
    ///
    /// The default implementation ignores `tag` and calls [`Executor::query`].
    fn query_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<Vec<Row>>> + Send {
        let _ = tag;
        self.query(query, params)
    }

    /// Run a statement, associating a tag for monitoring.
    ///
    /// The default implementation ignores `tag` and calls [`Executor::execute`].
    fn execute_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<u64>> + Send {
        let _ = tag;
        self.execute(query, params)
    }

    /// Token for best-effort server-side cancellation, if the handle has one.
    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        None
    }
}

impl<E: Executor> Executor for &E {
    fn query(
        &self,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<Vec<Row>>> + Send {
        (**self).query(query, params)
    }

    fn execute(
        &self,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<u64>> + Send {
        (**self).execute(query, params)
    }

    fn query_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<Vec<Row>>> + Send {
        (**self).query_tagged(tag, query, params)
    }

    fn execute_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> impl Future<Output = PlanResult<u64>> + Send {
        (**self).execute_tagged(tag, query, params)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        (**self).cancel_token()
    }
}

/// How many rows a fetch accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cardinality {
    /// Exactly one: zero is `NotFound`, more is `MultipleRows`.
    One,
    /// Zero or one.
    AtMostOne,
    Many,
}

/// Fail before the round trip if the query references an unbound name.
pub(crate) fn check_bound(
    operation: &str,
    query: &RenderedQuery,
    params: &Params,
) -> PlanResult<()> {
    params
        .ordered(&query.params)
        .map(|_| ())
        .map_err(|e| PlanError::query(QueryPhase::Render, operation, e))
}

/// Execute `query`, enforce `cardinality`, then materialize every row.
///
/// Scanning stops at the first row `materialize` rejects; rows scanned before
/// it are dropped.
pub(crate) async fn run_query<E, T, F>(
    exec: &E,
    operation: &str,
    tag: Option<&str>,
    query: &RenderedQuery,
    params: &Params,
    cardinality: Cardinality,
    mut materialize: F,
) -> PlanResult<Vec<T>>
where
    E: Executor,
    F: FnMut(&Row) -> PlanResult<T>,
{
    check_bound(operation, query, params)?;

    // Adapters decode cells while collecting rows; those failures are scan
    // failures even though they surface from the executor.
    let rows = match tag {
        Some(tag) => exec.query_tagged(tag, query, params).await,
        None => exec.query(query, params).await,
    }
    .map_err(|e| {
        let phase = match e.root() {
            PlanError::Decode { .. } => QueryPhase::Scan,
            _ => QueryPhase::Execution,
        };
        PlanError::query(phase, operation, e)
    })?;

    match (cardinality, rows.len()) {
        (Cardinality::One, 0) => {
            return Err(PlanError::not_found(format!(
                "{} on \"{}\" returned no rows",
                query.kind, query.table
            )));
        }
        (Cardinality::One | Cardinality::AtMostOne, got) if got > 1 => {
            return Err(PlanError::MultipleRows { got });
        }
        _ => {}
    }

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let item = materialize(row).map_err(|e| PlanError::query(QueryPhase::Scan, operation, e))?;
        out.push(item);
    }
    Ok(out)
}

/// Execute a statement once and return the affected-row count.
pub(crate) async fn run_execute<E: Executor>(
    exec: &E,
    operation: &str,
    tag: Option<&str>,
    query: &RenderedQuery,
    params: &Params,
) -> PlanResult<u64> {
    check_bound(operation, query, params)?;
    match tag {
        Some(tag) => exec.execute_tagged(tag, query, params).await,
        None => exec.execute(query, params).await,
    }
    .map_err(|e| PlanError::query(QueryPhase::Execution, operation, e))
}

/// Execute `query` once per parameter set, in order, stopping at the first
/// failure.
///
/// On failure the error is [`PlanError::PartialBatch`] carrying the rows
/// affected by the records that succeeded and the failing record's index.
pub(crate) async fn run_batch<E, I>(
    exec: &E,
    tag: Option<&str>,
    query: &RenderedQuery,
    records: I,
) -> PlanResult<u64>
where
    E: Executor,
    I: IntoIterator<Item = Params>,
{
    let mut affected = 0u64;
    for (index, params) in records.into_iter().enumerate() {
        match run_execute(exec, "execute_batch", tag, query, &params).await {
            Ok(n) => {
                affected += n;
                tracing::trace!(target: "sqlplan.exec", index, affected, "batch record applied");
            }
            Err(e) => {
                tracing::debug!(target: "sqlplan.exec", index, affected, error = %e, "batch stopped");
                return Err(PlanError::PartialBatch {
                    affected,
                    failed_at: index,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::QueryKind;
    use crate::testing::MockExecutor;
    use crate::value::Value;
    use std::sync::Arc;

    fn query(sql: &str, params: &[&str]) -> RenderedQuery {
        RenderedQuery {
            sql: sql.to_string(),
            params: params.iter().map(|s| s.to_string()).collect(),
            table: "users".to_string(),
            kind: QueryKind::Select,
        }
    }

    fn int_row(v: i64) -> Row {
        let cols: Arc<[String]> = vec!["id".to_string()].into();
        Row::new(cols, vec![Value::Int(v)]).unwrap()
    }

    fn id_of(row: &Row) -> PlanResult<i64> {
        row.try_get_column("id")
    }

    #[tokio::test]
    async fn one_requires_exactly_one_row() {
        let q = query("SELECT 1", &[]);
        let p = Params::new();

        let mock = MockExecutor::new();
        let err = run_query(&mock, "fetch_one", None, &q, &p, Cardinality::One, id_of)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let mock = MockExecutor::new().with_rows(vec![int_row(1), int_row(2)]);
        let err = run_query(&mock, "fetch_one", None, &q, &p, Cardinality::One, id_of)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::MultipleRows { got: 2 }));

        let mock = MockExecutor::new();
        let none = run_query(&mock, "fetch_opt", None, &q, &p, Cardinality::AtMostOne, id_of)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn scan_stops_at_first_bad_row() {
        let q = query("SELECT id FROM users", &[]);
        let bad = Row::new(vec!["id".to_string()].into(), vec![Value::Text("x".into())]).unwrap();
        let mock = MockExecutor::new().with_rows(vec![int_row(1), bad, int_row(3)]);
        let err = run_query(&mock, "fetch_all", None, &q, &Params::new(), Cardinality::Many, id_of)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(QueryPhase::Scan));
        assert!(matches!(err.root(), PlanError::Decode { .. }));
    }

    #[tokio::test]
    async fn adapter_decode_failure_is_a_scan_failure() {
        let q = query("SELECT created FROM users", &[]);
        let mock = MockExecutor::new()
            .with_error(PlanError::decode("created", "unsupported column type numeric"));
        let err = run_query(&mock, "fetch_all", None, &q, &Params::new(), Cardinality::Many, id_of)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(QueryPhase::Scan));

        let mock = MockExecutor::new().with_error(PlanError::UniqueViolation("k".into()));
        let err = run_query(&mock, "fetch_all", None, &q, &Params::new(), Cardinality::Many, id_of)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(QueryPhase::Execution));
    }

    #[tokio::test]
    async fn unbound_param_fails_before_round_trip() {
        let q = query("SELECT * FROM users WHERE id = :id", &["id"]);
        let mock = MockExecutor::new();
        let err = run_execute(&mock, "execute", None, &q, &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err.root(), PlanError::MissingParam(n) if n == "id"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_reports_partial_count() {
        let q = query("INSERT INTO users (name) VALUES (:name)", &["name"]);
        let mock = MockExecutor::new()
            .with_affected(1)
            .with_affected(1)
            .with_error(PlanError::UniqueViolation("users_name_key".into()));
        let records = ["a", "b", "c", "d"]
            .into_iter()
            .map(|n| Params::new().with("name", n));
        let err = run_batch(&mock, None, &q, records).await.unwrap_err();
        match err {
            PlanError::PartialBatch {
                affected,
                failed_at,
                source,
            } => {
                assert_eq!(affected, 2);
                assert_eq!(failed_at, 2);
                assert!(source.is_unique_violation());
            }
            other => panic!("expected PartialBatch, got {other:?}"),
        }
        // Record 3 was never attempted.
        assert_eq!(mock.calls().len(), 3);
    }
}

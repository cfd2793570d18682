use super::config::MonitorConfig;
use super::monitors::NoopMonitor;
use super::types::{QueryContext, QueryMonitor, QueryResult};
use crate::error::{PlanError, PlanResult};
use crate::exec::Executor;
use crate::render::RenderedQuery;
use crate::row::Row;
use crate::value::Params;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An [`Executor`] wrapper that reports every statement to a [`QueryMonitor`]
/// and enforces the configured round-trip deadline.
///
/// Monitoring must be explicitly enabled via
/// [`MonitorConfig::enable_monitoring`]; the timeout applies either way.
pub struct InstrumentedExecutor<E> {
    inner: E,
    monitor: Arc<dyn QueryMonitor>,
    config: MonitorConfig,
}

impl<E: Executor> InstrumentedExecutor<E> {
    /// Wrap `inner` with no monitor and no timeout.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            monitor: Arc::new(NoopMonitor),
            config: MonitorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_monitor<M: QueryMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    /// Set the monitor from an Arc, keeping a handle for the caller.
    pub fn with_monitor_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    fn report<T>(
        &self,
        ctx: &QueryContext,
        duration: Duration,
        result: &PlanResult<T>,
        outcome: impl FnOnce(&T) -> QueryResult,
    ) {
        if !self.config.monitoring_enabled {
            return;
        }
        match result {
            Ok(value) => self.monitor.on_query_complete(ctx, duration, &outcome(value)),
            Err(e) => self.monitor.on_query_failed(ctx, duration, e),
        }
        if self.config.is_slow(duration) {
            self.monitor.on_slow_query(ctx, duration);
        }
    }

    async fn with_timeout<T, F>(&self, future: F) -> PlanResult<T>
    where
        F: Future<Output = PlanResult<T>> + Send,
    {
        let Some(timeout) = self.config.query_timeout else {
            return future.await;
        };
        tokio::pin!(future);
        tokio::select! {
            result = &mut future => result,
            _ = tokio::time::sleep(timeout) => {
                if let Some(cancel_token) = self.inner.cancel_token() {
                    tokio::spawn(async move {
                        let _ = cancel_token.cancel_query(tokio_postgres::NoTls).await;
                    });
                }
                Err(PlanError::Timeout(timeout))
            }
        }
    }

    fn context(&self, tag: Option<&str>, query: &RenderedQuery) -> QueryContext {
        let ctx = QueryContext::new(query);
        let ctx = match tag {
            Some(tag) => ctx.with_tag(tag),
            None => ctx,
        };
        if self.config.monitoring_enabled {
            self.monitor.on_query_start(&ctx);
        }
        ctx
    }

    async fn query_inner(
        &self,
        tag: Option<&str>,
        query: &RenderedQuery,
        params: &Params,
    ) -> PlanResult<Vec<Row>> {
        let ctx = self.context(tag, query);
        let start = Instant::now();
        let result = self
            .with_timeout(self.inner.query(query, params))
            .await;
        self.report(&ctx, start.elapsed(), &result, |rows| {
            QueryResult::Rows(rows.len())
        });
        result
    }

    async fn execute_inner(
        &self,
        tag: Option<&str>,
        query: &RenderedQuery,
        params: &Params,
    ) -> PlanResult<u64> {
        let ctx = self.context(tag, query);
        let start = Instant::now();
        let result = self
            .with_timeout(self.inner.execute(query, params))
            .await;
        self.report(&ctx, start.elapsed(), &result, |n| QueryResult::Affected(*n));
        result
    }
}

impl<E: Executor> Executor for InstrumentedExecutor<E> {
    async fn query(&self, query: &RenderedQuery, params: &Params) -> PlanResult<Vec<Row>> {
        self.query_inner(None, query, params).await
    }

    async fn execute(&self, query: &RenderedQuery, params: &Params) -> PlanResult<u64> {
        self.execute_inner(None, query, params).await
    }

    async fn query_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> PlanResult<Vec<Row>> {
        self.query_inner(Some(tag), query, params).await
    }

    async fn execute_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> PlanResult<u64> {
        self.execute_inner(Some(tag), query, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        self.inner.cancel_token()
    }
}

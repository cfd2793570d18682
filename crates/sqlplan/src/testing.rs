//! Scripted in-memory executor for tests.
//!
//! [`MockExecutor`] records every statement it receives and answers from a
//! queue of canned responses. With the queue empty, queries return no rows
//! and statements affect zero rows.

use crate::error::{PlanError, PlanResult};
use crate::exec::Executor;
use crate::render::RenderedQuery;
use crate::row::Row;
use crate::value::{Params, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One statement seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub sql: String,
    pub params: Vec<String>,
    pub values: Params,
    pub tag: Option<String>,
}

impl Call {
    /// First SQL keyword, e.g. `"UPDATE"`.
    pub fn verb(&self) -> &str {
        self.sql
            .trim_start_matches('(')
            .split_whitespace()
            .next()
            .unwrap_or("")
    }
}

#[derive(Debug)]
enum Response {
    Rows(Vec<Row>),
    Affected(u64),
    Error(PlanError),
}

#[derive(Debug, Default)]
struct State {
    responses: VecDeque<Response>,
    calls: Vec<Call>,
}

/// Executor that replays queued responses.
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: Mutex<State>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a row set.
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.push(Response::Rows(rows));
        self
    }

    /// Queue an affected-row count.
    pub fn with_affected(self, n: u64) -> Self {
        self.push(Response::Affected(n));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, err: PlanError) -> Self {
        self.push(Response::Error(err));
        self
    }

    /// Every statement received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// First keyword of every statement received so far.
    pub fn verbs(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.verb().to_string()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, r: Response) {
        self.lock().responses.push_back(r);
    }

    fn record(&self, tag: Option<&str>, query: &RenderedQuery, params: &Params) -> Option<Response> {
        let mut state = self.lock();
        state.calls.push(Call {
            sql: query.sql.clone(),
            params: query.params.clone(),
            values: params.clone(),
            tag: tag.map(str::to_string),
        });
        state.responses.pop_front()
    }

    fn answer_rows(&self, tag: Option<&str>, query: &RenderedQuery, params: &Params) -> PlanResult<Vec<Row>> {
        match self.record(tag, query, params) {
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Affected(_)) | None => Ok(Vec::new()),
            Some(Response::Error(e)) => Err(e),
        }
    }

    fn answer_count(&self, tag: Option<&str>, query: &RenderedQuery, params: &Params) -> PlanResult<u64> {
        match self.record(tag, query, params) {
            Some(Response::Affected(n)) => Ok(n),
            Some(Response::Rows(rows)) => Ok(rows.len() as u64),
            None => Ok(0),
            Some(Response::Error(e)) => Err(e),
        }
    }
}

impl Executor for MockExecutor {
    async fn query(&self, query: &RenderedQuery, params: &Params) -> PlanResult<Vec<Row>> {
        self.answer_rows(None, query, params)
    }

    async fn execute(&self, query: &RenderedQuery, params: &Params) -> PlanResult<u64> {
        self.answer_count(None, query, params)
    }

    async fn query_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> PlanResult<Vec<Row>> {
        self.answer_rows(Some(tag), query, params)
    }

    async fn execute_tagged(
        &self,
        tag: &str,
        query: &RenderedQuery,
        params: &Params,
    ) -> PlanResult<u64> {
        self.answer_count(Some(tag), query, params)
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<V: Into<Value>>(pairs: impl IntoIterator<Item = (&'static str, V)>) -> Row {
    let (cols, values): (Vec<String>, Vec<Value>) = pairs
        .into_iter()
        .map(|(c, v)| (c.to_string(), v.into()))
        .unzip();
    let cols: Arc<[String]> = cols.into();
    // Lengths match by construction.
    match Row::new(cols, values) {
        Ok(r) => r,
        Err(e) => panic!("{e}"),
    }
}

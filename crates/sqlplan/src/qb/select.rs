//! SELECT builder.

use super::base::{QbCore, order_term, param_bound, resolve_fields};
use super::traits::{PlanQb, WhereQb, sealed::HasCore};
use super::window::WindowQb;
use crate::error::{PlanError, PlanResult};
use crate::exec::{self, Cardinality, Executor};
use crate::model::Model;
use crate::plan::{Bound, Distinct, LockMode, QueryPlan, SelectItem};
use crate::row::Record;
use std::borrow::Cow;
use std::marker::PhantomData;

/// SELECT builder materializing rows into `T`.
///
/// ```ignore
/// let page: Vec<User> = users
///     .select()
///     .where_and(vec![
///         Filter::compare("age", ">=", "lo"),
///         Filter::compare("age", "<=", "hi"),
///     ])
///     .order_by("name", "asc")
///     .limit(20)
///     .bind("lo", 18)
///     .bind("hi", 65)
///     .fetch_all(&client)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SelectQb<T> {
    pub(crate) core: QbCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HasCore for SelectQb<T> {
    fn core(&self) -> &QbCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QbCore {
        &mut self.core
    }
}

impl<T> PlanQb for SelectQb<T> {}
impl<T> WhereQb for SelectQb<T> {}

impl<T> SelectQb<T> {
    pub(crate) fn new(core: QbCore) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    /// Select these columns instead of `*`. Appends on repeated calls.
    pub fn select_fields(mut self, fields: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            let fields = resolve_fields(catalog, fields)?;
            plan.select.extend(fields.into_iter().map(SelectItem::Field));
            Ok(())
        });
        self
    }

    /// `ORDER BY field direction`; direction is `asc` or `desc`.
    pub fn order_by(self, field: &str, direction: &str) -> Self {
        self.push_order(field, direction, None)
    }

    /// `ORDER BY field direction NULLS FIRST|LAST`
    pub fn order_by_nulls(self, field: &str, direction: &str, nulls: &str) -> Self {
        self.push_order(field, direction, Some(nulls))
    }

    fn push_order(mut self, field: &str, direction: &str, nulls: Option<&str>) -> Self {
        self.core.apply(|plan, catalog| {
            plan.order_by
                .push(order_term(catalog, field, direction, nulls)?);
            Ok(())
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.core.apply(|plan, _| {
            plan.limit = Some(Bound::Literal(n));
            Ok(())
        });
        self
    }

    /// `LIMIT :param`
    pub fn limit_param(mut self, param: &str) -> Self {
        self.core.apply(|plan, catalog| {
            plan.limit = Some(param_bound(catalog, param)?);
            Ok(())
        });
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.core.apply(|plan, _| {
            plan.offset = Some(Bound::Literal(n));
            Ok(())
        });
        self
    }

    /// `OFFSET :param`
    pub fn offset_param(mut self, param: &str) -> Self {
        self.core.apply(|plan, catalog| {
            plan.offset = Some(param_bound(catalog, param)?);
            Ok(())
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.core.apply(|plan, _| {
            plan.distinct = Distinct::All;
            Ok(())
        });
        self
    }

    /// `DISTINCT ON (fields)`; Postgres only, checked at render.
    pub fn distinct_on(mut self, fields: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            plan.distinct = Distinct::On(resolve_fields(catalog, fields)?);
            Ok(())
        });
        self
    }

    /// Row locking, e.g. `"for update skip locked"`.
    pub fn lock(mut self, mode: &str) -> Self {
        self.core.apply(|plan, _| {
            plan.lock = Some(mode.parse::<LockMode>()?);
            Ok(())
        });
        self
    }

    /// Start a window expression; [`WindowQb::end`] returns to this builder.
    ///
    /// `field` is the function argument: required for aggregates and
    /// value functions (`lag`, `first_value`, ...), forbidden for ranking
    /// functions. `count` alone may omit it.
    pub fn window(self, func: &str, field: Option<&str>) -> WindowQb<T> {
        WindowQb::new(self, func, field)
    }

    /// The plan `fetch_all` runs: the default limit applies when none is set.
    fn many_plan(&self) -> Cow<'_, QueryPlan> {
        match self.core.config.default_limit {
            Some(n) if self.core.plan.limit.is_none() => {
                let mut plan = self.core.plan.clone();
                plan.limit = Some(Bound::Literal(n));
                Cow::Owned(plan)
            }
            _ => Cow::Borrowed(&self.core.plan),
        }
    }
}

impl<T: Model> SelectQb<T> {
    /// Exactly one row: zero is `NotFound`, more than one `MultipleRows`.
    pub async fn fetch_one<E: Executor>(&self, exec: &E) -> PlanResult<T> {
        let query = self.core.render_for("fetch_one")?;
        let mut rows = exec::run_query(
            exec,
            "fetch_one",
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::One,
            T::from_row,
        )
        .await?;
        rows.pop()
            .ok_or_else(|| PlanError::not_found("fetch_one returned no rows"))
    }

    /// Zero or one row.
    pub async fn fetch_opt<E: Executor>(&self, exec: &E) -> PlanResult<Option<T>> {
        let query = self.core.render_for("fetch_opt")?;
        let rows = exec::run_query(
            exec,
            "fetch_opt",
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::AtMostOne,
            T::from_row,
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    /// Every row, stopping at the first one that fails to decode.
    pub async fn fetch_all<E: Executor>(&self, exec: &E) -> PlanResult<Vec<T>> {
        let query = self.core.render_plan("fetch_all", &self.many_plan())?;
        exec::run_query(
            exec,
            "fetch_all",
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::Many,
            T::from_row,
        )
        .await
    }

    /// Every row as a type-erased [`Record`] laid out by the table's
    /// column map.
    pub async fn fetch_records<E: Executor>(&self, exec: &E) -> PlanResult<Vec<Record>> {
        let query = self.core.render_plan("fetch_records", &self.many_plan())?;
        let map = self.core.catalog.column_map();
        exec::run_query(
            exec,
            "fetch_records",
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::Many,
            |row| Record::decode(&map, row),
        )
        .await
    }
}

//! INSERT builder, including upsert and batch execution.

use super::base::{QbCore, resolve_fields, returning_fields, self_named};
use super::traits::{PlanQb, sealed::HasCore};
use crate::catalog::{FieldRef, ParamRef};
use crate::condition::{Condition, Operator, resolve_field, resolve_param};
use crate::config::UpsertFallback;
use crate::error::{
    BuilderKind, PlanError, PlanResult, QueryPhase, ValidationError, ValidationKind,
};
use crate::exec::{self, Cardinality, Executor};
use crate::model::Model;
use crate::plan::{ConflictResolution, ConflictSpec, QueryKind, QueryPlan, Returning};
use crate::render::{Capabilities, RenderError};
use std::marker::PhantomData;

const UPSERT: &str = "upsert";

/// INSERT builder for `T`'s table.
///
/// ```ignore
/// let saved: User = users
///     .insert()
///     .record(&user)
///     .on_conflict_update(&["email"], &["name", "age"])
///     .upsert(&client)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct InsertQb<T> {
    pub(crate) core: QbCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HasCore for InsertQb<T> {
    fn core(&self) -> &QbCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QbCore {
        &mut self.core
    }
}

impl<T> PlanQb for InsertQb<T> {}

/// Put `(field, param)` into `values`, replacing an earlier entry for the
/// same field in place.
fn upsert_value(values: &mut Vec<(FieldRef, ParamRef)>, field: FieldRef, param: ParamRef) {
    match values.iter_mut().find(|(f, _)| *f == field) {
        Some(slot) => slot.1 = param,
        None => values.push((field, param)),
    }
}

fn conflict_error(name: impl Into<String>) -> PlanError {
    PlanError::builder(
        BuilderKind::Insert,
        ValidationError::new(ValidationKind::Conflict, name).into(),
    )
}

impl<T> InsertQb<T> {
    pub(crate) fn new(core: QbCore) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    /// Insert `:param` into `field`.
    pub fn value(mut self, field: &str, param: &str) -> Self {
        self.core.apply(|plan, catalog| {
            let field = resolve_field(catalog, field)?;
            let param = resolve_param(catalog, param)?;
            upsert_value(&mut plan.values, field, param);
            Ok(())
        });
        self
    }

    pub fn returning(mut self, fields: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            plan.returning = returning_fields(catalog, fields)?;
            Ok(())
        });
        self
    }

    pub fn returning_all(mut self) -> Self {
        self.core.apply(|plan, _| {
            plan.returning = Returning::All;
            Ok(())
        });
        self
    }

    /// `ON CONFLICT (columns) DO NOTHING`. `columns` may be empty for the
    /// native clause; the emulated path needs at least one.
    pub fn on_conflict_ignore(mut self, columns: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            plan.conflict = Some(ConflictSpec {
                columns: resolve_fields(catalog, columns)?,
                resolution: ConflictResolution::Ignore,
            });
            Ok(())
        });
        self
    }

    /// `ON CONFLICT (columns) DO UPDATE SET f = EXCLUDED.f` for each of
    /// `update_fields`.
    pub fn on_conflict_update(mut self, columns: &[&str], update_fields: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            if columns.is_empty() {
                return Err(ValidationError::new(
                    ValidationKind::Conflict,
                    "on_conflict_update needs conflict columns",
                ));
            }
            if update_fields.is_empty() {
                return Err(ValidationError::new(
                    ValidationKind::Conflict,
                    "on_conflict_update needs fields to update",
                ));
            }
            plan.conflict = Some(ConflictSpec {
                columns: resolve_fields(catalog, columns)?,
                resolution: ConflictResolution::Update(resolve_fields(catalog, update_fields)?),
            });
            Ok(())
        });
        self
    }

    /// The parameter bound to `field` in the VALUES list.
    fn value_param(&self, field: &FieldRef) -> PlanResult<ParamRef> {
        self.core
            .plan
            .values
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| conflict_error(format!("{} has no inserted value", field.name())))
    }

    /// `col = :param AND ...` over `columns`, reusing the inserted values.
    fn keyed_filter(&self, columns: &[FieldRef]) -> PlanResult<Condition> {
        let mut filter: Option<Condition> = None;
        for col in columns {
            let cond = Condition::Compare {
                field: col.clone(),
                op: Operator::Eq,
                param: self.value_param(col)?,
            };
            filter = Some(match filter {
                Some(f) => f.and(cond),
                None => cond,
            });
        }
        filter.ok_or_else(|| conflict_error("emulated upsert needs conflict columns"))
    }

    fn plan_of(&self, kind: QueryKind) -> QueryPlan {
        QueryPlan::new(kind, self.core.plan.table.clone())
    }

    /// The INSERT itself, without a conflict clause.
    fn plain_insert(&self, returning: bool) -> QueryPlan {
        let mut plan = self.core.plan.clone();
        plan.conflict = None;
        plan.returning = if returning {
            Returning::All
        } else {
            Returning::None
        };
        plan
    }
}

impl<T: Model> InsertQb<T> {
    /// Insert every insertable column of `record`, binding its values under
    /// parameters named after the columns.
    pub fn record(mut self, record: &T) -> Self {
        let params = record.to_params();
        let fields = self.core.catalog.insertable_fields();
        self.core.apply(|plan, catalog| {
            let present: Vec<FieldRef> = fields
                .into_iter()
                .filter(|f| params.contains(f.name()))
                .collect();
            for (field, param) in self_named(catalog, &present)? {
                upsert_value(&mut plan.values, field, param);
            }
            Ok(())
        });
        if !self.core.has_error() {
            self.core.bindings.extend(params);
        }
        self
    }

    /// Run the INSERT and return the affected-row count.
    pub async fn execute<E: Executor>(&self, exec: &E) -> PlanResult<u64> {
        let query = self.core.render_for("execute")?;
        exec::run_execute(exec, "execute", self.core.tag(), &query, &self.core.bindings).await
    }

    /// Run the INSERT with `RETURNING *` (unless a returning list is set)
    /// and decode the row.
    pub async fn fetch_one<E: Executor>(&self, exec: &E) -> PlanResult<T> {
        let mut plan = self.core.plan.clone();
        if plan.returning == Returning::None {
            plan.returning = Returning::All;
        }
        let query = self.core.render_plan("fetch_one", &plan)?;
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
            .ok_or_else(|| PlanError::not_found("insert returned no rows"))
    }

    /// Render once, execute once per record in order.
    ///
    /// Each record's values are bound on top of the builder's bindings. With
    /// no explicit VALUES list, every insertable column is inserted. Stops at
    /// the first failure with [`PlanError::PartialBatch`]; earlier records
    /// stay applied unless `exec` is a transaction the caller rolls back.
    pub async fn execute_batch<E: Executor>(&self, exec: &E, records: &[T]) -> PlanResult<u64> {
        self.core.check()?;
        let mut plan = self.core.plan.clone();
        if plan.values.is_empty() {
            let fields = self.core.catalog.insertable_fields();
            plan.values = self_named(&*self.core.catalog, &fields)
                .map_err(|e| PlanError::builder(BuilderKind::Insert, e.into()))?;
        }
        let query = self.core.render_plan("execute_batch", &plan)?;

        let base = &self.core.bindings;
        let param_sets = records.iter().map(|record| {
            let mut params = base.clone();
            params.extend(record.to_params());
            params
        });
        exec::run_batch(exec, self.core.tag(), &query, param_sets).await
    }

    /// Insert, resolving a conflict as declared by
    /// [`on_conflict_update`](Self::on_conflict_update) or
    /// [`on_conflict_ignore`](Self::on_conflict_ignore), and return the
    /// stored row.
    ///
    /// With native upsert support this is one statement. Otherwise, unless
    /// the table is configured with [`UpsertFallback::Reject`], it is
    /// emulated:
    ///
    /// 1. `UPDATE ... SET <update fields> WHERE <conflict columns match>`
    /// 2. zero rows updated: `INSERT`, returning the new row
    /// 3. otherwise: `SELECT ... WHERE <conflict columns match>`
    ///
    /// For `on_conflict_ignore` the UPDATE is replaced by the keyed SELECT.
    /// The emulation is not atomic; a concurrent writer can insert the
    /// same key between the steps. Pass a transaction as `exec` when that
    /// matters.
    pub async fn upsert<E: Executor>(&self, exec: &E) -> PlanResult<T> {
        self.core.check()?;
        let Some(conflict) = self.core.plan.conflict.clone() else {
            return Err(conflict_error(
                "upsert needs on_conflict_update or on_conflict_ignore",
            ));
        };

        let caps = self.core.capabilities();
        if caps.native_upsert {
            return self.upsert_native(exec, &conflict).await;
        }
        if self.core.config.upsert_fallback == UpsertFallback::Reject {
            let err = RenderError::Unsupported {
                feature: "ON CONFLICT",
                dialect: self.core.renderer.dialect(),
            };
            return Err(PlanError::query(QueryPhase::Render, UPSERT, err.into()));
        }

        match &conflict.resolution {
            ConflictResolution::Update(fields) => {
                self.emulate_update(exec, &conflict.columns, fields, caps).await
            }
            ConflictResolution::Ignore => {
                let found = self.keyed_select(exec, &conflict.columns, false).await?;
                match found {
                    Some(row) => {
                        tracing::debug!(
                            target: "sqlplan.exec",
                            table = %self.core.plan.table.name(),
                            "upsert fallback: key exists, insert skipped"
                        );
                        Ok(row)
                    }
                    None => self.emulate_insert(exec, &conflict.columns, caps).await,
                }
            }
        }
    }

    async fn upsert_native<E: Executor>(&self, exec: &E, conflict: &ConflictSpec) -> PlanResult<T> {
        let mut plan = self.core.plan.clone();
        plan.returning = Returning::All;
        let query = self.core.render_plan(UPSERT, &plan)?;
        let row = exec::run_query(
            exec,
            UPSERT,
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::AtMostOne,
            T::from_row,
        )
        .await?
        .pop();
        match row {
            Some(row) => Ok(row),
            // DO NOTHING returns no row when the key already exists.
            None => self.keyed_select(exec, &conflict.columns, true).await?.ok_or_else(|| {
                PlanError::not_found("upsert returned no row and the key lookup found none")
            }),
        }
    }

    async fn emulate_update<E: Executor>(
        &self,
        exec: &E,
        columns: &[FieldRef],
        fields: &[FieldRef],
        caps: Capabilities,
    ) -> PlanResult<T> {
        let mut update = self.plan_of(QueryKind::Update);
        for field in fields {
            update.sets.push((field.clone(), self.value_param(field)?));
        }
        update.push_filter(self.keyed_filter(columns)?);

        let query = self.core.render_plan(UPSERT, &update)?;
        let affected =
            exec::run_execute(exec, UPSERT, self.core.tag(), &query, &self.core.bindings).await?;
        tracing::debug!(
            target: "sqlplan.exec",
            table = %self.core.plan.table.name(),
            affected,
            "upsert fallback: update step"
        );

        if affected == 0 {
            self.emulate_insert(exec, columns, caps).await
        } else {
            self.keyed_select(exec, columns, true)
                .await?
                .ok_or_else(|| PlanError::not_found("updated row vanished before re-select"))
        }
    }

    async fn emulate_insert<E: Executor>(
        &self,
        exec: &E,
        columns: &[FieldRef],
        caps: Capabilities,
    ) -> PlanResult<T> {
        let insert = self.plain_insert(caps.returning);
        let query = self.core.render_plan(UPSERT, &insert)?;
        tracing::debug!(
            target: "sqlplan.exec",
            table = %self.core.plan.table.name(),
            returning = caps.returning,
            "upsert fallback: insert step"
        );

        if caps.returning {
            let mut rows = exec::run_query(
                exec,
                UPSERT,
                self.core.tag(),
                &query,
                &self.core.bindings,
                Cardinality::One,
                T::from_row,
            )
            .await?;
            return rows
                .pop()
                .ok_or_else(|| PlanError::not_found("insert returned no rows"));
        }

        exec::run_execute(exec, UPSERT, self.core.tag(), &query, &self.core.bindings).await?;
        self.keyed_select(exec, columns, true)
            .await?
            .ok_or_else(|| PlanError::not_found("inserted row not found by key"))
    }

    /// `SELECT * WHERE <columns match>`; `required` demands exactly one row.
    async fn keyed_select<E: Executor>(
        &self,
        exec: &E,
        columns: &[FieldRef],
        required: bool,
    ) -> PlanResult<Option<T>> {
        let mut select = self.plan_of(QueryKind::Select);
        select.push_filter(self.keyed_filter(columns)?);
        let query = self.core.render_plan(UPSERT, &select)?;
        let cardinality = if required {
            Cardinality::One
        } else {
            Cardinality::AtMostOne
        };
        let rows = exec::run_query(
            exec,
            UPSERT,
            self.core.tag(),
            &query,
            &self.core.bindings,
            cardinality,
            T::from_row,
        )
        .await?;
        Ok(rows.into_iter().next())
    }
}

//! UPDATE builder.

use super::base::{QbCore, returning_fields, self_named};
use super::traits::{PlanQb, WhereQb, sealed::HasCore};
use crate::catalog::FieldRef;
use crate::condition::{resolve_field, resolve_param};
use crate::error::PlanResult;
use crate::exec::{self, Cardinality, Executor};
use crate::model::Model;
use crate::plan::Returning;
use std::marker::PhantomData;

/// UPDATE builder for `T`'s table.
///
/// Rendering refuses a statement without a WHERE condition.
///
/// ```ignore
/// let n = users
///     .update()
///     .set("name", "new_name")
///     .where_("id", "=", "id")
///     .bind("new_name", "Ada")
///     .bind("id", 7)
///     .execute(&client)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct UpdateQb<T> {
    pub(crate) core: QbCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HasCore for UpdateQb<T> {
    fn core(&self) -> &QbCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QbCore {
        &mut self.core
    }
}

impl<T> PlanQb for UpdateQb<T> {}
impl<T> WhereQb for UpdateQb<T> {}

impl<T> UpdateQb<T> {
    pub(crate) fn new(core: QbCore) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    /// `SET field = :param`. Setting the same field twice keeps the last.
    pub fn set(mut self, field: &str, param: &str) -> Self {
        self.core.apply(|plan, catalog| {
            let field = resolve_field(catalog, field)?;
            let param = resolve_param(catalog, param)?;
            match plan.sets.iter_mut().find(|(f, _)| *f == field) {
                Some(slot) => slot.1 = param,
                None => plan.sets.push((field, param)),
            }
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

    /// Run the UPDATE and return the affected-row count.
    pub async fn execute<E: Executor>(&self, exec: &E) -> PlanResult<u64> {
        let query = self.core.render_for("execute")?;
        exec::run_execute(exec, "execute", self.core.tag(), &query, &self.core.bindings).await
    }
}

impl<T: Model> UpdateQb<T> {
    /// Set every non-key insertable column from `record`, binding values
    /// under parameters named after the columns. The key columns stay
    /// available as bindings for a WHERE condition.
    pub fn record(mut self, record: &T) -> Self {
        let params = record.to_params();
        let keys = self.core.catalog.primary_key();
        let fields: Vec<FieldRef> = self
            .core
            .catalog
            .insertable_fields()
            .into_iter()
            .filter(|f| !keys.contains(f) && params.contains(f.name()))
            .collect();
        self.core.apply(|plan, catalog| {
            for (field, param) in self_named(catalog, &fields)? {
                match plan.sets.iter_mut().find(|(f, _)| *f == field) {
                    Some(slot) => slot.1 = param,
                    None => plan.sets.push((field, param)),
                }
            }
            Ok(())
        });
        if !self.core.has_error() {
            self.core.bindings.extend(params);
        }
        self
    }

    /// Run with `RETURNING *` (unless a returning list is set) and decode
    /// every updated row.
    pub async fn fetch_all<E: Executor>(&self, exec: &E) -> PlanResult<Vec<T>> {
        let mut plan = self.core.plan.clone();
        if plan.returning == Returning::None {
            plan.returning = Returning::All;
        }
        let query = self.core.render_plan("fetch_all", &plan)?;
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
}

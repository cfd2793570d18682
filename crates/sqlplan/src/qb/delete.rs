//! DELETE builder.

use super::base::{QbCore, returning_fields};
use super::traits::{PlanQb, WhereQb, sealed::HasCore};
use crate::error::PlanResult;
use crate::exec::{self, Cardinality, Executor};
use crate::model::Model;
use crate::plan::Returning;
use std::marker::PhantomData;

/// DELETE builder for `T`'s table. Rendering refuses a statement without a
/// WHERE condition.
#[derive(Debug, Clone)]
pub struct DeleteQb<T> {
    pub(crate) core: QbCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HasCore for DeleteQb<T> {
    fn core(&self) -> &QbCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QbCore {
        &mut self.core
    }
}

impl<T> PlanQb for DeleteQb<T> {}
impl<T> WhereQb for DeleteQb<T> {}

impl<T> DeleteQb<T> {
    pub(crate) fn new(core: QbCore) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
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

    pub async fn execute<E: Executor>(&self, exec: &E) -> PlanResult<u64> {
        let query = self.core.render_for("execute")?;
        exec::run_execute(exec, "execute", self.core.tag(), &query, &self.core.bindings).await
    }
}

impl<T: Model> DeleteQb<T> {
    /// Delete and decode the removed rows (`RETURNING *` unless a returning
    /// list is set).
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

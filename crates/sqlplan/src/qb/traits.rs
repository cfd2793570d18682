//! Methods shared across builders.

use super::base::{QbCore, where_condition};
use crate::condition::Filter;
use crate::error::PlanResult;
use crate::render::RenderedQuery;
use crate::value::{Params, Value};

pub(crate) mod sealed {
    use super::QbCore;

    pub trait HasCore {
        fn core(&self) -> &QbCore;
        fn core_mut(&mut self) -> &mut QbCore;
    }
}

/// Parameter binding and rendering, available on every builder.
pub trait PlanQb: sealed::HasCore + Sized {
    /// Bind a value to a named parameter.
    ///
    /// Binding is not validated: a name the statement never references is
    /// ignored, and a referenced name left unbound fails at execution with
    /// `MissingParam`.
    fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.core_mut().bind(name.into(), value.into());
        self
    }

    /// Bind every entry of `params`, replacing earlier values.
    fn bind_all(mut self, params: Params) -> Self {
        self.core_mut().bindings.extend(params);
        self
    }

    /// Label statements from this builder for monitoring.
    fn tag(mut self, tag: impl Into<String>) -> Self {
        self.core_mut().tag = Some(tag.into());
        self
    }

    /// Values bound so far.
    fn bindings(&self) -> &Params {
        &self.core().bindings
    }

    /// Render the plan without executing it.
    ///
    /// Fails with `PlanError::Builder` if any earlier call in the chain
    /// failed; renderer failures (unsafe UPDATE/DELETE, unsupported
    /// features) are returned as-is.
    fn render(&self) -> PlanResult<RenderedQuery> {
        self.core().render()
    }
}

/// WHERE clause construction for select, update, delete and aggregate
/// builders. Successive calls are AND-combined.
pub trait WhereQb: PlanQb {
    /// Add a resolved [`Filter`] to WHERE. Empty groups are a no-op.
    fn filter(mut self, filter: Filter) -> Self {
        self.core_mut().apply(|plan, catalog| {
            if let Some(cond) = where_condition(catalog, &filter)? {
                plan.push_filter(cond);
            }
            Ok(())
        });
        self
    }

    /// `field op :param`
    fn where_(self, field: &str, op: &str, param: &str) -> Self {
        self.filter(Filter::compare(field, op, param))
    }

    /// All of `filters`, as one group.
    fn where_and(self, filters: Vec<Filter>) -> Self {
        self.filter(Filter::and(filters))
    }

    /// Any of `filters`, as one group.
    fn where_or(self, filters: Vec<Filter>) -> Self {
        self.filter(Filter::or(filters))
    }

    fn where_null(self, field: &str) -> Self {
        self.filter(Filter::is_null(field))
    }

    fn where_not_null(self, field: &str) -> Self {
        self.filter(Filter::is_not_null(field))
    }

    /// `field BETWEEN :low AND :high`
    fn where_between(self, field: &str, low: &str, high: &str) -> Self {
        self.filter(Filter::between(field, low, high))
    }

    fn where_not_between(self, field: &str, low: &str, high: &str) -> Self {
        self.filter(Filter::not_between(field, low, high))
    }

    /// Column-to-column comparison; binds nothing.
    fn where_fields(self, left: &str, op: &str, right: &str) -> Self {
        self.filter(Filter::fields(left, op, right))
    }
}

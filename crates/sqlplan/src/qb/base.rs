//! State shared by every fluent builder.

use crate::catalog::{FieldRef, ParamRef, SchemaCatalog};
use crate::condition::{self, Condition, Filter};
use crate::config::TableConfig;
use crate::error::{BuilderKind, PlanError, PlanResult, QueryPhase, ValidationError};
use crate::plan::{
    Bound, Direction, NullsOrder, OrderTarget, OrderTerm, QueryKind, QueryPlan, Returning,
};
use crate::render::{Capabilities, RenderedQuery, Renderer};
use crate::value::{Params, Value};
use std::sync::Arc;

/// Plan, first-error slot and bound values of one builder.
///
/// A mutator runs only while the slot is empty. It validates every input
/// before touching the plan, so a failed call leaves the plan as it was.
#[derive(Debug, Clone)]
pub struct QbCore {
    pub(crate) kind: BuilderKind,
    pub(crate) plan: QueryPlan,
    pub(crate) error: Option<ValidationError>,
    pub(crate) bindings: Params,
    pub(crate) catalog: Arc<dyn SchemaCatalog>,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) config: TableConfig,
    pub(crate) tag: Option<String>,
}

impl QbCore {
    pub(crate) fn new(
        kind: BuilderKind,
        query: QueryKind,
        catalog: Arc<dyn SchemaCatalog>,
        renderer: Arc<dyn Renderer>,
        config: TableConfig,
    ) -> Self {
        let plan = QueryPlan::new(query, catalog.table());
        Self {
            kind,
            plan,
            error: None,
            bindings: Params::new(),
            catalog,
            renderer,
            config,
            tag: None,
        }
    }

    /// Run `f` unless an earlier call failed; record its error otherwise.
    pub(crate) fn apply<F>(&mut self, f: F)
    where
        F: FnOnce(&mut QueryPlan, &dyn SchemaCatalog) -> Result<(), ValidationError>,
    {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = f(&mut self.plan, &*self.catalog) {
            self.error = Some(e);
        }
    }

    /// Record `err` unless an earlier one is already held.
    pub(crate) fn fail(&mut self, err: ValidationError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        self.renderer.capabilities()
    }

    /// Fail with the deferred error, tagged with this builder's kind.
    pub(crate) fn check(&self) -> PlanResult<()> {
        match &self.error {
            Some(e) => Err(PlanError::builder(self.kind, e.clone().into())),
            None => Ok(()),
        }
    }

    pub(crate) fn render(&self) -> PlanResult<RenderedQuery> {
        self.check()?;
        self.renderer.render(&self.plan)
    }

    /// Render `plan` for execution; renderer failures carry `operation`.
    pub(crate) fn render_plan(&self, operation: &str, plan: &QueryPlan) -> PlanResult<RenderedQuery> {
        self.check()?;
        self.renderer
            .render(plan)
            .map_err(|e| PlanError::query(QueryPhase::Render, operation, e))
    }

    pub(crate) fn render_for(&self, operation: &str) -> PlanResult<RenderedQuery> {
        self.render_plan(operation, &self.plan)
    }

    pub(crate) fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) fn bind(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }
}

/// Field tokens for `names`, all or nothing.
pub(crate) fn resolve_fields(
    catalog: &dyn SchemaCatalog,
    names: &[&str],
) -> Result<Vec<FieldRef>, ValidationError> {
    names
        .iter()
        .map(|n| condition::resolve_field(catalog, n))
        .collect()
}

/// Resolve a WHERE filter; aggregate predicates belong in HAVING.
pub(crate) fn where_condition(
    catalog: &dyn SchemaCatalog,
    filter: &Filter,
) -> Result<Option<Condition>, ValidationError> {
    let cond = filter.resolve(catalog)?;
    if cond.as_ref().is_some_and(Condition::has_aggregate) {
        return Err(ValidationError::new(
            crate::error::ValidationKind::Condition,
            "aggregate comparison in WHERE; use having()",
        ));
    }
    Ok(cond)
}

pub(crate) fn order_term(
    catalog: &dyn SchemaCatalog,
    field: &str,
    direction: &str,
    nulls: Option<&str>,
) -> Result<OrderTerm, ValidationError> {
    let direction: Direction = direction.parse()?;
    let nulls = nulls.map(str::parse::<NullsOrder>).transpose()?;
    Ok(OrderTerm {
        target: OrderTarget::Field(condition::resolve_field(catalog, field)?),
        direction,
        nulls,
    })
}

pub(crate) fn param_bound(
    catalog: &dyn SchemaCatalog,
    name: &str,
) -> Result<Bound, ValidationError> {
    condition::resolve_param(catalog, name).map(Bound::Param)
}

pub(crate) fn returning_fields(
    catalog: &dyn SchemaCatalog,
    names: &[&str],
) -> Result<Returning, ValidationError> {
    Ok(Returning::Fields(resolve_fields(catalog, names)?))
}

/// `(field, :param)` pairs where each param is named after its field.
pub(crate) fn self_named(
    catalog: &dyn SchemaCatalog,
    fields: &[FieldRef],
) -> Result<Vec<(FieldRef, ParamRef)>, ValidationError> {
    fields
        .iter()
        .map(|f| Ok((f.clone(), condition::resolve_param(catalog, f.name())?)))
        .collect()
}

//! UNION / INTERSECT / EXCEPT over select builders.

use super::base::{order_term, param_bound};
use super::select::SelectQb;
use crate::catalog::SchemaCatalog;
use crate::error::{BuilderKind, PlanError, PlanResult, QueryPhase, ValidationError, ValidationKind};
use crate::exec::{self, Cardinality, Executor};
use crate::model::Model;
use crate::plan::{Bound, CompoundPlan, OrderTerm, SetOperator};
use crate::render::{RenderError, RenderedQuery};
use crate::row::Record;
use crate::value::{Params, Value};

/// `q<N>_...`, the names operand parameters are rewritten to.
fn is_namespaced(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('q') else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && rest.as_bytes().get(digits) == Some(&b'_')
}

fn top_level_bound(catalog: &dyn SchemaCatalog, param: &str) -> Result<Bound, ValidationError> {
    if is_namespaced(param) {
        return Err(ValidationError::new(ValidationKind::Param, param));
    }
    param_bound(catalog, param)
}

/// Select builders joined by set operators.
///
/// Chaining appends operands left to right; it never nests. At render time
/// the parameters of operand `N` are renamed to `q<N>_<name>` and its bound
/// values follow, so operands may reuse parameter names freely:
///
/// ```ignore
/// let q = users.select().where_("age", ">=", "min_age").bind("min_age", 18)
///     .union(users.select().where_("name", "=", "target").bind("target", "ann"));
/// // (SELECT * FROM "users" WHERE "age" >= :q0_min_age)
/// //     UNION (SELECT * FROM "users" WHERE "name" = :q1_target)
/// ```
///
/// ORDER BY, LIMIT and OFFSET set here apply to the combined result; their
/// names resolve against the first operand's catalog and are not renamed.
#[derive(Debug, Clone)]
pub struct CompoundQb<T> {
    first: Option<SelectQb<T>>,
    rest: Vec<(SetOperator, SelectQb<T>)>,
    order_by: Vec<OrderTerm>,
    limit: Option<Bound>,
    offset: Option<Bound>,
    bindings: Params,
    tag: Option<String>,
    error: Option<ValidationError>,
}

macro_rules! set_ops {
    ($($name:ident => $op:expr),* $(,)?) => {
        impl<T> SelectQb<T> {
            $(
                #[doc = concat!("Combine with `other` using `", stringify!($name), "`.")]
                pub fn $name(self, other: SelectQb<T>) -> CompoundQb<T> {
                    CompoundQb::from_first(self).push($op, other)
                }
            )*
        }

        impl<T> CompoundQb<T> {
            $(
                #[doc = concat!("Append `other` using `", stringify!($name), "`.")]
                pub fn $name(self, other: SelectQb<T>) -> CompoundQb<T> {
                    self.push($op, other)
                }
            )*
        }
    };
}

set_ops! {
    union => SetOperator::Union,
    union_all => SetOperator::UnionAll,
    intersect => SetOperator::Intersect,
    intersect_all => SetOperator::IntersectAll,
    except => SetOperator::Except,
    except_all => SetOperator::ExceptAll,
}

impl<T> CompoundQb<T> {
    pub(crate) fn empty() -> Self {
        Self {
            first: None,
            rest: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            bindings: Params::new(),
            tag: None,
            error: None,
        }
    }

    fn from_first(first: SelectQb<T>) -> Self {
        Self {
            first: Some(first),
            ..Self::empty()
        }
    }

    fn push(mut self, op: SetOperator, operand: SelectQb<T>) -> Self {
        match self.first {
            None => self.first = Some(operand),
            Some(_) => self.rest.push((op, operand)),
        }
        self
    }

    /// Number of operands so far.
    pub fn len(&self) -> usize {
        self.first.iter().count() + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    fn apply<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self, &dyn SchemaCatalog) -> Result<(), ValidationError>,
    {
        if self.error.is_some() {
            return;
        }
        let Some(first) = &self.first else {
            self.error = Some(ValidationError::new(
                ValidationKind::Table,
                "compound query has no operands",
            ));
            return;
        };
        let catalog = first.core.catalog.clone();
        if let Err(e) = f(self, &*catalog) {
            self.error = Some(e);
        }
    }

    /// Order the combined result.
    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        self.apply(|c, catalog| {
            c.order_by.push(order_term(catalog, field, direction, None)?);
            Ok(())
        });
        self
    }

    pub fn order_by_nulls(mut self, field: &str, direction: &str, nulls: &str) -> Self {
        self.apply(|c, catalog| {
            c.order_by
                .push(order_term(catalog, field, direction, Some(nulls))?);
            Ok(())
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.apply(|c, _| {
            c.limit = Some(Bound::Literal(n));
            Ok(())
        });
        self
    }

    pub fn limit_param(mut self, param: &str) -> Self {
        self.apply(|c, catalog| {
            c.limit = Some(top_level_bound(catalog, param)?);
            Ok(())
        });
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.apply(|c, _| {
            c.offset = Some(Bound::Literal(n));
            Ok(())
        });
        self
    }

    pub fn offset_param(mut self, param: &str) -> Self {
        self.apply(|c, catalog| {
            c.offset = Some(top_level_bound(catalog, param)?);
            Ok(())
        });
        self
    }

    /// Bind a top-level parameter (LIMIT/OFFSET). Operand values are bound
    /// on the operands themselves; a `q<N>_` name here fails at render.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name, value);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Namespace every operand and assemble the plan plus merged bindings.
    ///
    /// The first failing operand's error wins, then this builder's own.
    fn assemble(&self) -> PlanResult<(CompoundPlan, Params, &SelectQb<T>)> {
        let Some(first) = &self.first else {
            return Err(RenderError::EmptyCompound.into());
        };

        let expected = first.core.plan.table.catalog();
        let mut bindings = Params::new();
        let mut namespaced = |index: usize, qb: &SelectQb<T>| {
            qb.core.check()?;
            let found = qb.core.plan.table.catalog();
            if found != expected {
                return Err(PlanError::from(RenderError::ForeignToken {
                    name: qb.core.plan.table.name(),
                    expected,
                    found,
                }));
            }
            let prefix = format!("q{index}_");
            let mut plan = qb.core.plan.clone();
            plan.prefix_params(&prefix);
            bindings.extend(qb.core.bindings.prefixed(&prefix));
            Ok::<_, PlanError>(plan)
        };

        let first_plan = namespaced(0, first)?;
        let mut rest = Vec::with_capacity(self.rest.len());
        for (i, (op, qb)) in self.rest.iter().enumerate() {
            rest.push((*op, namespaced(i + 1, qb)?));
        }

        if let Some(e) = &self.error {
            return Err(PlanError::builder(BuilderKind::Select, e.clone().into()));
        }
        for (name, value) in self.bindings.iter() {
            if is_namespaced(name) {
                let e = ValidationError::new(ValidationKind::Param, name);
                return Err(PlanError::builder(BuilderKind::Select, e.into()));
            }
            bindings.insert(name, value.clone());
        }

        let plan = CompoundPlan {
            first: first_plan,
            rest,
            order_by: self.order_by.clone(),
            limit: self.limit.clone(),
            offset: self.offset.clone(),
        };
        Ok((plan, bindings, first))
    }

    /// Render the combined statement. Rendering twice yields identical SQL.
    pub fn render(&self) -> PlanResult<RenderedQuery> {
        let (plan, _, first) = self.assemble()?;
        first.core.renderer.render_compound(&plan)
    }

    /// Every operand's bindings under their namespaced names, plus the
    /// top-level ones.
    pub fn bindings(&self) -> PlanResult<Params> {
        self.assemble().map(|(_, bindings, _)| bindings)
    }

    fn render_for(&self, operation: &str) -> PlanResult<(RenderedQuery, Params, &SelectQb<T>)> {
        let (plan, bindings, first) = self.assemble()?;
        let query = first
            .core
            .renderer
            .render_compound(&plan)
            .map_err(|e| PlanError::query(QueryPhase::Render, operation, e))?;
        Ok((query, bindings, first))
    }
}

impl<T: Model> CompoundQb<T> {
    pub async fn fetch_all<E: Executor>(&self, exec: &E) -> PlanResult<Vec<T>> {
        let (query, bindings, _) = self.render_for("fetch_all")?;
        exec::run_query(
            exec,
            "fetch_all",
            self.tag.as_deref(),
            &query,
            &bindings,
            Cardinality::Many,
            T::from_row,
        )
        .await
    }

    pub async fn fetch_records<E: Executor>(&self, exec: &E) -> PlanResult<Vec<Record>> {
        let (query, bindings, first) = self.render_for("fetch_records")?;
        let map = first.core.catalog.column_map();
        exec::run_query(
            exec,
            "fetch_records",
            self.tag.as_deref(),
            &query,
            &bindings,
            Cardinality::Many,
            |row| Record::decode(&map, row),
        )
        .await
    }
}

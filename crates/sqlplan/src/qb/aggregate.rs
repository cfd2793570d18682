//! GROUP BY / HAVING builder.

use super::base::{QbCore, order_term, param_bound, resolve_fields};
use super::traits::{PlanQb, WhereQb, sealed::HasCore};
use crate::catalog::{FieldRef, SchemaCatalog};
use crate::condition::{AggregateFn, Filter, resolve_field};
use crate::error::{PlanError, PlanResult, ValidationError, ValidationKind};
use crate::exec::{self, Cardinality, Executor};
use crate::ident::is_param_name;
use crate::plan::{Bound, Direction, NullsOrder, OrderTarget, OrderTerm, SelectItem};
use crate::row::{FromRow, Row};
use crate::value::FromValue;
use std::marker::PhantomData;

/// Aggregate query over `T`'s table.
///
/// Results are not `T` rows, so the terminals return raw [`Row`]s, a single
/// scalar, or any other [`FromRow`] type.
///
/// ```ignore
/// let per_city: Vec<Row> = users
///     .aggregate()
///     .select_fields(&["city"])
///     .aggregate_as("count", None, "n")
///     .group_by(&["city"])
///     .having(Filter::aggregate("count", None, ">", "min"))
///     .bind("min", 10)
///     .fetch_rows(&client)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct AggregateQb<T> {
    pub(crate) core: QbCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HasCore for AggregateQb<T> {
    fn core(&self) -> &QbCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QbCore {
        &mut self.core
    }
}

impl<T> PlanQb for AggregateQb<T> {}
impl<T> WhereQb for AggregateQb<T> {}

/// Parse `func` and resolve its optional argument.
fn aggregate_call(
    catalog: &dyn SchemaCatalog,
    func: &str,
    field: Option<&str>,
) -> Result<(AggregateFn, Option<FieldRef>), ValidationError> {
    let func: AggregateFn = func.parse()?;
    let field = match field {
        Some(f) => Some(resolve_field(catalog, f)?),
        None if func.allows_star() => None,
        None => {
            return Err(ValidationError::new(
                ValidationKind::AggregateFunction,
                format!("{} requires a field", func.as_sql()),
            ));
        }
    };
    Ok((func, field))
}

impl<T> AggregateQb<T> {
    pub(crate) fn new(core: QbCore) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    /// Plain columns in the select list; usually the GROUP BY columns.
    pub fn select_fields(mut self, fields: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            let fields = resolve_fields(catalog, fields)?;
            plan.select.extend(fields.into_iter().map(SelectItem::Field));
            Ok(())
        });
        self
    }

    /// Add `func(field)` to the select list; `None` means `COUNT(*)`.
    pub fn aggregate(mut self, func: &str, field: Option<&str>) -> Self {
        self.core.apply(|plan, catalog| {
            let (func, field) = aggregate_call(catalog, func, field)?;
            plan.select.push(SelectItem::Aggregate {
                func,
                field,
                alias: None,
            });
            Ok(())
        });
        self
    }

    /// Add `func(field) AS alias` to the select list.
    pub fn aggregate_as(mut self, func: &str, field: Option<&str>, alias: &str) -> Self {
        self.core.apply(|plan, catalog| {
            let (func, field) = aggregate_call(catalog, func, field)?;
            if !is_param_name(alias) {
                return Err(ValidationError::new(ValidationKind::Field, alias));
            }
            plan.select.push(SelectItem::Aggregate {
                func,
                field,
                alias: Some(alias.to_string()),
            });
            Ok(())
        });
        self
    }

    pub fn group_by(mut self, fields: &[&str]) -> Self {
        self.core.apply(|plan, catalog| {
            plan.group_by.extend(resolve_fields(catalog, fields)?);
            Ok(())
        });
        self
    }

    /// Add to HAVING. Aggregate comparisons are allowed here; successive
    /// calls are AND-combined.
    pub fn having(mut self, filter: Filter) -> Self {
        self.core.apply(|plan, catalog| {
            if let Some(cond) = filter.resolve(catalog)? {
                plan.push_having(cond);
            }
            Ok(())
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        self.core.apply(|plan, catalog| {
            plan.order_by.push(order_term(catalog, field, direction, None)?);
            Ok(())
        });
        self
    }

    /// `ORDER BY func(field) direction [NULLS ...]`
    pub fn order_by_aggregate(
        mut self,
        func: &str,
        field: Option<&str>,
        direction: &str,
        nulls: Option<&str>,
    ) -> Self {
        self.core.apply(|plan, catalog| {
            let direction: Direction = direction.parse()?;
            let nulls = nulls.map(str::parse::<NullsOrder>).transpose()?;
            let (func, field) = aggregate_call(catalog, func, field)?;
            plan.order_by.push(OrderTerm {
                target: OrderTarget::Aggregate { func, field },
                direction,
                nulls,
            });
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

    pub fn offset_param(mut self, param: &str) -> Self {
        self.core.apply(|plan, catalog| {
            plan.offset = Some(param_bound(catalog, param)?);
            Ok(())
        });
        self
    }

    /// Every result row, undecoded.
    pub async fn fetch_rows<E: Executor>(&self, exec: &E) -> PlanResult<Vec<Row>> {
        self.fetch_as::<Row, E>(exec).await
    }

    /// Every result row decoded as `R`.
    pub async fn fetch_as<R: FromRow, E: Executor>(&self, exec: &E) -> PlanResult<Vec<R>> {
        let query = self.core.render_for("fetch_as")?;
        exec::run_query(
            exec,
            "fetch_as",
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::Many,
            R::from_row,
        )
        .await
    }

    /// First column of the single result row, e.g. `COUNT(*)` without
    /// GROUP BY.
    pub async fn fetch_scalar<V: FromValue, E: Executor>(&self, exec: &E) -> PlanResult<V> {
        let query = self.core.render_for("fetch_scalar")?;
        let mut values = exec::run_query(
            exec,
            "fetch_scalar",
            self.core.tag(),
            &query,
            &self.core.bindings,
            Cardinality::One,
            |row| {
                let (Some(column), Some(value)) = (row.columns().first(), row.values().first())
                else {
                    return Err(PlanError::decode("?", "result row has no columns"));
                };
                V::from_value(value).map_err(|msg| PlanError::decode(column.as_str(), msg))
            },
        )
        .await?;
        values
            .pop()
            .ok_or_else(|| PlanError::not_found("fetch_scalar returned no rows"))
    }
}

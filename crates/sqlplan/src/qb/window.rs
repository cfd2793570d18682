//! Window expression builder.

use super::base::{order_term, resolve_fields};
use super::select::SelectQb;
use crate::catalog::FieldRef;
use crate::condition::{AggregateFn, resolve_field};
use crate::error::{ValidationError, ValidationKind};
use crate::ident::is_param_name;
use crate::plan::{Frame, FrameBound, OrderTerm, SelectItem, WindowExpr, WindowFn};

/// Builds one `func(field) OVER (...)` select item.
///
/// Carries its own first-error slot. [`WindowQb::end`] hands the expression,
/// or the error, back to the parent [`SelectQb`]; an error already held by
/// the parent takes precedence.
///
/// ```ignore
/// let running = users
///     .select()
///     .window("sum", Some("age"))
///     .partition_by(&["name"])
///     .order_by("id", "asc")
///     .frame("unbounded preceding", "current row")
///     .alias("running")
///     .end();
/// ```
#[derive(Debug, Clone)]
pub struct WindowQb<T> {
    parent: SelectQb<T>,
    func: Option<WindowFn>,
    field: Option<FieldRef>,
    partition_by: Vec<FieldRef>,
    order_by: Vec<OrderTerm>,
    frame: Option<Frame>,
    alias: Option<String>,
    error: Option<ValidationError>,
}

impl<T> WindowQb<T> {
    pub(crate) fn new(parent: SelectQb<T>, func: &str, field: Option<&str>) -> Self {
        let mut this = Self {
            parent,
            func: None,
            field: None,
            partition_by: Vec::new(),
            order_by: Vec::new(),
            frame: None,
            alias: None,
            error: None,
        };
        match this.resolve_call(func, field) {
            Ok((func, field)) => {
                this.func = Some(func);
                this.field = field;
            }
            Err(e) => this.error = Some(e),
        }
        this
    }

    fn resolve_call(
        &self,
        func: &str,
        field: Option<&str>,
    ) -> Result<(WindowFn, Option<FieldRef>), ValidationError> {
        let parsed: WindowFn = func.parse()?;
        // Postgres has no DISTINCT aggregates over a window.
        if parsed == WindowFn::Aggregate(AggregateFn::CountDistinct) {
            return Err(ValidationError::new(
                ValidationKind::WindowFunction,
                "COUNT(DISTINCT) OVER",
            ));
        }
        let field = match (parsed.takes_field(), field) {
            (false, Some(f)) => {
                return Err(ValidationError::new(
                    ValidationKind::WindowFunction,
                    format!("{}({f}) takes no argument", parsed.as_sql()),
                ));
            }
            (true, None) if parsed != WindowFn::Aggregate(AggregateFn::Count) => {
                return Err(ValidationError::new(
                    ValidationKind::WindowFunction,
                    format!("{}() requires a field", parsed.as_sql()),
                ));
            }
            (_, Some(f)) => Some(resolve_field(&*self.parent.core.catalog, f)?),
            (_, None) => None,
        };
        Ok((parsed, field))
    }

    fn apply<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self) -> Result<(), ValidationError>,
    {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = f(self) {
            self.error = Some(e);
        }
    }

    /// `PARTITION BY fields`; appends on repeated calls.
    pub fn partition_by(mut self, fields: &[&str]) -> Self {
        self.apply(|w| {
            let fields = resolve_fields(&*w.parent.core.catalog, fields)?;
            w.partition_by.extend(fields);
            Ok(())
        });
        self
    }

    /// Add an `ORDER BY` entry inside the window.
    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        self.apply(|w| {
            let term = order_term(&*w.parent.core.catalog, field, direction, None)?;
            w.order_by.push(term);
            Ok(())
        });
        self
    }

    /// `ROWS BETWEEN start AND end`.
    ///
    /// Bounds are `unbounded preceding`, `current row` or `unbounded
    /// following`, in any case. A frame may not start at `UNBOUNDED
    /// FOLLOWING` or end at `UNBOUNDED PRECEDING`.
    pub fn frame(mut self, start: &str, end: &str) -> Self {
        self.apply(|w| {
            let start: FrameBound = start.parse()?;
            let end: FrameBound = end.parse()?;
            if start == FrameBound::UnboundedFollowing || end == FrameBound::UnboundedPreceding {
                return Err(ValidationError::new(
                    ValidationKind::FrameBound,
                    format!("{} AND {}", start.as_sql(), end.as_sql()),
                ));
            }
            w.frame = Some(Frame { start, end });
            Ok(())
        });
        self
    }

    /// Output column name.
    pub fn alias(mut self, alias: &str) -> Self {
        self.apply(|w| {
            if !is_param_name(alias) {
                return Err(ValidationError::new(ValidationKind::Field, alias));
            }
            w.alias = Some(alias.to_string());
            Ok(())
        });
        self
    }

    /// Append the window to the parent's select list and return the parent.
    pub fn end(self) -> SelectQb<T> {
        let mut parent = self.parent;
        match (self.error, self.func) {
            (Some(e), _) => parent.core.fail(e),
            (None, Some(func)) => {
                let expr = WindowExpr {
                    func,
                    field: self.field,
                    partition_by: self.partition_by,
                    order_by: self.order_by,
                    frame: self.frame,
                    alias: self.alias,
                };
                parent.core.apply(|plan, _| {
                    plan.select.push(SelectItem::Window(expr));
                    Ok(())
                });
            }
            // A missing function always comes with an error.
            (None, None) => {}
        }
        parent
    }
}

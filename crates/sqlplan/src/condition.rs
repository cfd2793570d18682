//! Condition model for WHERE and HAVING clauses.
//!
//! Two layers live here:
//!
//! - [`Filter`]: what callers write. Plain strings for fields, operators and
//!   parameter names, freely nested with AND/OR.
//! - [`Condition`]: the validated form stored in a plan. Every name is a
//!   catalog token and every operator is a closed [`Operator`] variant.
//!
//! [`Filter::resolve`] turns the first into the second. Operators are parsed
//! before any name is looked up, so an unknown operator is reported even when
//! the field is also wrong. Empty AND/OR groups resolve to `None` and are never
//! attached to a plan.
//!
//! # Example
//! ```ignore
//! use sqlplan::Filter;
//!
//! let f = Filter::and(vec![
//!     Filter::compare("age", ">=", "lo"),
//!     Filter::compare("age", "<=", "hi"),
//! ]);
//! ```

use crate::catalog::{FieldRef, ParamRef, SchemaCatalog};
use crate::error::{ValidationError, ValidationKind};
use std::fmt;
use std::str::FromStr;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    /// `!=` (also parsed from `<>`)
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    ILike,
    NotILike,
    /// Membership against one array parameter.
    In,
    NotIn,
    /// `~`
    Regex,
    /// `~*`
    RegexI,
    /// `!~`
    NotRegex,
    /// `!~*`
    NotRegexI,
    /// `@>`
    Contains,
    /// `<@`
    ContainedBy,
    /// `&&`
    Overlaps,
    /// `<->`
    L2Distance,
    /// `<#>`
    InnerProduct,
    /// `<=>`
    CosineDistance,
}

impl Operator {
    /// Parse an operator token, case-insensitively and with whitespace
    /// collapsed (`"not   like"` parses as `NOT LIKE`).
    pub fn parse(s: &str) -> Option<Self> {
        let norm = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let op = match norm.as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "ILIKE" => Operator::ILike,
            "NOT ILIKE" => Operator::NotILike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "~" => Operator::Regex,
            "~*" => Operator::RegexI,
            "!~" => Operator::NotRegex,
            "!~*" => Operator::NotRegexI,
            "@>" => Operator::Contains,
            "<@" => Operator::ContainedBy,
            "&&" => Operator::Overlaps,
            "<->" => Operator::L2Distance,
            "<#>" => Operator::InnerProduct,
            "<=>" => Operator::CosineDistance,
            _ => return None,
        };
        Some(op)
    }

    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Regex => "~",
            Operator::RegexI => "~*",
            Operator::NotRegex => "!~",
            Operator::NotRegexI => "!~*",
            Operator::Contains => "@>",
            Operator::ContainedBy => "<@",
            Operator::Overlaps => "&&",
            Operator::L2Distance => "<->",
            Operator::InnerProduct => "<#>",
            Operator::CosineDistance => "<=>",
        }
    }

    /// `IN` / `NOT IN`.
    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Operators that only exist in Postgres (and extensions).
    pub fn is_postgres_only(&self) -> bool {
        matches!(
            self,
            Operator::ILike
                | Operator::NotILike
                | Operator::Regex
                | Operator::RegexI
                | Operator::NotRegex
                | Operator::NotRegexI
                | Operator::Contains
                | Operator::ContainedBy
                | Operator::Overlaps
                | Operator::L2Distance
                | Operator::InnerProduct
                | Operator::CosineDistance
        )
    }
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s).ok_or_else(|| ValidationError::new(ValidationKind::Operator, s))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Aggregate function usable in select lists and HAVING conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn parse(s: &str) -> Option<Self> {
        let norm = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_ascii_uppercase();
        let f = match norm.as_str() {
            "COUNT" => AggregateFn::Count,
            "COUNT_DISTINCT" => AggregateFn::CountDistinct,
            "SUM" => AggregateFn::Sum,
            "AVG" => AggregateFn::Avg,
            "MIN" => AggregateFn::Min,
            "MAX" => AggregateFn::Max,
            _ => return None,
        };
        Some(f)
    }

    /// Function name without the argument list.
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFn::Count | AggregateFn::CountDistinct => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }

    /// Only plain `COUNT` may omit its field (`COUNT(*)`).
    pub fn allows_star(&self) -> bool {
        matches!(self, AggregateFn::Count)
    }
}

impl FromStr for AggregateFn {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateFn::parse(s)
            .ok_or_else(|| ValidationError::new(ValidationKind::AggregateFunction, s))
    }
}

/// A validated predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        field: FieldRef,
        op: Operator,
        param: ParamRef,
    },
    CompareFields {
        left: FieldRef,
        op: Operator,
        right: FieldRef,
    },
    IsNull(FieldRef),
    IsNotNull(FieldRef),
    Between {
        field: FieldRef,
        low: ParamRef,
        high: ParamRef,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    AggregateCompare {
        func: AggregateFn,
        field: Option<FieldRef>,
        op: Operator,
        param: ParamRef,
    },
}

impl Condition {
    /// Combine with `other` under AND, flattening an existing AND.
    pub fn and(self, other: Condition) -> Condition {
        match self {
            Condition::And(mut items) => {
                items.push(other);
                Condition::And(items)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    /// Whether this tree contains an aggregate comparison.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Condition::AggregateCompare { .. } => true,
            Condition::And(items) | Condition::Or(items) => items.iter().any(Self::has_aggregate),
            _ => false,
        }
    }

    /// Parameters in the order they appear.
    pub fn params(&self) -> Vec<&ParamRef> {
        let mut out = Vec::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params<'a>(&'a self, out: &mut Vec<&'a ParamRef>) {
        match self {
            Condition::Compare { param, .. } | Condition::AggregateCompare { param, .. } => {
                out.push(param)
            }
            Condition::Between { low, high, .. } => {
                out.push(low);
                out.push(high);
            }
            Condition::And(items) | Condition::Or(items) => {
                for c in items {
                    c.collect_params(out);
                }
            }
            Condition::CompareFields { .. } | Condition::IsNull(_) | Condition::IsNotNull(_) => {}
        }
    }

    pub(crate) fn prefix_params(&mut self, prefix: &str) {
        match self {
            Condition::Compare { param, .. } | Condition::AggregateCompare { param, .. } => {
                *param = param.prefixed(prefix)
            }
            Condition::Between { low, high, .. } => {
                *low = low.prefixed(prefix);
                *high = high.prefixed(prefix);
            }
            Condition::And(items) | Condition::Or(items) => {
                for c in items {
                    c.prefix_params(prefix);
                }
            }
            Condition::CompareFields { .. } | Condition::IsNull(_) | Condition::IsNotNull(_) => {}
        }
    }
}

/// An unresolved predicate, as written by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Compare {
        field: String,
        op: String,
        param: String,
    },
    CompareFields {
        left: String,
        op: String,
        right: String,
    },
    IsNull(String),
    IsNotNull(String),
    Between {
        field: String,
        low: String,
        high: String,
        negated: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    AggregateCompare {
        func: String,
        field: Option<String>,
        op: String,
        param: String,
    },
}

impl Filter {
    /// `field op :param`
    pub fn compare(field: impl Into<String>, op: impl Into<String>, param: impl Into<String>) -> Self {
        Filter::Compare {
            field: field.into(),
            op: op.into(),
            param: param.into(),
        }
    }

    /// `left op right`, both columns.
    pub fn fields(left: impl Into<String>, op: impl Into<String>, right: impl Into<String>) -> Self {
        Filter::CompareFields {
            left: left.into(),
            op: op.into(),
            right: right.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Filter::IsNotNull(field.into())
    }

    pub fn between(field: impl Into<String>, low: impl Into<String>, high: impl Into<String>) -> Self {
        Filter::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn not_between(
        field: impl Into<String>,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        Filter::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: true,
        }
    }

    pub fn and(items: Vec<Filter>) -> Self {
        Filter::And(items)
    }

    pub fn or(items: Vec<Filter>) -> Self {
        Filter::Or(items)
    }

    /// `func(field) op :param`; pass `None` for `COUNT(*)`.
    pub fn aggregate(
        func: impl Into<String>,
        field: Option<&str>,
        op: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        Filter::AggregateCompare {
            func: func.into(),
            field: field.map(str::to_string),
            op: op.into(),
            param: param.into(),
        }
    }

    /// Validate every name against `catalog`.
    ///
    /// Returns `Ok(None)` for an empty AND/OR (including groups whose children
    /// are all empty groups). The first invalid child aborts the whole group.
    pub fn resolve(&self, catalog: &dyn SchemaCatalog) -> Result<Option<Condition>, ValidationError> {
        let cond = match self {
            Filter::Compare { field, op, param } => {
                let op: Operator = op.parse()?;
                Condition::Compare {
                    field: resolve_field(catalog, field)?,
                    op,
                    param: resolve_param(catalog, param)?,
                }
            }
            Filter::CompareFields { left, op, right } => {
                let op: Operator = op.parse()?;
                Condition::CompareFields {
                    left: resolve_field(catalog, left)?,
                    op,
                    right: resolve_field(catalog, right)?,
                }
            }
            Filter::IsNull(field) => Condition::IsNull(resolve_field(catalog, field)?),
            Filter::IsNotNull(field) => Condition::IsNotNull(resolve_field(catalog, field)?),
            Filter::Between {
                field,
                low,
                high,
                negated,
            } => Condition::Between {
                field: resolve_field(catalog, field)?,
                low: resolve_param(catalog, low)?,
                high: resolve_param(catalog, high)?,
                negated: *negated,
            },
            Filter::And(items) => match resolve_group(catalog, items)? {
                Some(items) => Condition::And(items),
                None => return Ok(None),
            },
            Filter::Or(items) => match resolve_group(catalog, items)? {
                Some(items) => Condition::Or(items),
                None => return Ok(None),
            },
            Filter::AggregateCompare {
                func,
                field,
                op,
                param,
            } => {
                let func: AggregateFn = func.parse()?;
                let op: Operator = op.parse()?;
                let field = match field {
                    Some(f) => Some(resolve_field(catalog, f)?),
                    None if func.allows_star() => None,
                    None => {
                        return Err(ValidationError::new(
                            ValidationKind::Condition,
                            format!("{}() requires a field", func.as_sql()),
                        ));
                    }
                };
                Condition::AggregateCompare {
                    func,
                    field,
                    op,
                    param: resolve_param(catalog, param)?,
                }
            }
        };
        Ok(Some(cond))
    }
}

fn resolve_group(
    catalog: &dyn SchemaCatalog,
    items: &[Filter],
) -> Result<Option<Vec<Condition>>, ValidationError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(c) = item.resolve(catalog)? {
            out.push(c);
        }
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}

pub(crate) fn resolve_field(
    catalog: &dyn SchemaCatalog,
    name: &str,
) -> Result<FieldRef, ValidationError> {
    catalog
        .resolve_field(name)
        .map_err(|e| ValidationError::from_catalog(ValidationKind::Field, name, e))
}

pub(crate) fn resolve_param(
    catalog: &dyn SchemaCatalog,
    name: &str,
) -> Result<ParamRef, ValidationError> {
    catalog
        .resolve_param(name)
        .map_err(|e| ValidationError::from_catalog(ValidationKind::Param, name, e))
}

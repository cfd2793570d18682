//! The query plan: one query's clauses, validated but not yet rendered.

use crate::catalog::{FieldRef, ParamRef, TableRef};
use crate::condition::{AggregateFn, Condition};
use crate::error::{ValidationError, ValidationKind};
use std::fmt;
use std::str::FromStr;

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Select => "SELECT",
            QueryKind::Insert => "INSERT",
            QueryKind::Update => "UPDATE",
            QueryKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "ASC" | "ASCENDING" => Ok(Direction::Asc),
            "DESC" | "DESCENDING" => Ok(Direction::Desc),
            _ => Err(ValidationError::new(ValidationKind::Direction, s)),
        }
    }
}

/// Placement of NULLs in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullsOrder {
    First,
    Last,
}

impl FromStr for NullsOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "FIRST" | "NULLS FIRST" => Ok(NullsOrder::First),
            "LAST" | "NULLS LAST" => Ok(NullsOrder::Last),
            _ => Err(ValidationError::new(ValidationKind::NullsOrdering, s)),
        }
    }
}

/// What an ORDER BY term sorts on.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Field(FieldRef),
    Aggregate {
        func: AggregateFn,
        field: Option<FieldRef>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub target: OrderTarget,
    pub direction: Direction,
    pub nulls: Option<NullsOrder>,
}

/// LIMIT / OFFSET value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Literal(u64),
    Param(ParamRef),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Distinct {
    #[default]
    None,
    All,
    On(Vec<FieldRef>),
}

/// Row-locking clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Update,
    NoKeyUpdate,
    Share,
    KeyShare,
    UpdateNoWait,
    UpdateSkipLocked,
}

impl LockMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LockMode::Update => "FOR UPDATE",
            LockMode::NoKeyUpdate => "FOR NO KEY UPDATE",
            LockMode::Share => "FOR SHARE",
            LockMode::KeyShare => "FOR KEY SHARE",
            LockMode::UpdateNoWait => "FOR UPDATE NOWAIT",
            LockMode::UpdateSkipLocked => "FOR UPDATE SKIP LOCKED",
        }
    }

    /// MySQL only has the plain UPDATE/SHARE strengths.
    pub fn is_postgres_only(&self) -> bool {
        matches!(self, LockMode::NoKeyUpdate | LockMode::KeyShare)
    }
}

impl FromStr for LockMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = normalize(s);
        let body = norm.strip_prefix("FOR ").unwrap_or(&norm);
        match body {
            "UPDATE" => Ok(LockMode::Update),
            "NO KEY UPDATE" => Ok(LockMode::NoKeyUpdate),
            "SHARE" => Ok(LockMode::Share),
            "KEY SHARE" => Ok(LockMode::KeyShare),
            "UPDATE NOWAIT" => Ok(LockMode::UpdateNoWait),
            "UPDATE SKIP LOCKED" => Ok(LockMode::UpdateSkipLocked),
            _ => Err(ValidationError::new(ValidationKind::LockMode, s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Returning {
    #[default]
    None,
    All,
    Fields(Vec<FieldRef>),
}

/// Window function applied by a window select item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFn {
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    FirstValue,
    LastValue,
    Lag,
    Lead,
    Aggregate(AggregateFn),
}

impl WindowFn {
    /// Whether the function takes a column argument.
    pub fn takes_field(&self) -> bool {
        match self {
            WindowFn::RowNumber
            | WindowFn::Rank
            | WindowFn::DenseRank
            | WindowFn::PercentRank
            | WindowFn::CumeDist => false,
            WindowFn::FirstValue | WindowFn::LastValue | WindowFn::Lag | WindowFn::Lead => true,
            WindowFn::Aggregate(_) => true,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            WindowFn::RowNumber => "ROW_NUMBER",
            WindowFn::Rank => "RANK",
            WindowFn::DenseRank => "DENSE_RANK",
            WindowFn::PercentRank => "PERCENT_RANK",
            WindowFn::CumeDist => "CUME_DIST",
            WindowFn::FirstValue => "FIRST_VALUE",
            WindowFn::LastValue => "LAST_VALUE",
            WindowFn::Lag => "LAG",
            WindowFn::Lead => "LEAD",
            WindowFn::Aggregate(f) => f.as_sql(),
        }
    }
}

impl FromStr for WindowFn {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = normalize(s).replace(' ', "_");
        let f = match norm.as_str() {
            "ROW_NUMBER" => WindowFn::RowNumber,
            "RANK" => WindowFn::Rank,
            "DENSE_RANK" => WindowFn::DenseRank,
            "PERCENT_RANK" => WindowFn::PercentRank,
            "CUME_DIST" => WindowFn::CumeDist,
            "FIRST_VALUE" => WindowFn::FirstValue,
            "LAST_VALUE" => WindowFn::LastValue,
            "LAG" => WindowFn::Lag,
            "LEAD" => WindowFn::Lead,
            other => match AggregateFn::parse(other) {
                Some(agg) => WindowFn::Aggregate(agg),
                None => return Err(ValidationError::new(ValidationKind::WindowFunction, s)),
            },
        };
        Ok(f)
    }
}

/// One end of a window frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameBound {
    UnboundedPreceding,
    CurrentRow,
    UnboundedFollowing,
}

impl FrameBound {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING",
            FrameBound::CurrentRow => "CURRENT ROW",
            FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING",
        }
    }
}

impl FromStr for FrameBound {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "UNBOUNDED PRECEDING" => Ok(FrameBound::UnboundedPreceding),
            "CURRENT ROW" => Ok(FrameBound::CurrentRow),
            "UNBOUNDED FOLLOWING" => Ok(FrameBound::UnboundedFollowing),
            _ => Err(ValidationError::new(ValidationKind::FrameBound, s)),
        }
    }
}

/// `ROWS BETWEEN start AND end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub start: FrameBound,
    pub end: FrameBound,
}

/// `func(field) OVER (PARTITION BY ... ORDER BY ... frame) AS alias`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowExpr {
    pub func: WindowFn,
    pub field: Option<FieldRef>,
    pub partition_by: Vec<FieldRef>,
    pub order_by: Vec<OrderTerm>,
    pub frame: Option<Frame>,
    pub alias: Option<String>,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Field(FieldRef),
    Aggregate {
        func: AggregateFn,
        field: Option<FieldRef>,
        alias: Option<String>,
    },
    Window(WindowExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// `ON CONFLICT (...) DO NOTHING`
    Ignore,
    /// `ON CONFLICT (...) DO UPDATE SET f = EXCLUDED.f`
    Update(Vec<FieldRef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSpec {
    pub columns: Vec<FieldRef>,
    pub resolution: ConflictResolution,
}

/// One query's clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub kind: QueryKind,
    pub table: TableRef,
    /// Empty means `*`.
    pub select: Vec<SelectItem>,
    pub filter: Option<Condition>,
    pub group_by: Vec<FieldRef>,
    pub having: Option<Condition>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<Bound>,
    pub offset: Option<Bound>,
    pub distinct: Distinct,
    pub lock: Option<LockMode>,
    pub returning: Returning,
    pub values: Vec<(FieldRef, ParamRef)>,
    pub sets: Vec<(FieldRef, ParamRef)>,
    pub conflict: Option<ConflictSpec>,
}

impl QueryPlan {
    pub fn new(kind: QueryKind, table: TableRef) -> Self {
        Self {
            kind,
            table,
            select: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: Distinct::None,
            lock: None,
            returning: Returning::None,
            values: Vec::new(),
            sets: Vec::new(),
            conflict: None,
        }
    }

    /// AND `cond` onto the WHERE clause.
    pub fn push_filter(&mut self, cond: Condition) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
    }

    /// AND `cond` onto the HAVING clause.
    pub fn push_having(&mut self, cond: Condition) {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
    }

    /// Move every parameter reference into `prefix`'s namespace.
    pub(crate) fn prefix_params(&mut self, prefix: &str) {
        if let Some(c) = self.filter.as_mut() {
            c.prefix_params(prefix);
        }
        if let Some(c) = self.having.as_mut() {
            c.prefix_params(prefix);
        }
        for bound in [self.limit.as_mut(), self.offset.as_mut()].into_iter().flatten() {
            if let Bound::Param(p) = bound {
                *p = p.prefixed(prefix);
            }
        }
        for (_, p) in self.values.iter_mut().chain(self.sets.iter_mut()) {
            *p = p.prefixed(prefix);
        }
    }
}

/// Set operator joining compound operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::IntersectAll => "INTERSECT ALL",
            SetOperator::Except => "EXCEPT",
            SetOperator::ExceptAll => "EXCEPT ALL",
        }
    }
}

/// Select plans joined by set operators, with top-level paging.
///
/// Operand parameters are already namespaced when a `CompoundPlan` reaches
/// the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundPlan {
    pub first: QueryPlan,
    pub rest: Vec<(SetOperator, QueryPlan)>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<Bound>,
    pub offset: Option<Bound>,
}

//! Rendering plans into dialect SQL with named placeholders.
//!
//! Output SQL references parameters as `:name`. [`RenderedQuery::params`]
//! lists each distinct name once, in the order it first appears; executors
//! bind values from a [`Params`](crate::Params) set in that order.
//!
//! The renderer is also where the last-moment safety checks live: an UPDATE
//! or DELETE without a WHERE condition never renders, and neither does a plan
//! that mixes tokens from two catalogs.

use crate::catalog::{CatalogId, FieldRef, ParamRef, TableRef};
use crate::condition::{AggregateFn, Condition, Operator};
use crate::error::{BuilderKind, PlanError, PlanResult};
use crate::ident::write_quoted;
use crate::plan::{
    Bound, CompoundPlan, ConflictResolution, Direction, Distinct, NullsOrder, OrderTarget,
    OrderTerm, QueryKind, QueryPlan, Returning, SelectItem, SetOperator, WindowExpr, WindowFn,
};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn quote_char(&self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Dialect::Postgres => Capabilities {
                native_upsert: true,
                returning: true,
                returning_on_update: true,
                distinct_on: true,
                nulls_ordering: true,
                row_locking: true,
            },
            Dialect::Sqlite => Capabilities {
                native_upsert: true,
                returning: true,
                returning_on_update: true,
                distinct_on: false,
                nulls_ordering: true,
                row_locking: false,
            },
            Dialect::MySql => Capabilities {
                native_upsert: false,
                returning: false,
                returning_on_update: false,
                distinct_on: false,
                nulls_ordering: false,
                row_locking: true,
            },
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
        })
    }
}

/// Per-dialect feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `INSERT ... ON CONFLICT`
    pub native_upsert: bool,
    /// `RETURNING` on INSERT and DELETE
    pub returning: bool,
    /// `RETURNING` on UPDATE
    pub returning_on_update: bool,
    pub distinct_on: bool,
    /// `NULLS FIRST` / `NULLS LAST`
    pub nulls_ordering: bool,
    /// `FOR UPDATE` and friends
    pub row_locking: bool,
}

/// SQL text plus the parameter names it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub sql: String,
    /// Distinct names, in first-reference order.
    pub params: Vec<String>,
    /// Target table, for observability.
    pub table: String,
    pub kind: QueryKind,
}

impl RenderedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for RenderedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A plan the renderer cannot turn into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("'{name}' was resolved by {found}, but the plan's table belongs to {expected}")]
    ForeignToken {
        name: String,
        expected: CatalogId,
        found: CatalogId,
    },

    #[error("{feature} is not supported by {dialect}")]
    Unsupported {
        feature: &'static str,
        dialect: Dialect,
    },

    #[error("UPDATE on \"{0}\" has no SET clause")]
    EmptySet(String),

    #[error("INSERT into \"{0}\" has no values")]
    EmptyInsert(String),

    #[error("compound query has no operands")]
    EmptyCompound,

    #[error("compound operand must be a SELECT, got {0}")]
    CompoundOperand(QueryKind),
}

/// Turns plans into SQL for one dialect.
pub trait Renderer: Send + Sync + fmt::Debug {
    fn dialect(&self) -> Dialect;

    fn capabilities(&self) -> Capabilities {
        self.dialect().capabilities()
    }

    fn render(&self, plan: &QueryPlan) -> PlanResult<RenderedQuery>;

    fn render_compound(&self, plan: &CompoundPlan) -> PlanResult<RenderedQuery>;
}

/// The built-in renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlRenderer {
    dialect: Dialect,
}

impl SqlRenderer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn postgres() -> Self {
        Self::new(Dialect::Postgres)
    }

    pub fn sqlite() -> Self {
        Self::new(Dialect::Sqlite)
    }

    pub fn mysql() -> Self {
        Self::new(Dialect::MySql)
    }
}

impl Default for SqlRenderer {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Renderer for SqlRenderer {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn render(&self, plan: &QueryPlan) -> PlanResult<RenderedQuery> {
        let mut w = Writer::new(self.dialect, plan.table.catalog());
        match plan.kind {
            QueryKind::Select => w.select(plan)?,
            QueryKind::Insert => w.insert(plan)?,
            QueryKind::Update => w.update(plan)?,
            QueryKind::Delete => w.delete(plan)?,
        }
        Ok(w.finish(&plan.table, plan.kind))
    }

    fn render_compound(&self, plan: &CompoundPlan) -> PlanResult<RenderedQuery> {
        let mut w = Writer::new(self.dialect, plan.first.table.catalog());
        // SQLite rejects parenthesized compound operands.
        let wrap = self.dialect != Dialect::Sqlite;

        let operands = std::iter::once((None, &plan.first))
            .chain(plan.rest.iter().map(|(op, p)| (Some(*op), p)));
        for (op, operand) in operands {
            if operand.kind != QueryKind::Select {
                return Err(RenderError::CompoundOperand(operand.kind).into());
            }
            if let Some(op) = op {
                if self.dialect == Dialect::Sqlite
                    && matches!(op, SetOperator::IntersectAll | SetOperator::ExceptAll)
                {
                    return Err(w.unsupported(op.as_sql()));
                }
                w.push(" ");
                w.push(op.as_sql());
                w.push(" ");
            }
            if !wrap
                && (!operand.order_by.is_empty()
                    || operand.limit.is_some()
                    || operand.offset.is_some())
            {
                return Err(w.unsupported("ORDER BY/LIMIT inside a compound operand"));
            }
            if wrap {
                w.push("(");
            }
            w.select(operand)?;
            if wrap {
                w.push(")");
            }
        }

        w.order_by(&plan.order_by)?;
        w.paging(plan.limit.as_ref(), plan.offset.as_ref())?;
        Ok(w.finish(&plan.first.table, QueryKind::Select))
    }
}

struct Writer {
    dialect: Dialect,
    caps: Capabilities,
    catalog: CatalogId,
    sql: String,
    params: Vec<String>,
    seen: HashSet<String>,
}

impl Writer {
    fn new(dialect: Dialect, catalog: CatalogId) -> Self {
        Self {
            dialect,
            caps: dialect.capabilities(),
            catalog,
            sql: String::with_capacity(128),
            params: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn finish(self, table: &TableRef, kind: QueryKind) -> RenderedQuery {
        RenderedQuery {
            sql: self.sql,
            params: self.params,
            table: table.name(),
            kind,
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn unsupported(&self, feature: &'static str) -> PlanError {
        RenderError::Unsupported {
            feature,
            dialect: self.dialect,
        }
        .into()
    }

    fn check(&self, name: &str, found: CatalogId) -> PlanResult<()> {
        if found == self.catalog {
            Ok(())
        } else {
            Err(RenderError::ForeignToken {
                name: name.to_string(),
                expected: self.catalog,
                found,
            }
            .into())
        }
    }

    fn table(&mut self, t: &TableRef) -> PlanResult<()> {
        self.check(&t.name(), t.catalog())?;
        t.ident().write_sql(&mut self.sql, self.dialect.quote_char());
        Ok(())
    }

    fn field(&mut self, f: &FieldRef) -> PlanResult<()> {
        self.check(f.name(), f.catalog())?;
        write_quoted(&mut self.sql, f.name(), self.dialect.quote_char());
        Ok(())
    }

    fn fields(&mut self, fields: &[FieldRef]) -> PlanResult<()> {
        for (i, f) in fields.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.field(f)?;
        }
        Ok(())
    }

    fn param(&mut self, p: &ParamRef) -> PlanResult<()> {
        self.check(p.name(), p.catalog())?;
        self.sql.push(':');
        self.sql.push_str(p.name());
        if self.seen.insert(p.name().to_string()) {
            self.params.push(p.name().to_string());
        }
        Ok(())
    }

    fn alias(&mut self, alias: &Option<String>) {
        if let Some(a) = alias {
            self.push(" AS ");
            write_quoted(&mut self.sql, a, self.dialect.quote_char());
        }
    }

    fn aggregate(&mut self, func: AggregateFn, field: Option<&FieldRef>) -> PlanResult<()> {
        self.push(func.as_sql());
        self.push("(");
        match field {
            Some(f) => {
                if func == AggregateFn::CountDistinct {
                    self.push("DISTINCT ");
                }
                self.field(f)?;
            }
            None => self.push("*"),
        }
        self.push(")");
        Ok(())
    }

    fn operator(&self, op: Operator) -> PlanResult<()> {
        if op.is_postgres_only() && self.dialect != Dialect::Postgres {
            return Err(self.unsupported(op.as_sql()));
        }
        Ok(())
    }

    /// Text between the left operand and the right one.
    fn op_open(&mut self, op: Operator) {
        match (op, self.dialect) {
            (Operator::In, Dialect::Postgres) => self.push(" = ANY("),
            (Operator::NotIn, Dialect::Postgres) => self.push(" <> ALL("),
            (Operator::In, _) => self.push(" IN ("),
            (Operator::NotIn, _) => self.push(" NOT IN ("),
            (other, _) => {
                self.push(" ");
                self.push(other.as_sql());
                self.push(" ");
            }
        }
    }

    fn op_close(&mut self, op: Operator) {
        if op.is_membership() {
            self.push(")");
        }
    }

    fn condition(&mut self, cond: &Condition, nested: bool) -> PlanResult<()> {
        match cond {
            Condition::Compare { field, op, param } => {
                self.operator(*op)?;
                self.field(field)?;
                self.op_open(*op);
                self.param(param)?;
                self.op_close(*op);
            }
            Condition::CompareFields { left, op, right } => {
                self.operator(*op)?;
                self.field(left)?;
                self.op_open(*op);
                self.field(right)?;
                self.op_close(*op);
            }
            Condition::IsNull(field) => {
                self.field(field)?;
                self.push(" IS NULL");
            }
            Condition::IsNotNull(field) => {
                self.field(field)?;
                self.push(" IS NOT NULL");
            }
            Condition::Between {
                field,
                low,
                high,
                negated,
            } => {
                self.field(field)?;
                self.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.param(low)?;
                self.push(" AND ");
                self.param(high)?;
            }
            Condition::And(items) | Condition::Or(items) => {
                if let [only] = items.as_slice() {
                    return self.condition(only, nested);
                }
                let joiner = if matches!(cond, Condition::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                if nested {
                    self.push("(");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(joiner);
                    }
                    self.condition(item, true)?;
                }
                if nested {
                    self.push(")");
                }
            }
            Condition::AggregateCompare {
                func,
                field,
                op,
                param,
            } => {
                self.operator(*op)?;
                self.aggregate(*func, field.as_ref())?;
                self.op_open(*op);
                self.param(param)?;
                self.op_close(*op);
            }
        }
        Ok(())
    }

    fn where_clause(&mut self, filter: Option<&Condition>) -> PlanResult<()> {
        if let Some(c) = filter {
            self.push(" WHERE ");
            self.condition(c, false)?;
        }
        Ok(())
    }

    fn order_terms(&mut self, terms: &[OrderTerm]) -> PlanResult<()> {
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match &term.target {
                OrderTarget::Field(f) => self.field(f)?,
                OrderTarget::Aggregate { func, field } => self.aggregate(*func, field.as_ref())?,
            }
            self.push(match term.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
            if let Some(nulls) = term.nulls {
                if !self.caps.nulls_ordering {
                    return Err(self.unsupported("NULLS FIRST/LAST"));
                }
                self.push(match nulls {
                    NullsOrder::First => " NULLS FIRST",
                    NullsOrder::Last => " NULLS LAST",
                });
            }
        }
        Ok(())
    }

    fn order_by(&mut self, terms: &[OrderTerm]) -> PlanResult<()> {
        if !terms.is_empty() {
            self.push(" ORDER BY ");
            self.order_terms(terms)?;
        }
        Ok(())
    }

    fn bound(&mut self, b: &Bound) -> PlanResult<()> {
        match b {
            Bound::Literal(n) => {
                self.push(&n.to_string());
                Ok(())
            }
            Bound::Param(p) => self.param(p),
        }
    }

    fn paging(&mut self, limit: Option<&Bound>, offset: Option<&Bound>) -> PlanResult<()> {
        match limit {
            Some(l) => {
                self.push(" LIMIT ");
                self.bound(l)?;
            }
            // OFFSET alone is not valid in SQLite or MySQL.
            None if offset.is_some() => match self.dialect {
                Dialect::Postgres => {}
                Dialect::Sqlite => self.push(" LIMIT -1"),
                Dialect::MySql => self.push(" LIMIT 18446744073709551615"),
            },
            None => {}
        }
        if let Some(o) = offset {
            self.push(" OFFSET ");
            self.bound(o)?;
        }
        Ok(())
    }

    fn window(&mut self, w: &WindowExpr) -> PlanResult<()> {
        self.push(w.func.as_sql());
        self.push("(");
        match (&w.func, &w.field) {
            (_, Some(f)) => self.field(f)?,
            (WindowFn::Aggregate(AggregateFn::Count), None) => self.push("*"),
            (_, None) => {}
        }
        self.push(") OVER (");

        let mut sep = "";
        if !w.partition_by.is_empty() {
            self.push("PARTITION BY ");
            self.fields(&w.partition_by)?;
            sep = " ";
        }
        if !w.order_by.is_empty() {
            self.push(sep);
            self.push("ORDER BY ");
            self.order_terms(&w.order_by)?;
            sep = " ";
        }
        if let Some(frame) = &w.frame {
            self.push(sep);
            self.push("ROWS BETWEEN ");
            self.push(frame.start.as_sql());
            self.push(" AND ");
            self.push(frame.end.as_sql());
        }
        self.push(")");
        self.alias(&w.alias);
        Ok(())
    }

    fn select_item(&mut self, item: &SelectItem) -> PlanResult<()> {
        match item {
            SelectItem::Field(f) => self.field(f),
            SelectItem::Aggregate { func, field, alias } => {
                self.aggregate(*func, field.as_ref())?;
                self.alias(alias);
                Ok(())
            }
            SelectItem::Window(w) => self.window(w),
        }
    }

    fn returning(&mut self, returning: &Returning, supported: bool) -> PlanResult<()> {
        match returning {
            Returning::None => Ok(()),
            _ if !supported => Err(self.unsupported("RETURNING")),
            Returning::All => {
                self.push(" RETURNING *");
                Ok(())
            }
            Returning::Fields(fields) => {
                self.push(" RETURNING ");
                self.fields(fields)
            }
        }
    }

    fn select(&mut self, plan: &QueryPlan) -> PlanResult<()> {
        self.push("SELECT ");
        match &plan.distinct {
            Distinct::None => {}
            Distinct::All => self.push("DISTINCT "),
            Distinct::On(fields) => {
                if !self.caps.distinct_on {
                    return Err(self.unsupported("DISTINCT ON"));
                }
                self.push("DISTINCT ON (");
                self.fields(fields)?;
                self.push(") ");
            }
        }

        if plan.select.is_empty() {
            self.push("*");
        } else {
            for (i, item) in plan.select.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.select_item(item)?;
            }
        }

        self.push(" FROM ");
        self.table(&plan.table)?;
        self.where_clause(plan.filter.as_ref())?;

        if !plan.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.fields(&plan.group_by)?;
        }
        if let Some(having) = &plan.having {
            self.push(" HAVING ");
            self.condition(having, false)?;
        }

        self.order_by(&plan.order_by)?;
        self.paging(plan.limit.as_ref(), plan.offset.as_ref())?;

        if let Some(lock) = plan.lock {
            if !self.caps.row_locking
                || (lock.is_postgres_only() && self.dialect != Dialect::Postgres)
            {
                return Err(self.unsupported(lock.as_sql()));
            }
            self.push(" ");
            self.push(lock.as_sql());
        }
        Ok(())
    }

    fn insert(&mut self, plan: &QueryPlan) -> PlanResult<()> {
        if plan.values.is_empty() {
            return Err(RenderError::EmptyInsert(plan.table.name()).into());
        }
        self.push("INSERT INTO ");
        self.table(&plan.table)?;
        self.push(" (");
        for (i, (field, _)) in plan.values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.field(field)?;
        }
        self.push(") VALUES (");
        for (i, (_, param)) in plan.values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.param(param)?;
        }
        self.push(")");

        if let Some(conflict) = &plan.conflict {
            if !self.caps.native_upsert {
                return Err(self.unsupported("ON CONFLICT"));
            }
            self.push(" ON CONFLICT");
            if !conflict.columns.is_empty() {
                self.push(" (");
                self.fields(&conflict.columns)?;
                self.push(")");
            }
            match &conflict.resolution {
                ConflictResolution::Ignore => self.push(" DO NOTHING"),
                ConflictResolution::Update(fields) => {
                    self.push(" DO UPDATE SET ");
                    let quote = self.dialect.quote_char();
                    for (i, f) in fields.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.field(f)?;
                        self.push(" = EXCLUDED.");
                        write_quoted(&mut self.sql, f.name(), quote);
                    }
                }
            }
        }

        self.returning(&plan.returning, self.caps.returning)
    }

    fn update(&mut self, plan: &QueryPlan) -> PlanResult<()> {
        if plan.filter.is_none() {
            return Err(PlanError::UnsafeOperation {
                kind: BuilderKind::Update,
                table: plan.table.name(),
            });
        }
        if plan.sets.is_empty() {
            return Err(RenderError::EmptySet(plan.table.name()).into());
        }
        self.push("UPDATE ");
        self.table(&plan.table)?;
        self.push(" SET ");
        for (i, (field, param)) in plan.sets.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.field(field)?;
            self.push(" = ");
            self.param(param)?;
        }
        self.where_clause(plan.filter.as_ref())?;
        self.returning(&plan.returning, self.caps.returning_on_update)
    }

    fn delete(&mut self, plan: &QueryPlan) -> PlanResult<()> {
        if plan.filter.is_none() {
            return Err(PlanError::UnsafeOperation {
                kind: BuilderKind::Delete,
                table: plan.table.name(),
            });
        }
        self.push("DELETE FROM ");
        self.table(&plan.table)?;
        self.where_clause(plan.filter.as_ref())?;
        self.returning(&plan.returning, self.caps.returning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Column, SchemaCatalog};
    use crate::condition::Filter;
    use crate::plan::{ConflictSpec, Frame, FrameBound, LockMode};

    fn users() -> Catalog {
        Catalog::new("users", ["id", "email", "name", "age"].map(Column::new)).unwrap()
    }

    fn select(c: &Catalog) -> QueryPlan {
        QueryPlan::new(QueryKind::Select, c.table())
    }

    fn cond(c: &Catalog, f: Filter) -> Condition {
        f.resolve(c).unwrap().unwrap()
    }

    #[test]
    fn select_star_with_where() {
        let c = users();
        let mut plan = select(&c);
        plan.push_filter(cond(&c, Filter::compare("age", ">=", "min_age")));
        let q = SqlRenderer::postgres().render(&plan).unwrap();
        assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "age" >= :min_age"#);
        assert_eq!(q.params, ["min_age"]);
        assert_eq!(q.table, "users");
    }

    #[test]
    fn repeated_param_listed_once() {
        let c = users();
        let mut plan = select(&c);
        plan.push_filter(cond(
            &c,
            Filter::or(vec![
                Filter::compare("name", "=", "q"),
                Filter::compare("email", "=", "q"),
            ]),
        ));
        plan.push_filter(cond(&c, Filter::compare("age", ">", "a")));
        let q = SqlRenderer::postgres().render(&plan).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT * FROM "users" WHERE ("name" = :q OR "email" = :q) AND "age" > :a"#
        );
        assert_eq!(q.params, ["q", "a"]);
    }

    #[test]
    fn membership_depends_on_dialect() {
        let c = users();
        let mut plan = select(&c);
        plan.push_filter(cond(&c, Filter::compare("id", "in", "ids")));
        let pg = SqlRenderer::postgres().render(&plan).unwrap();
        assert_eq!(pg.sql, r#"SELECT * FROM "users" WHERE "id" = ANY(:ids)"#);
        let my = SqlRenderer::mysql().render(&plan).unwrap();
        assert_eq!(my.sql, "SELECT * FROM `users` WHERE `id` IN (:ids)");
    }

    #[test]
    fn postgres_only_operator_rejected_elsewhere() {
        let c = users();
        let mut plan = select(&c);
        plan.push_filter(cond(&c, Filter::compare("name", "ilike", "p")));
        let err = SqlRenderer::sqlite().render(&plan).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Render(RenderError::Unsupported { feature: "ILIKE", .. })
        ));
    }

    #[test]
    fn offset_without_limit() {
        let c = users();
        let mut plan = select(&c);
        plan.offset = Some(Bound::Literal(20));
        assert_eq!(
            SqlRenderer::postgres().render(&plan).unwrap().sql,
            r#"SELECT * FROM "users" OFFSET 20"#
        );
        assert_eq!(
            SqlRenderer::sqlite().render(&plan).unwrap().sql,
            r#"SELECT * FROM "users" LIMIT -1 OFFSET 20"#
        );
    }

    #[test]
    fn update_and_delete_need_where() {
        let c = users();
        let mut plan = QueryPlan::new(QueryKind::Update, c.table());
        plan.sets
            .push((c.resolve_field("name").unwrap(), c.resolve_param("name").unwrap()));
        let err = SqlRenderer::postgres().render(&plan).unwrap_err();
        assert!(err.is_unsafe());

        plan.push_filter(cond(&c, Filter::compare("id", "=", "id")));
        let q = SqlRenderer::postgres().render(&plan).unwrap();
        assert_eq!(q.sql, r#"UPDATE "users" SET "name" = :name WHERE "id" = :id"#);
        assert_eq!(q.params, ["name", "id"]);

        let del = QueryPlan::new(QueryKind::Delete, c.table());
        assert!(matches!(
            SqlRenderer::postgres().render(&del),
            Err(PlanError::UnsafeOperation {
                kind: BuilderKind::Delete,
                ..
            })
        ));
    }

    #[test]
    fn update_without_set_is_rejected() {
        let c = users();
        let mut plan = QueryPlan::new(QueryKind::Update, c.table());
        plan.push_filter(cond(&c, Filter::compare("id", "=", "id")));
        assert!(matches!(
            SqlRenderer::postgres().render(&plan),
            Err(PlanError::Render(RenderError::EmptySet(_)))
        ));
    }

    #[test]
    fn native_upsert() {
        let c = users();
        let mut plan = QueryPlan::new(QueryKind::Insert, c.table());
        for name in ["email", "name"] {
            plan.values
                .push((c.resolve_field(name).unwrap(), c.resolve_param(name).unwrap()));
        }
        plan.conflict = Some(ConflictSpec {
            columns: vec![c.resolve_field("email").unwrap()],
            resolution: ConflictResolution::Update(vec![c.resolve_field("name").unwrap()]),
        });
        plan.returning = Returning::All;
        let q = SqlRenderer::postgres().render(&plan).unwrap();
        assert_eq!(
            q.sql,
            r#"INSERT INTO "users" ("email", "name") VALUES (:email, :name) ON CONFLICT ("email") DO UPDATE SET "name" = EXCLUDED."name" RETURNING *"#
        );

        let err = SqlRenderer::mysql().render(&plan).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Render(RenderError::Unsupported { feature: "ON CONFLICT", .. })
        ));
    }

    #[test]
    fn returning_requires_capability() {
        let c = users();
        let mut plan = QueryPlan::new(QueryKind::Delete, c.table());
        plan.push_filter(cond(&c, Filter::compare("id", "=", "id")));
        plan.returning = Returning::Fields(vec![c.resolve_field("id").unwrap()]);
        assert_eq!(
            SqlRenderer::postgres().render(&plan).unwrap().sql,
            r#"DELETE FROM "users" WHERE "id" = :id RETURNING "id""#
        );
        assert!(SqlRenderer::mysql().render(&plan).is_err());
    }

    #[test]
    fn foreign_tokens_are_rejected() {
        let a = users();
        let b = users();
        let mut plan = select(&a);
        plan.push_filter(cond(&b, Filter::compare("age", ">", "x")));
        let err = SqlRenderer::postgres().render(&plan).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Render(RenderError::ForeignToken { .. })
        ));
    }

    #[test]
    fn window_item() {
        let c = users();
        let mut plan = select(&c);
        plan.select.push(SelectItem::Field(c.resolve_field("id").unwrap()));
        plan.select.push(SelectItem::Window(WindowExpr {
            func: WindowFn::Aggregate(AggregateFn::Sum),
            field: Some(c.resolve_field("age").unwrap()),
            partition_by: vec![c.resolve_field("name").unwrap()],
            order_by: vec![OrderTerm {
                target: OrderTarget::Field(c.resolve_field("id").unwrap()),
                direction: Direction::Asc,
                nulls: None,
            }],
            frame: Some(Frame {
                start: FrameBound::UnboundedPreceding,
                end: FrameBound::CurrentRow,
            }),
            alias: Some("running".into()),
        }));
        let q = SqlRenderer::postgres().render(&plan).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "id", SUM("age") OVER (PARTITION BY "name" ORDER BY "id" ASC ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS "running" FROM "users""#
        );
    }

    #[test]
    fn locking_and_distinct_on_are_capability_checked() {
        let c = users();
        let mut plan = select(&c);
        plan.lock = Some(LockMode::NoKeyUpdate);
        assert!(SqlRenderer::postgres().render(&plan).is_ok());
        assert!(SqlRenderer::mysql().render(&plan).is_err());
        assert!(SqlRenderer::sqlite().render(&plan).is_err());

        let mut plan = select(&c);
        plan.distinct = Distinct::On(vec![c.resolve_field("email").unwrap()]);
        assert_eq!(
            SqlRenderer::postgres().render(&plan).unwrap().sql,
            r#"SELECT DISTINCT ON ("email") * FROM "users""#
        );
        assert!(SqlRenderer::sqlite().render(&plan).is_err());
    }

    #[test]
    fn sqlite_compound_operands_are_bare() {
        let c = users();
        let compound = CompoundPlan {
            first: select(&c),
            rest: vec![(SetOperator::Except, select(&c))],
            order_by: Vec::new(),
            limit: Some(Bound::Literal(5)),
            offset: None,
        };
        assert_eq!(
            SqlRenderer::sqlite().render_compound(&compound).unwrap().sql,
            r#"SELECT * FROM "users" EXCEPT SELECT * FROM "users" LIMIT 5"#
        );
        assert_eq!(
            SqlRenderer::postgres().render_compound(&compound).unwrap().sql,
            r#"(SELECT * FROM "users") EXCEPT (SELECT * FROM "users") LIMIT 5"#
        );
    }
}

use crate::catalog::Catalog;
use crate::condition::Filter;
use crate::config::{TableConfig, UpsertFallback};
use crate::error::{BuilderKind, PlanError, PlanResult, QueryPhase, ValidationKind};
use crate::model::{ColumnDef, Model};
use crate::plan::{CompoundPlan, QueryPlan};
use crate::qb::{PlanQb, WhereQb};
use crate::render::{Capabilities, Dialect, RenderError, RenderedQuery, Renderer, SqlRenderer};
use crate::row::{FromRow, Row};
use crate::table::Table;
use crate::testing::{MockExecutor, row};
use crate::value::{Params, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    email: String,
    name: Option<String>,
    age: i32,
}

const USER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id").primary_key().generated(),
    ColumnDef::new("email"),
    ColumnDef::new("name").nullable(),
    ColumnDef::new("age"),
];

impl FromRow for User {
    fn from_row(row: &Row) -> PlanResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            email: row.try_get_column("email")?,
            name: row.try_get_column("name")?,
            age: row.try_get_column("age")?,
        })
    }
}

impl Model for User {
    const TABLE: &'static str = "users";

    fn columns() -> &'static [ColumnDef] {
        USER_COLUMNS
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("id", self.id)
            .with("email", self.email.clone())
            .with("name", self.name.clone())
            .with("age", self.age)
    }
}

fn ada() -> User {
    User {
        id: 1,
        email: "ada@example.com".into(),
        name: Some("Ada".into()),
        age: 36,
    }
}

fn user_row(u: &User) -> Row {
    row([
        ("id", Value::Int(u.id)),
        ("email", Value::from(u.email.as_str())),
        ("name", Value::from(u.name.clone())),
        ("age", Value::Int(u.age.into())),
    ])
}

fn users() -> Table<User> {
    Table::postgres().unwrap()
}

/// Postgres SQL, but reports no native upsert.
#[derive(Debug)]
struct NoUpsert(SqlRenderer);

impl Renderer for NoUpsert {
    fn dialect(&self) -> Dialect {
        self.0.dialect()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_upsert: false,
            ..self.0.capabilities()
        }
    }

    fn render(&self, plan: &QueryPlan) -> PlanResult<RenderedQuery> {
        self.0.render(plan)
    }

    fn render_compound(&self, plan: &CompoundPlan) -> PlanResult<RenderedQuery> {
        self.0.render_compound(plan)
    }
}

fn users_without_upsert() -> Table<User> {
    Table::from_parts(
        Arc::new(Catalog::for_model::<User>().unwrap()),
        Arc::new(NoUpsert(SqlRenderer::postgres())),
    )
}

// ==================== select ====================

#[test]
fn select_single_comparison() {
    let q = users()
        .select()
        .where_("age", ">=", "min_age")
        .render()
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "age" >= :min_age"#);
    assert_eq!(q.params, ["min_age"]);
}

#[test]
fn select_and_group_then_order() {
    let q = users()
        .select()
        .where_and(vec![
            Filter::compare("age", ">=", "lo"),
            Filter::compare("age", "<=", "hi"),
        ])
        .order_by("name", "asc")
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT * FROM "users" WHERE "age" >= :lo AND "age" <= :hi ORDER BY "name" ASC"#
    );
    assert_eq!(q.params, ["lo", "hi"]);
}

#[test]
fn successive_filters_are_and_combined() {
    let q = users()
        .select()
        .where_or(vec![
            Filter::is_null("name"),
            Filter::compare("name", "like", "pattern"),
        ])
        .where_between("age", "lo", "hi")
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT * FROM "users" WHERE ("name" IS NULL OR "name" LIKE :pattern) AND "age" BETWEEN :lo AND :hi"#
    );
}

#[test]
fn select_paging_distinct_and_lock() {
    let q = users()
        .select()
        .select_fields(&["id", "email"])
        .distinct()
        .limit_param("page_size")
        .offset(40)
        .lock("for update skip locked")
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT DISTINCT "id", "email" FROM "users" LIMIT :page_size OFFSET 40 FOR UPDATE SKIP LOCKED"#
    );
}

#[test]
fn first_error_wins_and_later_calls_are_skipped() {
    let qb = users()
        .select()
        .where_("nope", "=", "x")
        .order_by("name", "sideways")
        .where_("age", "~~", "y");
    let err = qb.render().unwrap_err();
    assert_eq!(err.builder_kind(), Some(BuilderKind::Select));
    assert_eq!(err.validation_kind(), Some(ValidationKind::Field));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn operator_is_checked_before_names() {
    let err = users()
        .select()
        .where_("nope", "~~", "x")
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Operator));
}

#[test]
fn aggregate_comparison_rejected_in_where() {
    let err = users()
        .select()
        .filter(Filter::aggregate("count", None, ">", "n"))
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Condition));
}

#[test]
fn empty_groups_are_not_attached() {
    let q = users()
        .select()
        .where_and(vec![])
        .where_or(vec![Filter::and(vec![])])
        .render()
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users""#);
}

#[test]
fn distinct_on_is_postgres_only() {
    let sqlite = Table::<User>::new(Dialect::Sqlite).unwrap();
    let err = sqlite
        .select()
        .distinct_on(&["email"])
        .render()
        .unwrap_err();
    assert!(matches!(
        err,
        PlanError::Render(RenderError::Unsupported {
            feature: "DISTINCT ON",
            ..
        })
    ));
}

#[test]
fn rendering_is_deterministic() {
    let qb = users()
        .select()
        .where_("email", "in", "emails")
        .order_by_nulls("name", "desc", "last");
    assert_eq!(qb.render().unwrap(), qb.render().unwrap());
    assert_eq!(
        qb.render().unwrap().sql,
        r#"SELECT * FROM "users" WHERE "email" = ANY(:emails) ORDER BY "name" DESC NULLS LAST"#
    );
}

#[tokio::test]
async fn fetch_one_decodes_and_carries_tag() {
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let got = users()
        .select()
        .where_("id", "=", "id")
        .bind("id", 1)
        .tag("user_by_id")
        .fetch_one(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tag.as_deref(), Some("user_by_id"));
    assert_eq!(calls[0].values.get("id"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn fetch_one_reports_cardinality() {
    let mock = MockExecutor::new();
    let err = users()
        .select()
        .fetch_one(&mock)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let mock = MockExecutor::new();
    let none = users().select().fetch_opt(&mock).await.unwrap();
    assert_eq!(none, None);
}

#[tokio::test]
async fn deferred_error_skips_the_round_trip() {
    let mock = MockExecutor::new();
    let err = users()
        .select()
        .where_("nope", "=", "x")
        .fetch_all(&mock)
        .await
        .unwrap_err();
    assert_eq!(err.builder_kind(), Some(BuilderKind::Select));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn unbound_parameter_fails_before_execution() {
    let mock = MockExecutor::new();
    let err = users()
        .select()
        .where_("age", ">=", "min_age")
        .fetch_all(&mock)
        .await
        .unwrap_err();
    assert!(matches!(err.root(), PlanError::MissingParam(n) if n == "min_age"));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn default_limit_applies_to_fetch_all_only() {
    let table = users().with_config(TableConfig::new().with_default_limit(50));
    let mock = MockExecutor::new();
    table.select().fetch_all(&mock).await.unwrap();
    table.select().limit(5).fetch_all(&mock).await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls[0].sql, r#"SELECT * FROM "users" LIMIT 50"#);
    assert_eq!(calls[1].sql, r#"SELECT * FROM "users" LIMIT 5"#);
    assert_eq!(table.select().render().unwrap().sql, r#"SELECT * FROM "users""#);
}

#[tokio::test]
async fn fetch_records_uses_the_column_map() {
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let records = users().select().fetch_records(&mock).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("email"),
        Some(&Value::Text("ada@example.com".into()))
    );
    assert_eq!(records[0].get_as::<i32>("age").unwrap(), 36);
}

#[tokio::test]
async fn malformed_row_fails_in_scan_phase() {
    let bad = row([("id", Value::Text("one".into()))]);
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada()), bad]);
    let err = users().select().fetch_all(&mock).await.unwrap_err();
    assert_eq!(err.phase(), Some(QueryPhase::Scan));
}

// ==================== window ====================

#[test]
fn window_appends_to_select_list() {
    let q = users()
        .select()
        .select_fields(&["id"])
        .window("row_number", None)
        .partition_by(&["name"])
        .order_by("age", "desc")
        .alias("rn")
        .end()
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT "id", ROW_NUMBER() OVER (PARTITION BY "name" ORDER BY "age" DESC) AS "rn" FROM "users""#
    );
}

#[test]
fn window_frame() {
    let q = users()
        .select()
        .window("sum", Some("age"))
        .order_by("id", "asc")
        .frame("Unbounded Preceding", "current row")
        .alias("running")
        .end()
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT SUM("age") OVER (ORDER BY "id" ASC ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS "running" FROM "users""#
    );
}

#[test]
fn window_errors_reach_the_parent() {
    let err = users()
        .select()
        .window("row_number", Some("id"))
        .end()
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::WindowFunction));

    let err = users()
        .select()
        .window("lag", None)
        .end()
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::WindowFunction));

    let err = users()
        .select()
        .window("rank", None)
        .frame("unbounded following", "current row")
        .end()
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::FrameBound));
}

#[test]
fn distinct_count_is_not_a_window_function() {
    let err = users()
        .select()
        .window("count_distinct", Some("age"))
        .partition_by(&["name"])
        .alias("c")
        .end()
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::WindowFunction));

    let ok = users()
        .select()
        .window("count", Some("age"))
        .partition_by(&["name"])
        .alias("c")
        .end()
        .render()
        .unwrap();
    assert_eq!(
        ok.sql,
        r#"SELECT COUNT("age") OVER (PARTITION BY "name") AS "c" FROM "users""#
    );
}

#[test]
fn parent_error_wins_over_window_error() {
    let err = users()
        .select()
        .where_("nope", "=", "x")
        .window("bogus", None)
        .end()
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Field));
}

// ==================== compound ====================

#[test]
fn union_namespaces_operand_params() {
    let users = users();
    let q = users
        .select()
        .where_("age", ">=", "min_age")
        .bind("min_age", 18)
        .union(users.select().where_("name", "=", "target").bind("target", "ann"));

    let rendered = q.render().unwrap();
    assert_eq!(
        rendered.sql,
        r#"(SELECT * FROM "users" WHERE "age" >= :q0_min_age) UNION (SELECT * FROM "users" WHERE "name" = :q1_target)"#
    );
    assert_eq!(rendered.params, ["q0_min_age", "q1_target"]);

    let bindings = q.bindings().unwrap();
    assert_eq!(bindings.get("q0_min_age"), Some(&Value::Int(18)));
    assert_eq!(bindings.get("q1_target"), Some(&Value::Text("ann".into())));
    assert!(!bindings.contains("min_age"));
}

#[test]
fn chained_operands_are_flat_and_reuse_names() {
    let users = users();
    let by_age = || users.select().where_("age", "=", "x");
    let q = by_age()
        .union_all(by_age())
        .except(by_age())
        .order_by("name", "asc")
        .limit(10);
    let rendered = q.render().unwrap();
    assert_eq!(
        rendered.sql,
        concat!(
            r#"(SELECT * FROM "users" WHERE "age" = :q0_x)"#,
            r#" UNION ALL (SELECT * FROM "users" WHERE "age" = :q1_x)"#,
            r#" EXCEPT (SELECT * FROM "users" WHERE "age" = :q2_x)"#,
            r#" ORDER BY "name" ASC LIMIT 10"#,
        )
    );
    assert_eq!(rendered.params, ["q0_x", "q1_x", "q2_x"]);
    assert_eq!(q.len(), 3);
    assert_eq!(q.render().unwrap(), rendered);
}

#[test]
fn compound_surfaces_operand_errors() {
    let users = users();
    let err = users
        .select()
        .union(users.select().where_("nope", "=", "x"))
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Field));

    let err = users.compound().render().unwrap_err();
    assert!(matches!(err.root(), PlanError::Render(RenderError::EmptyCompound)));
}

#[test]
fn compound_operands_must_share_a_catalog() {
    let a = users();
    let b = users();
    let err = a
        .select()
        .where_("age", ">=", "x")
        .union(b.select())
        .order_by("age", "asc")
        .render()
        .unwrap_err();
    assert!(matches!(
        err.root(),
        PlanError::Render(RenderError::ForeignToken { .. })
    ));
}

#[test]
fn top_level_names_cannot_shadow_operand_params() {
    let users = users();
    let q = users
        .select()
        .where_("age", ">=", "min_age")
        .bind("min_age", 18)
        .union(users.select())
        .bind("q0_min_age", 99);
    let err = q.bindings().unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Param));
    assert!(q.render().is_err());

    let err = users
        .select()
        .union(users.select())
        .limit_param("q1_n")
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Param));

    // Names that merely start with q are fine.
    let q = users
        .select()
        .union(users.select())
        .limit_param("quota")
        .bind("quota", 5);
    assert_eq!(q.render().unwrap().params, ["quota"]);
    assert_eq!(q.bindings().unwrap().get("quota"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn compound_fetch_binds_namespaced_values() {
    let users = users();
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let got = users
        .select()
        .where_("id", "=", "id")
        .bind("id", 1)
        .union(users.select().where_("id", "=", "id").bind("id", 2))
        .fetch_all(&mock)
        .await
        .unwrap();
    assert_eq!(got, [ada()]);

    let values = &mock.calls()[0].values;
    assert_eq!(values.get("q0_id"), Some(&Value::Int(1)));
    assert_eq!(values.get("q1_id"), Some(&Value::Int(2)));
}

// ==================== insert / update / delete ====================

#[test]
fn insert_record_skips_generated_columns() {
    let qb = users().insert().record(&ada()).returning(&["id"]);
    let q = qb.render().unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "users" ("email", "name", "age") VALUES (:email, :name, :age) RETURNING "id""#
    );
    assert_eq!(qb.bindings().get("age"), Some(&Value::Int(36)));
}

#[test]
fn insert_value_replaces_earlier_entry() {
    let q = users()
        .insert()
        .value("email", "a")
        .value("age", "b")
        .value("email", "c")
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "users" ("email", "age") VALUES (:c, :b)"#
    );
}

#[test]
fn on_conflict_update_needs_both_lists() {
    let err = users()
        .insert()
        .record(&ada())
        .on_conflict_update(&[], &["name"])
        .render()
        .unwrap_err();
    assert_eq!(err.builder_kind(), Some(BuilderKind::Insert));
    assert_eq!(err.validation_kind(), Some(ValidationKind::Conflict));
}

#[test]
fn update_and_delete_refuse_missing_where() {
    let err = users().delete().render().unwrap_err();
    assert!(err.is_unsafe());

    let err = users().update().set("name", "name").render().unwrap_err();
    assert!(err.is_unsafe());

    let q = users().delete().where_("id", "=", "id").render().unwrap();
    assert_eq!(q.sql, r#"DELETE FROM "users" WHERE "id" = :id"#);
}

#[tokio::test]
async fn unsafe_guard_fires_at_execution_too() {
    let mock = MockExecutor::new();
    let err = users().delete().execute(&mock).await.unwrap_err();
    assert!(err.is_unsafe());
    assert_eq!(err.phase(), Some(QueryPhase::Render));
    assert!(mock.calls().is_empty());
}

#[test]
fn update_record_sets_non_key_columns() {
    let qb = users()
        .update()
        .record(&ada())
        .where_("id", "=", "id");
    let q = qb.render().unwrap();
    assert_eq!(
        q.sql,
        r#"UPDATE "users" SET "email" = :email, "name" = :name, "age" = :age WHERE "id" = :id"#
    );
    assert_eq!(qb.bindings().get("id"), Some(&Value::Int(1)));
}

#[test]
fn returning_is_capability_checked() {
    let mysql = Table::<User>::new(Dialect::MySql).unwrap();
    let err = mysql
        .delete()
        .where_("id", "=", "id")
        .returning_all()
        .render()
        .unwrap_err();
    assert!(matches!(
        err,
        PlanError::Render(RenderError::Unsupported {
            feature: "RETURNING",
            dialect: Dialect::MySql
        })
    ));
}

#[tokio::test]
async fn insert_fetch_one_returns_the_row() {
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let got = users()
        .insert()
        .record(&ada())
        .fetch_one(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());
    assert!(mock.calls()[0].sql.ends_with(" RETURNING *"));
}

#[tokio::test]
async fn update_fetch_all_returns_rows() {
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let got = users()
        .update()
        .set("age", "age")
        .where_("id", "=", "id")
        .bind("age", 36)
        .bind("id", 1)
        .fetch_all(&mock)
        .await
        .unwrap();
    assert_eq!(got, [ada()]);
    assert_eq!(
        mock.calls()[0].sql,
        r#"UPDATE "users" SET "age" = :age WHERE "id" = :id RETURNING *"#
    );
}

// ==================== upsert ====================

#[tokio::test]
async fn native_upsert_is_one_statement() {
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let got = users()
        .insert()
        .record(&ada())
        .on_conflict_update(&["email"], &["name", "age"])
        .upsert(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());
    assert_eq!(mock.verbs(), ["INSERT"]);
    assert_eq!(
        mock.calls()[0].sql,
        concat!(
            r#"INSERT INTO "users" ("email", "name", "age") VALUES (:email, :name, :age)"#,
            r#" ON CONFLICT ("email") DO UPDATE SET "name" = EXCLUDED."name", "age" = EXCLUDED."age""#,
            r#" RETURNING *"#,
        )
    );
}

#[tokio::test]
async fn fallback_inserts_when_update_matches_nothing() {
    let mock = MockExecutor::new()
        .with_affected(0)
        .with_rows(vec![user_row(&ada())]);
    let got = users_without_upsert()
        .insert()
        .record(&ada())
        .on_conflict_update(&["email"], &["name", "age"])
        .upsert(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());
    assert_eq!(mock.verbs(), ["UPDATE", "INSERT"]);

    let calls = mock.calls();
    assert_eq!(
        calls[0].sql,
        r#"UPDATE "users" SET "name" = :name, "age" = :age WHERE "email" = :email"#
    );
    assert_eq!(
        calls[1].sql,
        r#"INSERT INTO "users" ("email", "name", "age") VALUES (:email, :name, :age) RETURNING *"#
    );
}

#[tokio::test]
async fn fallback_reselects_after_update() {
    let mock = MockExecutor::new()
        .with_affected(1)
        .with_rows(vec![user_row(&ada())]);
    let got = users_without_upsert()
        .insert()
        .record(&ada())
        .on_conflict_update(&["email"], &["name"])
        .upsert(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());
    assert_eq!(mock.verbs(), ["UPDATE", "SELECT"]);
    assert_eq!(
        mock.calls()[1].sql,
        r#"SELECT * FROM "users" WHERE "email" = :email"#
    );
}

#[tokio::test]
async fn fallback_without_returning_selects_the_inserted_row() {
    let mysql = Table::<User>::new(Dialect::MySql).unwrap();
    let mock = MockExecutor::new()
        .with_affected(0)
        .with_affected(1)
        .with_rows(vec![user_row(&ada())]);
    let got = mysql
        .insert()
        .record(&ada())
        .on_conflict_update(&["email"], &["name"])
        .upsert(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());
    assert_eq!(mock.verbs(), ["UPDATE", "INSERT", "SELECT"]);
    assert_eq!(
        mock.calls()[2].sql,
        "SELECT * FROM `users` WHERE `email` = :email"
    );
}

#[tokio::test]
async fn fallback_ignore_skips_insert_when_key_exists() {
    let mock = MockExecutor::new().with_rows(vec![user_row(&ada())]);
    let got = users_without_upsert()
        .insert()
        .record(&ada())
        .on_conflict_ignore(&["email"])
        .upsert(&mock)
        .await
        .unwrap();
    assert_eq!(got, ada());
    assert_eq!(mock.verbs(), ["SELECT"]);

    let mock = MockExecutor::new()
        .with_rows(vec![])
        .with_rows(vec![user_row(&ada())]);
    users_without_upsert()
        .insert()
        .record(&ada())
        .on_conflict_ignore(&["email"])
        .upsert(&mock)
        .await
        .unwrap();
    assert_eq!(mock.verbs(), ["SELECT", "INSERT"]);
}

#[tokio::test]
async fn reject_fallback_fails_without_a_round_trip() {
    let mock = MockExecutor::new();
    let err = users_without_upsert()
        .with_config(TableConfig::new().with_upsert_fallback(UpsertFallback::Reject))
        .insert()
        .record(&ada())
        .on_conflict_update(&["email"], &["name"])
        .upsert(&mock)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        PlanError::Render(RenderError::Unsupported {
            feature: "ON CONFLICT",
            ..
        })
    ));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn upsert_requires_a_conflict_clause() {
    let mock = MockExecutor::new();
    let err = users()
        .insert()
        .record(&ada())
        .upsert(&mock)
        .await
        .unwrap_err();
    assert_eq!(err.builder_kind(), Some(BuilderKind::Insert));
    assert_eq!(err.validation_kind(), Some(ValidationKind::Conflict));
}

#[tokio::test]
async fn fallback_needs_the_conflict_column_value() {
    let mock = MockExecutor::new();
    let err = users_without_upsert()
        .insert()
        .value("name", "name")
        .on_conflict_update(&["email"], &["name"])
        .upsert(&mock)
        .await
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::Conflict));
    assert!(mock.calls().is_empty());
}

// ==================== batch ====================

#[tokio::test]
async fn batch_renders_once_and_stops_at_first_failure() {
    let people: Vec<User> = ["a", "b", "c"]
        .into_iter()
        .enumerate()
        .map(|(i, n)| User {
            id: i as i64,
            email: format!("{n}@example.com"),
            name: None,
            age: 20,
        })
        .collect();
    let mock = MockExecutor::new()
        .with_affected(1)
        .with_error(PlanError::UniqueViolation("users_email_key".into()));

    let err = users()
        .insert()
        .execute_batch(&mock, &people)
        .await
        .unwrap_err();
    match err {
        PlanError::PartialBatch {
            affected,
            failed_at,
            ..
        } => {
            assert_eq!(affected, 1);
            assert_eq!(failed_at, 1);
        }
        other => panic!("expected PartialBatch, got {other:?}"),
    }

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].sql, calls[1].sql);
    assert_eq!(
        calls[0].sql,
        r#"INSERT INTO "users" ("email", "name", "age") VALUES (:email, :name, :age)"#
    );
    assert_eq!(
        calls[1].values.get("email"),
        Some(&Value::Text("b@example.com".into()))
    );
    assert_eq!(calls[1].values.get("name"), Some(&Value::Null));
}

#[tokio::test]
async fn batch_sums_affected_rows() {
    let mock = MockExecutor::new().with_affected(1).with_affected(1);
    let n = users()
        .insert()
        .execute_batch(&mock, &[ada(), ada()])
        .await
        .unwrap();
    assert_eq!(n, 2);
}

// ==================== aggregate ====================

#[test]
fn aggregate_group_having_order() {
    let q = users()
        .aggregate()
        .select_fields(&["name"])
        .aggregate_as("count", None, "n")
        .group_by(&["name"])
        .having(Filter::aggregate("count", None, ">", "min"))
        .order_by_aggregate("count", None, "desc", None)
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT "name", COUNT(*) AS "n" FROM "users" GROUP BY "name" HAVING COUNT(*) > :min ORDER BY COUNT(*) DESC"#
    );
}

#[test]
fn aggregate_pages_by_param() {
    let q = users()
        .aggregate()
        .select_fields(&["name"])
        .aggregate("count", None)
        .group_by(&["name"])
        .limit_param("n")
        .offset_param("skip")
        .render()
        .unwrap();
    assert_eq!(
        q.sql,
        r#"SELECT "name", COUNT(*) FROM "users" GROUP BY "name" LIMIT :n OFFSET :skip"#
    );
    assert_eq!(q.params, ["n", "skip"]);
}

#[test]
fn aggregate_validation() {
    let err = users()
        .aggregate()
        .aggregate("sum", None)
        .render()
        .unwrap_err();
    assert_eq!(err.builder_kind(), Some(BuilderKind::Aggregate));
    assert_eq!(err.validation_kind(), Some(ValidationKind::AggregateFunction));

    let err = users()
        .aggregate()
        .aggregate("median", Some("age"))
        .render()
        .unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationKind::AggregateFunction));

    let q = users()
        .aggregate()
        .aggregate("count distinct", Some("email"))
        .render()
        .unwrap();
    assert_eq!(q.sql, r#"SELECT COUNT(DISTINCT "email") FROM "users""#);
}

#[tokio::test]
async fn aggregate_scalar() {
    let mock = MockExecutor::new().with_rows(vec![row([("count", Value::Int(3))])]);
    let n: i64 = users()
        .aggregate()
        .aggregate("count", None)
        .where_not_null("name")
        .fetch_scalar(&mock)
        .await
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(
        mock.calls()[0].sql,
        r#"SELECT COUNT(*) FROM "users" WHERE "name" IS NOT NULL"#
    );
}
